use std::sync::Arc;

use glam::Mat4;

use crate::scene::{
    ClipAttachment, DepthFunc, DrawStyle, LightAttachment, LightModel, LinePattern, Material,
    PolygonOffsetStyle, PrimitiveKind, Rgba, TextureAttachment, Winding,
};

use super::buckets::DrawUnit;
use super::hatch::HatchImage;
use super::ops::{BlendFunc, GfxOp, OpStream, PolygonMode};
use super::params::{FrameContext, RenderParams};
use super::pass::{LinePass, Pass};

/// Read-only frame environment threaded through every pass.
pub(crate) struct PassEnv<'a> {
    pub params: &'a RenderParams,
    pub frame: &'a FrameContext,
    pub hatch: Option<&'a Arc<HatchImage>>,
}

/// Pipeline state the diff engine believes is currently applied.
///
/// Single source of truth for redundant-change elimination; reset at the
/// start of every frame (the first `apply_material` call applies every
/// field unconditionally).
#[derive(Debug, Clone)]
pub(crate) struct AppliedState {
    pub per_vertex_color: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub depth_clamp: bool,
    pub light_model: LightModel,
    pub diffuse: Rgba,
    pub ambient: Rgba,
    pub emissive: Rgba,
    pub specular: Rgba,
    pub shininess: f32,
    pub override_transparency: bool,
    pub line_width: f32,
    pub line_pattern: LinePattern,
    pub point_size: f32,
    pub winding: Winding,
    pub two_sided: bool,
    pub culling: bool,
    pub polygon_mode: PolygonMode,
    pub polygon_offset_style: PolygonOffsetStyle,
    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,
    pub clip_planes: Vec<ClipAttachment>,
    pub textures: Vec<TextureAttachment>,
    pub lights: Vec<LightAttachment>,
}

impl Default for AppliedState {
    fn default() -> Self {
        Self {
            per_vertex_color: false,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            depth_clamp: false,
            light_model: LightModel::Phong,
            diffuse: Rgba::WHITE,
            ambient: Rgba::BLACK,
            emissive: Rgba::BLACK,
            specular: Rgba::BLACK,
            shininess: 0.2,
            override_transparency: false,
            line_width: 1.0,
            line_pattern: LinePattern::SOLID,
            point_size: 1.0,
            winding: Winding::Ccw,
            two_sided: false,
            culling: false,
            polygon_mode: PolygonMode::Fill,
            polygon_offset_style: PolygonOffsetStyle::default(),
            polygon_offset_factor: 0.0,
            polygon_offset_units: 0.0,
            clip_planes: Vec::new(),
            textures: Vec::new(),
            lights: Vec::new(),
        }
    }
}

/// Mutable state of one `render` invocation: the applied-material tracker
/// plus the pass overrides the orchestrator toggles between bucket passes.
///
/// Created at frame entry and discarded at frame exit; nothing here
/// persists across frames.
pub(crate) struct PassSnapshot {
    pub applied: AppliedState,
    pub prev_material: Option<Arc<Material>>,
    /// Force re-applying the material even if the pointer is unchanged.
    pub recheck: bool,
    pub prev_pass: Pass,

    /// External model transform for the whole frame.
    pub model: Mat4,
    pub identity: bool,
    /// Model transform currently submitted (frame model x batch transform).
    pub current_matrix: Mat4,

    /// Skip texture binds and texcoord arrays.
    pub no_texture: bool,
    /// Depth-seeding mode: write depth only, no color or material detail.
    pub depth_write_only: bool,

    pub shadow_rendering: bool,
    pub shadow_mapping: bool,
    pub transp_shadow_mapping: bool,
    shadow_paused: bool,
}

impl PassSnapshot {
    pub fn new(frame: &FrameContext) -> Self {
        Self {
            applied: AppliedState::default(),
            prev_material: None,
            recheck: false,
            prev_pass: Pass::NORMAL,
            model: frame.model_matrix,
            identity: frame.model_matrix == Mat4::IDENTITY,
            current_matrix: frame.model_matrix,
            no_texture: false,
            depth_write_only: false,
            shadow_rendering: frame.style.shadows,
            shadow_mapping: frame.style.shadow_map,
            transp_shadow_mapping: frame.style.shadow_map && frame.style.transp_shadow_map,
            shadow_paused: false,
        }
    }

    /// Pauses or resumes the shadow shader; no-op outside shadow rendering
    /// or when already in the requested state.
    pub fn pause_shadow(&mut self, out: &mut OpStream, paused: bool) {
        if !self.shadow_rendering || self.shadow_paused == paused {
            return;
        }
        self.shadow_paused = paused;
        out.push(GfxOp::SetShadowProgram { enabled: !paused });
    }

    /// Submits the model matrix for one draw unit (frame model transform
    /// composed with the batch-local transform).
    pub fn setup_matrix(&mut self, unit: &DrawUnit, out: &mut OpStream) {
        let mut m = if self.identity { Mat4::IDENTITY } else { self.model };
        if let Some(t) = &unit.batch.transform {
            m *= *t;
        }
        self.current_matrix = m;
        out.push(GfxOp::SetModelMatrix(m));
    }

    /// Transitions the pipeline from the applied state to `next`, emitting
    /// only the ops whose values differ (except color, which is re-issued
    /// every call because draws mutate it as a side channel).
    ///
    /// Returns `false` when the material refuses the pass (shadow-map
    /// rendering of on-top or non-casting materials); the caller skips that
    /// unit.
    pub fn apply_material(
        &mut self,
        env: &PassEnv<'_>,
        next: &Material,
        transp: bool,
        pass: Pass,
        out: &mut OpStream,
    ) -> bool {
        let first = self.prev_material.is_none();
        let mut transp = transp;

        if self.shadow_mapping && (next.on_top || !next.shadow_style.casts_shadow) {
            log::trace!("material refuses shadow-map pass (on-top or non-casting)");
            return false;
        }

        // Depth seeding: force plain depth writes and nothing else.
        if self.depth_write_only {
            if !self.applied.textures.is_empty() {
                self.applied.textures.clear();
                out.push(GfxOp::ResetAttachments);
            }
            if self.applied.light_model != LightModel::BaseColor {
                self.applied.light_model = LightModel::BaseColor;
                out.push(GfxOp::SetLighting(false));
            }
            self.applied.per_vertex_color = false;
            if !self.applied.depth_write {
                self.applied.depth_write = true;
                out.push(GfxOp::SetDepthWrite(true));
            }
            if self.applied.depth_func != DepthFunc::Less {
                self.applied.depth_func = DepthFunc::Less;
                out.push(GfxOp::SetDepthFunc(DepthFunc::Less));
            }
            if !self.applied.depth_test {
                self.applied.depth_test = true;
                out.push(GfxOp::SetDepthTest(true));
            }
            return true;
        }

        self.applied.per_vertex_color = next.per_vertex_color;

        let mut clippers = next.clip_planes.clone();
        if self.shadow_mapping
            || ((env.params.no_section_on_top
                || (env.params.section_concave && clippers.len() > 1))
                && next.on_top)
        {
            clippers.clear();
        }

        // Clip planes invalidate the cached attachment configuration, so
        // clip/texture/light bindings regenerate together whenever any one
        // of them changes.
        let clipper_changed = first || self.applied.clip_planes != clippers;
        let texture_changed = clipper_changed
            || (next.kind == PrimitiveKind::Triangle && self.applied.textures != next.textures);
        let light_changed = texture_changed
            || (next.kind == PrimitiveKind::Triangle && self.applied.lights != next.lights);

        if clipper_changed || texture_changed || light_changed {
            out.push(GfxOp::ResetAttachments);

            for (i, clip) in clippers.iter().enumerate() {
                out.push(GfxOp::SetClipPlane {
                    index: i as u32,
                    plane: clip.effective_plane(),
                });
            }
            self.applied.clip_planes = clippers;

            if !self.no_texture && texture_changed {
                for att in &next.textures {
                    let unchanged = self
                        .applied
                        .textures
                        .iter()
                        .any(|t| t.unit == att.unit && t == att);
                    if unchanged {
                        continue;
                    }
                    out.push(GfxOp::BindTexture {
                        unit: att.unit,
                        texture: att.texture,
                        transform: att.transform,
                    });
                }
                self.applied.textures = next.textures.clone();
            }

            if light_changed {
                for att in &next.lights {
                    out.push(GfxOp::BindLight { light: att.light, transform: att.transform });
                }
                self.applied.lights = next.lights.clone();
            }
        }

        let mut depth_test = if next.on_top { false } else { next.depth_test };
        let mut depth_write = if !next.on_top && transp { false } else { next.depth_write };
        let mut depth_func = next.depth_func;
        let mut line_pattern = next.line_pattern;
        let mut col = next.diffuse;
        let mut emissive = next.emissive;
        let mut override_transparency = next.override_transparency;
        let mut line_width = next.line_width;
        let mut point_size = next.point_size;

        match pass.line {
            LinePass::Pattern => {
                if !pass.highlight {
                    transp = true;
                    let alpha = (env.params.transparency_on_top * 255.0) as u8;
                    if alpha < col.alpha() {
                        col = col.with_alpha(alpha);
                    }
                    override_transparency = true;
                }
                depth_test = false;

                let mut substitute = env.params.selection_line_pattern as u32;
                if substitute != 0 && env.params.selection_line_pattern_scale > 1 {
                    substitute |= (env.params.selection_line_pattern_scale as u32) << 16;
                }
                if substitute != 0 && !next.has_line_pattern() {
                    line_pattern = LinePattern(substitute);
                }
            }
            LinePass::Solid => {
                depth_test = true;
                depth_func = DepthFunc::LessEqual;
                depth_write = false;
            }
            LinePass::Normal => {}
        }

        if pass.highlight {
            let scale = env.params.selection_line_thicken.max(1.0);
            let mut w = line_width * scale;
            if env.params.selection_line_max_width > 1.0 {
                w = w.min(line_width.max(env.params.selection_line_max_width));
            }
            line_width = w;

            let mut point_scale = env.params.selection_point_scale;
            if point_scale < 1.0 {
                point_scale = scale;
            }
            let mut w = point_size * point_scale;
            if env.params.selection_point_max_size > 1.0 {
                w = w.min(point_size.max(env.params.selection_point_max_size));
            }
            point_size = w;
        }

        if first || self.applied.depth_test != depth_test {
            out.push(GfxOp::SetDepthTest(depth_test));
            self.applied.depth_test = depth_test;
        }

        if first || self.applied.depth_clamp != next.depth_clamp {
            out.push(GfxOp::SetDepthClamp(next.depth_clamp));
            self.applied.depth_clamp = next.depth_clamp;
        }

        if first || self.applied.depth_write != depth_write {
            out.push(GfxOp::SetDepthWrite(depth_write));
            self.applied.depth_write = depth_write;
        }

        if first || self.applied.depth_func != depth_func {
            out.push(GfxOp::SetDepthFunc(depth_func));
            self.applied.depth_func = depth_func;
        }

        if first || self.applied.light_model != next.light_model {
            out.push(GfxOp::SetLighting(next.light_model == LightModel::Phong));
            self.applied.light_model = next.light_model;
        }

        // Always re-issue the color: geometry submission mutates the
        // current color as a side channel.
        out.push(GfxOp::SetColor(col));

        if override_transparency != self.applied.override_transparency
            || (override_transparency && col.alpha() != self.applied.diffuse.alpha())
        {
            if override_transparency {
                out.push(GfxOp::SetBlendFunc(BlendFunc::ConstantAlpha { alpha: col.alpha() }));
            } else {
                out.push(GfxOp::SetBlendFunc(BlendFunc::SrcAlpha));
            }
        }
        self.applied.override_transparency = override_transparency;
        self.applied.diffuse = col;

        // Emissive color must stay cleared under flat lighting, or extra
        // light sources can make it bleed through.
        if self.applied.light_model == LightModel::BaseColor {
            emissive = Rgba(0);
        }

        if first || self.applied.emissive != emissive {
            out.push(GfxOp::SetEmissive(emissive));
            self.applied.emissive = emissive;
        }

        if next.kind == PrimitiveKind::Line {
            if first || self.applied.line_width != line_width {
                out.push(GfxOp::SetLineWidth(line_width));
                self.applied.line_width = line_width;
            }
            if first || self.applied.line_pattern != line_pattern {
                out.push(GfxOp::SetLinePattern(line_pattern));
                self.applied.line_pattern = line_pattern;
            }
            if !first {
                return true;
            }
        }

        if next.kind == PrimitiveKind::Point {
            if first || self.applied.point_size != point_size {
                out.push(GfxOp::SetPointSize(point_size));
                self.applied.point_size = point_size;
            }
            if !first {
                return true;
            }
        }

        if first || self.applied.ambient != next.ambient {
            out.push(GfxOp::SetAmbient(next.ambient));
            self.applied.ambient = next.ambient;
        }

        if first || self.applied.specular != next.specular {
            out.push(GfxOp::SetSpecular(next.specular));
            self.applied.specular = next.specular;
        }

        if first || self.applied.shininess != next.shininess {
            out.push(GfxOp::SetShininess(next.shininess));
            self.applied.shininess = next.shininess;
        }

        if first || self.applied.winding != next.winding {
            out.push(GfxOp::SetFrontFace(next.winding));
            self.applied.winding = next.winding;
        }

        let two_sided = if transp { true } else { next.two_sided };
        if first || self.applied.two_sided != two_sided {
            out.push(GfxOp::SetTwoSidedLighting(two_sided));
            self.applied.two_sided = two_sided;
        }

        let culling = if transp { false } else { next.culling };
        if first || self.applied.culling != culling {
            out.push(GfxOp::SetCullFace(culling));
            self.applied.culling = culling;
        }

        let polygon_mode = match next.draw_style {
            DrawStyle::Lines => PolygonMode::Line,
            DrawStyle::Points => PolygonMode::Point,
            _ => PolygonMode::Fill,
        };
        if first || self.applied.polygon_mode != polygon_mode {
            out.push(GfxOp::SetPolygonMode(polygon_mode));
            self.applied.polygon_mode = polygon_mode;
        }

        if first || self.applied.polygon_offset_style != next.polygon_offset_style {
            out.push(GfxOp::SetPolygonOffsetStyle(next.polygon_offset_style));
            self.applied.polygon_offset_style = next.polygon_offset_style;
        }

        if first
            || self.applied.polygon_offset_factor != next.polygon_offset_factor
            || self.applied.polygon_offset_units != next.polygon_offset_units
        {
            out.push(GfxOp::SetPolygonOffset {
                factor: next.polygon_offset_factor,
                units: next.polygon_offset_units,
            });
            self.applied.polygon_offset_factor = next.polygon_offset_factor;
            self.applied.polygon_offset_units = next.polygon_offset_units;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ShadowStyle;

    fn env<'a>(params: &'a RenderParams, frame: &'a FrameContext) -> PassEnv<'a> {
        PassEnv { params, frame, hatch: None }
    }

    fn apply(
        snap: &mut PassSnapshot,
        params: &RenderParams,
        material: &Arc<Material>,
        transp: bool,
        pass: Pass,
    ) -> Vec<GfxOp> {
        let frame = FrameContext::default();
        let mut out = OpStream::new();
        let ok = snap.apply_material(&env(params, &frame), material, transp, pass, &mut out);
        assert!(ok);
        snap.prev_material = Some(material.clone());
        out.ops().to_vec()
    }

    // ── diff idempotence ──────────────────────────────────────────────────

    #[test]
    fn second_apply_emits_only_color() {
        let params = RenderParams::default();
        let material = Arc::new(Material::new(PrimitiveKind::Triangle));
        let frame = FrameContext::default();
        let mut snap = PassSnapshot::new(&frame);

        let ops = apply(&mut snap, &params, &material, false, Pass::NORMAL);
        assert!(ops.len() > 1);

        let ops = apply(&mut snap, &params, &material, false, Pass::NORMAL);
        assert_eq!(ops, vec![GfxOp::SetColor(material.diffuse)]);
    }

    #[test]
    fn second_apply_line_material_emits_only_color() {
        let params = RenderParams::default();
        let material = Arc::new(Material::new(PrimitiveKind::Line));
        let frame = FrameContext::default();
        let mut snap = PassSnapshot::new(&frame);

        apply(&mut snap, &params, &material, false, Pass::NORMAL);
        let ops = apply(&mut snap, &params, &material, false, Pass::NORMAL);
        assert_eq!(ops, vec![GfxOp::SetColor(material.diffuse)]);
    }

    // ── shadow-map routing ────────────────────────────────────────────────

    #[test]
    fn shadow_map_refuses_on_top_and_non_casting() {
        let params = RenderParams::default();
        let frame = FrameContext {
            style: crate::render::FrameStyle { shadow_map: true, ..Default::default() },
            ..Default::default()
        };
        let mut snap = PassSnapshot::new(&frame);
        let mut out = OpStream::new();

        let mut on_top = Material::new(PrimitiveKind::Triangle);
        on_top.on_top = true;
        assert!(!snap.apply_material(&env(&params, &frame), &on_top, false, Pass::NORMAL, &mut out));

        let mut no_cast = Material::new(PrimitiveKind::Triangle);
        no_cast.shadow_style = ShadowStyle { shadowed: true, casts_shadow: false };
        assert!(!snap.apply_material(&env(&params, &frame), &no_cast, false, Pass::NORMAL, &mut out));

        assert!(out.is_empty());

        let plain = Material::new(PrimitiveKind::Triangle);
        assert!(snap.apply_material(&env(&params, &frame), &plain, false, Pass::NORMAL, &mut out));
    }

    // ── depth-write-only override ─────────────────────────────────────────

    #[test]
    fn depth_write_only_forces_depth_state_and_stops() {
        let params = RenderParams::default();
        let frame = FrameContext::default();
        let mut snap = PassSnapshot::new(&frame);
        snap.depth_write_only = true;
        snap.applied.light_model = LightModel::Phong;
        snap.applied.depth_write = false;
        snap.applied.depth_test = false;
        snap.applied.depth_func = DepthFunc::LessEqual;

        let material = Arc::new(Material::new(PrimitiveKind::Triangle));
        let ops = apply(&mut snap, &params, &material, false, Pass::NORMAL);
        assert_eq!(
            ops,
            vec![
                GfxOp::SetLighting(false),
                GfxOp::SetDepthWrite(true),
                GfxOp::SetDepthFunc(DepthFunc::Less),
                GfxOp::SetDepthTest(true),
            ]
        );
        assert!(!ops.contains(&GfxOp::SetColor(material.diffuse)));
        assert!(!snap.applied.per_vertex_color);
    }

    // ── line-pattern pass ─────────────────────────────────────────────────

    #[test]
    fn pattern_pass_substitutes_pattern_and_forces_transparency() {
        let params = RenderParams::default();
        let material = Arc::new(Material::new(PrimitiveKind::Line));
        let frame = FrameContext::default();
        let mut snap = PassSnapshot::new(&frame);

        let ops = apply(&mut snap, &params, &material, false, Pass::LINE_PATTERN);

        let expected_pattern =
            LinePattern(params.selection_line_pattern as u32 | (params.selection_line_pattern_scale as u32) << 16);
        assert!(ops.contains(&GfxOp::SetLinePattern(expected_pattern)));
        assert!(ops.contains(&GfxOp::SetDepthTest(false)));
        // Transparency override dims the line to the configured alpha.
        let alpha = (params.transparency_on_top * 255.0) as u8;
        assert!(ops.contains(&GfxOp::SetBlendFunc(BlendFunc::ConstantAlpha { alpha })));
    }

    #[test]
    fn pattern_pass_keeps_material_pattern() {
        let params = RenderParams::default();
        let mut material = Material::new(PrimitiveKind::Line);
        material.line_pattern = LinePattern(0x00ff);
        let material = Arc::new(material);
        let frame = FrameContext::default();
        let mut snap = PassSnapshot::new(&frame);

        let ops = apply(&mut snap, &params, &material, false, Pass::LINE_PATTERN);
        assert!(ops.contains(&GfxOp::SetLinePattern(LinePattern(0x00ff))));
    }

    #[test]
    fn solid_pass_forces_lequal_read_only_depth() {
        let params = RenderParams::default();
        let material = Arc::new(Material::new(PrimitiveKind::Line));
        let frame = FrameContext::default();
        let mut snap = PassSnapshot::new(&frame);

        let ops = apply(&mut snap, &params, &material, false, Pass::LINE_SOLID);
        assert!(ops.contains(&GfxOp::SetDepthTest(true)));
        assert!(ops.contains(&GfxOp::SetDepthFunc(DepthFunc::LessEqual)));
        assert!(ops.contains(&GfxOp::SetDepthWrite(false)));
    }

    // ── highlight scaling ─────────────────────────────────────────────────

    #[test]
    fn highlight_pass_scales_and_clamps_line_width() {
        let mut params = RenderParams::default();
        params.selection_line_thicken = 3.0;
        params.selection_line_max_width = 4.0;

        let mut material = Material::new(PrimitiveKind::Line);
        material.line_width = 2.0;
        let material = Arc::new(material);
        let frame = FrameContext::default();

        let mut snap = PassSnapshot::new(&frame);
        let ops = apply(&mut snap, &params, &material, false, Pass::HIGHLIGHT);
        // 2.0 * 3.0 = 6.0, clamped to max(2.0, 4.0) = 4.0.
        assert!(ops.contains(&GfxOp::SetLineWidth(4.0)));

        // A line already wider than the clamp keeps its width.
        let mut wide = Material::new(PrimitiveKind::Line);
        wide.line_width = 5.0;
        let wide = Arc::new(wide);
        let mut snap = PassSnapshot::new(&frame);
        let ops = apply(&mut snap, &params, &wide, false, Pass::HIGHLIGHT);
        assert!(ops.contains(&GfxOp::SetLineWidth(5.0)));
    }

    #[test]
    fn highlight_pass_scales_points() {
        let mut params = RenderParams::default();
        params.selection_point_scale = 2.0;
        params.selection_point_max_size = 6.0;

        let mut material = Material::new(PrimitiveKind::Point);
        material.point_size = 2.0;
        let material = Arc::new(material);
        let frame = FrameContext::default();

        let mut snap = PassSnapshot::new(&frame);
        let ops = apply(&mut snap, &params, &material, false, Pass::HIGHLIGHT);
        assert!(ops.contains(&GfxOp::SetPointSize(4.0)));
    }

    // ── attachment regeneration ───────────────────────────────────────────

    #[test]
    fn clip_change_regenerates_attachments_together() {
        use crate::geom::Plane;
        use glam::Vec3;

        let params = RenderParams::default();
        let frame = FrameContext::default();

        let mut with_clip = Material::new(PrimitiveKind::Triangle);
        with_clip.clip_planes = vec![ClipAttachment {
            plane: Plane::from_normal_distance(Vec3::Z, 1.0),
            transform: None,
        }];
        with_clip.lights =
            vec![LightAttachment { light: crate::scene::LightHandle(7), transform: None }];
        let with_clip = Arc::new(with_clip);

        let mut snap = PassSnapshot::new(&frame);
        apply(&mut snap, &params, &with_clip, false, Pass::NORMAL);

        // Same clip set again: no regeneration.
        let ops = apply(&mut snap, &params, &with_clip, false, Pass::NORMAL);
        assert!(!ops.contains(&GfxOp::ResetAttachments));

        // Dropping the clip plane regenerates clips and re-issues lights.
        let mut no_clip = (*with_clip).clone();
        no_clip.clip_planes.clear();
        let no_clip = Arc::new(no_clip);
        let ops = apply(&mut snap, &params, &no_clip, false, Pass::NORMAL);
        assert!(ops.contains(&GfxOp::ResetAttachments));
        assert!(ops.contains(&GfxOp::BindLight {
            light: crate::scene::LightHandle(7),
            transform: None
        }));
    }

    #[test]
    fn transparency_disables_culling_and_forces_two_sided() {
        let params = RenderParams::default();
        let mut material = Material::new(PrimitiveKind::Triangle);
        material.culling = true;
        material.two_sided = false;
        let material = Arc::new(material);
        let frame = FrameContext::default();

        let mut snap = PassSnapshot::new(&frame);
        let ops = apply(&mut snap, &params, &material, true, Pass::NORMAL);
        assert!(ops.contains(&GfxOp::SetCullFace(false)));
        assert!(ops.contains(&GfxOp::SetTwoSidedLighting(true)));
        // Transparent draws of non-on-top materials never write depth.
        assert!(ops.contains(&GfxOp::SetDepthWrite(false)));
    }
}
