use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::geom::Aabb;
use crate::scene::{CacheKey, LightModel, Material, PrimitiveKind, SceneGroups};

use super::buckets::{
    Arena, DrawUnit, HighlightBuckets, SceneBuckets, SelectionBuckets, push_draw_unit, visible,
};
use super::hatch::HatchImage;
use super::ops::{ArrayHints, BlendFunc, GfxOp, OpStream, TriangleSet};
use super::outline::render_outline;
use super::overlay::SelectionId;
use super::params::{FrameContext, RenderOutcome, RenderParams};
use super::pass::Pass;
use super::section::{clipped_out, render_section};
use super::sort::DepthBucket;
use super::state::{PassEnv, PassSnapshot};

/// Frame-synchronous renderer: ingests cached geometry batches grouped by
/// material, classifies them into ordered buckets, and turns each frame
/// into a minimal pipeline-op sequence.
///
/// Single-threaded by design; a `render` call runs to completion on the
/// caller's thread and owns all mutable state for its duration.
pub struct Renderer {
    pub(crate) params: RenderParams,

    /// Base-scene draw units, indexed by the buckets and the cache index.
    pub(crate) entries: Vec<DrawUnit>,
    pub(crate) scene_buckets: SceneBuckets,
    /// Cache key -> base-scene units originating from it, for overlay
    /// suppression.
    pub(crate) cache_index: BTreeMap<Arc<CacheKey>, Vec<usize>>,
    pub(crate) scene_bbox: Aabb,

    pub(crate) sel_entries: Vec<DrawUnit>,
    pub(crate) sel_buckets: SelectionBuckets,
    pub(crate) selections: BTreeMap<SelectionId, SceneGroups>,
    pub(crate) selections_on_top: BTreeMap<SelectionId, SceneGroups>,
    pub(crate) selection_keys: BTreeSet<Arc<CacheKey>>,
    pub(crate) selection_dirty: bool,
    pub(crate) selection_bbox: Aabb,

    pub(crate) hl_entries: Vec<DrawUnit>,
    pub(crate) hl_buckets: HighlightBuckets,
    pub(crate) highlight_keys: BTreeSet<Arc<CacheKey>>,
    pub(crate) highlight_bbox: Aabb,
    pub(crate) hl_whole_on_top: bool,

    pub(crate) hatch: Option<Arc<HatchImage>>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            params: RenderParams::default(),
            entries: Vec::new(),
            scene_buckets: SceneBuckets::default(),
            cache_index: BTreeMap::new(),
            scene_bbox: Aabb::EMPTY,
            sel_entries: Vec::new(),
            sel_buckets: SelectionBuckets::default(),
            selections: BTreeMap::new(),
            selections_on_top: BTreeMap::new(),
            selection_keys: BTreeSet::new(),
            selection_dirty: false,
            selection_bbox: Aabb::EMPTY,
            hl_entries: Vec::new(),
            hl_buckets: HighlightBuckets::default(),
            highlight_keys: BTreeSet::new(),
            highlight_bbox: Aabb::EMPTY,
            hl_whole_on_top: false,
            hatch: None,
        }
    }

    pub fn set_params(&mut self, params: RenderParams) {
        self.params = params;
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    /// Installs (or releases, with `None`) the shared hatch image used to
    /// texture section caps.
    pub fn set_hatch_image(&mut self, image: Option<Arc<HatchImage>>) {
        self.hatch = image;
    }

    /// Replaces the base scene and reclassifies every batch into its
    /// buckets. Highlight suppression re-applies to the new units; selection
    /// overlays recompute lazily on the next render.
    pub fn set_scene(&mut self, groups: SceneGroups) {
        self.scene_bbox = Aabb::EMPTY;
        self.scene_buckets.clear();
        self.cache_index.clear();
        self.entries.clear();

        for (material, batches) in &groups {
            if batches.is_empty() || !visible(material) {
                continue;
            }
            for batch in batches {
                let Some(index) = push_draw_unit(&mut self.entries, material, batch) else {
                    continue;
                };
                let bounds = self.entries[index].bounds;
                self.scene_bbox.extend(&bounds);
                if let Some(key) = &batch.key {
                    self.cache_index.entry(key.clone()).or_default().push(index);
                }
                self.scene_buckets.classify(index, material, batch);
            }
        }

        Self::apply_keys(&self.cache_index, &mut self.entries, &self.highlight_keys, 1);
        self.selection_keys.clear();
        self.selection_dirty = true;
    }

    /// Drops the scene and every overlay.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.scene_buckets.clear();
        self.cache_index.clear();
        self.scene_bbox = Aabb::EMPTY;

        self.selections.clear();
        self.selections_on_top.clear();
        self.sel_entries.clear();
        self.sel_buckets.clear();
        self.selection_keys.clear();
        self.selection_bbox = Aabb::EMPTY;
        self.selection_dirty = false;

        self.hl_entries.clear();
        self.hl_buckets.clear();
        self.highlight_keys.clear();
        self.highlight_bbox = Aabb::EMPTY;
        self.hl_whole_on_top = false;
    }

    /// Aggregate bounds of scene, highlight, and selection overlays.
    /// Consumes a pending selection recompute first.
    pub fn bounding_box(&mut self) -> Aabb {
        self.update_selection();
        let mut bounds = Aabb::EMPTY;
        bounds.extend(&self.scene_bbox);
        bounds.extend(&self.highlight_bbox);
        bounds.extend(&self.selection_bbox);
        bounds
    }

    /// Submits one frame as an ordered op sequence.
    ///
    /// Pass order: opaque scene, opaque selections (highlighted), sorted
    /// transparent scene and selections, on-top opaque and transparent,
    /// then the overlay and line regimes: on-top selection transparency,
    /// whole-object highlight, a depth-write-only pre-pass seeding
    /// occlusion for on-top lines, dashed lines (depth test off), solid
    /// lines (depth `<=`), remaining highlight, and on-top selection
    /// points. Shadow frames stop early: `Deferred` asks the caller to
    /// re-invoke with `delayed` set once the rest of the scene graph has
    /// been traversed.
    pub fn render(&mut self, frame: &FrameContext, out: &mut OpStream) -> RenderOutcome {
        self.update_selection();

        let params = self.params.clone();
        let env = PassEnv { params: &params, frame, hatch: self.hatch.as_ref() };
        let mut snap = PassSnapshot::new(frame);

        out.push(GfxOp::PushState);
        out.push(GfxOp::SetColorMaterial(true));

        if !frame.delayed {
            render_opaque(
                &mut snap, &env, Arena::Scene,
                &self.entries, &self.scene_buckets.opaque, Pass::NORMAL, out,
            );

            snap.recheck = true;
            render_opaque(
                &mut snap, &env, Arena::Selection,
                &self.sel_entries, &self.sel_buckets.opaque, Pass::HIGHLIGHT, out,
            );

            snap.recheck = true;
            snap.no_texture = false;
            render_transparency(
                &mut snap, &env, Arena::Scene,
                &self.entries, &mut self.scene_buckets.transp, true, out,
            );

            snap.recheck = true;
            render_transparency(
                &mut snap, &env, Arena::Selection,
                &self.sel_entries, &mut self.sel_buckets.transp, true, out,
            );

            snap.recheck = true;
            snap.no_texture = false;
            render_opaque(
                &mut snap, &env, Arena::Scene,
                &self.entries, &self.scene_buckets.opaque_on_top, Pass::NORMAL, out,
            );
            render_transparency(
                &mut snap, &env, Arena::Scene,
                &self.entries, &mut self.scene_buckets.transp_on_top, false, out,
            );

            if snap.shadow_rendering {
                out.push(GfxOp::PopState);
                return RenderOutcome::Deferred;
            }
        }

        if snap.shadow_mapping {
            out.push(GfxOp::PopState);
            return RenderOutcome::Completed;
        }

        snap.recheck = true;
        render_transparency(
            &mut snap, &env, Arena::Selection,
            &self.sel_entries, &mut self.sel_buckets.transp_on_top, false, out,
        );

        if self.hl_whole_on_top {
            render_opaque(
                &mut snap, &env, Arena::Highlight,
                &self.hl_entries, &self.hl_buckets.opaque, Pass::NORMAL, out,
            );
            render_transparency(
                &mut snap, &env, Arena::Highlight,
                &self.hl_entries, &mut self.hl_buckets.transp, false, out,
            );
        }

        let has_sel = !self.sel_buckets.mixed_on_top.is_empty()
            || !self.sel_buckets.lines_on_top.is_empty();
        let has_on_top = !self.scene_buckets.triangles_on_top.is_empty()
            && !self.scene_buckets.lines_on_top.is_empty();
        let mut pass = Pass::NORMAL;

        if has_sel || has_on_top || self.hl_whole_on_top {
            // Depth-write-only pre-pass over on-top triangles, so the solid
            // line pass below can tell occluded from visible lines.
            snap.recheck = true;
            snap.depth_write_only = true;
            out.push(GfxOp::SetColorMask(false));

            if has_on_top {
                render_opaque(
                    &mut snap, &env, Arena::Scene,
                    &self.entries, &self.scene_buckets.triangles_on_top, Pass::NORMAL, out,
                );
            }
            if has_sel {
                render_opaque(
                    &mut snap, &env, Arena::Selection,
                    &self.sel_entries, &self.sel_buckets.triangles_on_top, Pass::NORMAL, out,
                );
            }
            if self.hl_whole_on_top {
                render_opaque(
                    &mut snap, &env, Arena::Highlight,
                    &self.hl_entries, &self.hl_buckets.opaque, Pass::HIGHLIGHT, out,
                );
                render_transparency(
                    &mut snap, &env, Arena::Highlight,
                    &self.hl_entries, &mut self.hl_buckets.transp, false, out,
                );
            }

            snap.depth_write_only = false;
            out.push(GfxOp::SetColorMask(true));

            pass = Pass::LINE_PATTERN;
        }

        // Blending stays on through the line regimes so dashed (hidden)
        // lines render dimmed.
        out.push(GfxOp::SetBlendEnabled(true));
        out.push(GfxOp::SetBlendFunc(BlendFunc::SrcAlpha));

        render_opaque(
            &mut snap, &env, Arena::Scene,
            &self.entries, &self.scene_buckets.lines_on_top, pass, out,
        );
        render_opaque(
            &mut snap, &env, Arena::Selection,
            &self.sel_entries, &self.sel_buckets.mixed_on_top, pass, out,
        );
        render_opaque(
            &mut snap, &env, Arena::Selection,
            &self.sel_entries, &self.sel_buckets.lines_on_top, pass.with_highlight(), out,
        );
        if self.hl_whole_on_top {
            render_opaque(
                &mut snap, &env, Arena::Highlight,
                &self.hl_entries, &self.hl_buckets.opaque_lines, pass, out,
            );
        }

        if has_sel || has_on_top || self.hl_whole_on_top {
            // Second line pass: visible subset drawn solid over the dashes.
            let pass = Pass::LINE_SOLID;

            if has_on_top {
                render_opaque(
                    &mut snap, &env, Arena::Scene,
                    &self.entries, &self.scene_buckets.lines_on_top, pass, out,
                );
            }
            if has_sel {
                render_opaque(
                    &mut snap, &env, Arena::Selection,
                    &self.sel_entries, &self.sel_buckets.mixed_on_top, pass, out,
                );
                render_opaque(
                    &mut snap, &env, Arena::Selection,
                    &self.sel_entries, &self.sel_buckets.lines_on_top, pass.with_highlight(), out,
                );
            }
            if self.hl_whole_on_top {
                render_opaque(
                    &mut snap, &env, Arena::Highlight,
                    &self.hl_entries, &self.hl_buckets.opaque_lines, pass.with_highlight(), out,
                );
            }
        }

        out.push(GfxOp::SetBlendEnabled(false));

        if !self.hl_whole_on_top {
            render_opaque(
                &mut snap, &env, Arena::Highlight,
                &self.hl_entries, &self.hl_buckets.opaque, Pass::NORMAL, out,
            );
            render_transparency(
                &mut snap, &env, Arena::Highlight,
                &self.hl_entries, &mut self.hl_buckets.transp, false, out,
            );
            render_opaque(
                &mut snap, &env, Arena::Highlight,
                &self.hl_entries, &self.hl_buckets.opaque_lines, Pass::HIGHLIGHT, out,
            );
        }

        render_opaque(
            &mut snap, &env, Arena::Selection,
            &self.sel_entries, &self.sel_buckets.points_on_top, Pass::HIGHLIGHT, out,
        );

        out.push(GfxOp::PopState);
        RenderOutcome::Completed
    }

    /// Adjusts suppress counts for every base-scene unit under `key`.
    pub(crate) fn apply_key(
        cache_index: &BTreeMap<Arc<CacheKey>, Vec<usize>>,
        entries: &mut [DrawUnit],
        key: &CacheKey,
        delta: i32,
    ) {
        if let Some(indices) = cache_index.get(key) {
            for &index in indices {
                let unit = &mut entries[index];
                unit.suppress += delta;
                debug_assert!(
                    unit.suppress >= 0,
                    "suppress count underflow: key released more times than applied"
                );
            }
        }
    }

    pub(crate) fn apply_keys(
        cache_index: &BTreeMap<Arc<CacheKey>, Vec<usize>>,
        entries: &mut [DrawUnit],
        keys: &BTreeSet<Arc<CacheKey>>,
        delta: i32,
    ) {
        for key in keys {
            Self::apply_key(cache_index, entries, key, delta);
        }
    }
}

#[inline]
fn prev_is(prev: &Option<Arc<Material>>, material: &Arc<Material>) -> bool {
    prev.as_ref().is_some_and(|p| Arc::ptr_eq(p, material))
}

/// Draws one opaque (or line-regime) bucket: material diff, matrix setup,
/// section passes, and primitive submission per unit.
pub(crate) fn render_opaque(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    arena: Arena,
    units: &[DrawUnit],
    indices: &[usize],
    pass: Pass,
    out: &mut OpStream,
) {
    if snap.transp_shadow_mapping {
        return;
    }
    let pause_default = arena != Arena::Scene;

    for &index in indices {
        let unit = &units[index];

        // Suppressed units still render into shadow maps (occlusion must
        // see them), and when a clip-plane override would otherwise punch
        // a hole where the overlay copy lost its planes.
        if unit.suppressed()
            && !snap.shadow_mapping
            && ((!env.params.section_concave && !env.params.no_section_on_top)
                || unit.material.clip_planes.is_empty())
        {
            continue;
        }

        if snap.recheck || snap.prev_pass != pass || !prev_is(&snap.prev_material, &unit.material)
        {
            if !snap.apply_material(env, &unit.material, false, pass, out) {
                continue;
            }
            snap.prev_pass = pass;
            snap.recheck = false;
            snap.prev_material = Some(unit.material.clone());
        }
        snap.setup_matrix(unit, out);

        let mut arrays = ArrayHints {
            color: snap.applied.per_vertex_color,
            texcoord: !snap.no_texture,
            normal: true,
        };
        if snap.applied.light_model == LightModel::BaseColor {
            arrays.normal = false;
        } else if !unit.batch.has_normals {
            arrays.normal = false;
            snap.applied.light_model = LightModel::BaseColor;
            out.push(GfxOp::SetLighting(false));
        }

        let mut section_pass = 0;
        let mut pushed = false;
        while render_section(snap, env, unit, &mut section_pass, &mut pushed, out) {
            if !env.params.section_concave
                && !snap.applied.clip_planes.is_empty()
                && clipped_out(unit, &snap.applied.clip_planes)
            {
                continue;
            }

            match unit.material.kind {
                PrimitiveKind::Triangle => {
                    if arena == Arena::Scene
                        && unit.material.outline
                        && env.params.hidden_line_hide_face
                    {
                        continue;
                    }

                    snap.pause_shadow(
                        out,
                        pause_default || !unit.material.shadow_style.shadowed,
                    );

                    if !unit.batch.has_transparency || !snap.applied.per_vertex_color {
                        // Either nothing transparent in the batch, or the
                        // material overrides transparency to opaque.
                        out.push(GfxOp::DrawTriangles {
                            batch: unit.batch.id,
                            part: unit.batch.part,
                            arrays,
                            set: TriangleSet::All,
                        });
                    } else {
                        let force_two_sided = !snap.applied.two_sided;
                        if force_two_sided {
                            out.push(GfxOp::SetTwoSidedLighting(true));
                        }
                        out.push(GfxOp::DrawTriangles {
                            batch: unit.batch.id,
                            part: unit.batch.part,
                            arrays,
                            set: TriangleSet::Opaque,
                        });
                        if force_two_sided {
                            out.push(GfxOp::SetTwoSidedLighting(false));
                        }
                    }
                }
                PrimitiveKind::Line => render_lines(snap, env, unit, arrays, out),
                PrimitiveKind::Point => render_points(snap, env, unit, arrays, out),
            }
        }
        if pushed {
            out.push(GfxOp::PopState);
        }
        render_outline(snap, env, unit, arena == Arena::Highlight, out);
    }
}

/// Draws one transparent bucket back-to-front with blending, lazily
/// re-sorting against the view plane when its normal changed.
pub(crate) fn render_transparency(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    arena: Arena,
    units: &[DrawUnit],
    bucket: &mut DepthBucket,
    sort: bool,
    out: &mut OpStream,
) {
    if bucket.is_empty() {
        return;
    }
    if snap.shadow_mapping && !snap.transp_shadow_mapping {
        return;
    }
    let pause_default = arena != Arena::Scene;
    let no_triangles = arena == Arena::Scene
        && env.frame.show_hidden_lines
        && env.params.hidden_line_hide_face;

    if !no_triangles && sort {
        let model = if snap.identity { None } else { Some(&snap.model) };
        bucket.sort_back_to_front(env.frame.view_plane, model, units);
    }

    out.push(GfxOp::SetBlendEnabled(true));
    out.push(GfxOp::SetBlendFunc(BlendFunc::SrcAlpha));

    let highlight = arena == Arena::Highlight;

    for index in bucket.indices() {
        let unit = &units[index];
        if unit.suppressed() && !snap.shadow_mapping {
            continue;
        }

        if snap.recheck || !prev_is(&snap.prev_material, &unit.material) {
            if !snap.apply_material(env, &unit.material, true, Pass::NORMAL, out) {
                continue;
            }
            snap.recheck = false;
            snap.prev_material = Some(unit.material.clone());
        }
        snap.setup_matrix(unit, out);

        let mut arrays = ArrayHints {
            color: snap.applied.per_vertex_color,
            texcoord: !snap.no_texture,
            normal: true,
        };
        let mut override_light_model = false;
        if snap.applied.light_model == LightModel::BaseColor {
            arrays.normal = false;
        } else if !unit.batch.has_normals {
            arrays.normal = false;
            override_light_model = true;
            out.push(GfxOp::SetLighting(false));
        }

        match unit.material.kind {
            PrimitiveKind::Line => render_lines(snap, env, unit, arrays, out),
            PrimitiveKind::Point => render_points(snap, env, unit, arrays, out),
            PrimitiveKind::Triangle => {
                let mut section_pass = 0;
                let mut pushed = false;
                while render_section(snap, env, unit, &mut section_pass, &mut pushed, out) {
                    if !env.params.section_concave
                        && !snap.applied.clip_planes.is_empty()
                        && clipped_out(unit, &snap.applied.clip_planes)
                    {
                        continue;
                    }
                    if !no_triangles {
                        let plane = env.frame.view_plane;
                        let set = if !unit.batch.has_transparency
                            || unit.material.override_transparency
                        {
                            TriangleSet::AllSorted { plane }
                        } else {
                            TriangleSet::TransparentSorted { plane }
                        };
                        snap.pause_shadow(
                            out,
                            pause_default || !unit.material.shadow_style.shadowed,
                        );
                        out.push(GfxOp::DrawTriangles {
                            batch: unit.batch.id,
                            part: unit.batch.part,
                            arrays,
                            set,
                        });
                    }
                    render_outline(snap, env, unit, highlight, out);
                }
                if pushed {
                    out.push(GfxOp::PopState);
                }
            }
        }

        if override_light_model {
            out.push(GfxOp::SetLighting(true));
        }
    }

    out.push(GfxOp::SetBlendEnabled(false));
}

fn render_lines(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    unit: &DrawUnit,
    arrays: ArrayHints,
    out: &mut OpStream,
) {
    if snap.depth_write_only || snap.shadow_mapping {
        return;
    }
    let hide_seams = env.params.hidden_line_hide_seam
        && unit.batch.part.is_none()
        && unit.material.outline;
    snap.pause_shadow(out, true);
    out.push(GfxOp::DrawLines {
        batch: unit.batch.id,
        part: unit.batch.part,
        arrays,
        hide_seams,
    });
}

fn render_points(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    unit: &DrawUnit,
    arrays: ArrayHints,
    out: &mut OpStream,
) {
    if snap.depth_write_only || snap.shadow_mapping {
        return;
    }
    if !env.params.hidden_line_hide_vertex
        || unit.batch.part.is_some()
        || !unit.material.outline
    {
        snap.pause_shadow(out, true);
        out.push(GfxOp::DrawPoints { batch: unit.batch.id, part: unit.batch.part, arrays });
    }
}
