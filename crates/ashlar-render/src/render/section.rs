use glam::{Quat, Vec3};

use crate::scene::{ClipAttachment, DepthFunc, PolygonOffsetStyle, PrimitiveKind};

use super::buckets::DrawUnit;
use super::ops::{
    ArrayHints, GfxOp, OpStream, QuadVertex, StencilAction, StencilFunc, TriangleSet,
};
use super::state::{PassEnv, PassSnapshot};

/// Whether the unit's bounds lie entirely behind one of the active clip
/// planes (nothing of it survives clipping).
pub(crate) fn clipped_out(unit: &DrawUnit, clips: &[ClipAttachment]) -> bool {
    clips
        .iter()
        .any(|clip| unit.bounds.max_distance(&clip.effective_plane()) < 0.0)
}

/// Runs one section sub-pass for the unit and reports whether the caller
/// should submit its geometry for this iteration.
///
/// The caller drives this in a loop with `pass` starting at 0; each
/// invocation consumes one pass index. With fill enabled (non-concave) the
/// first iteration emits stencil+cap sub-passes for every clip plane
/// (recursively) and geometry draws once under all planes. In concave mode
/// each iteration isolates a single plane and geometry draws once per
/// plane. With no clip planes or fill work to do, exactly the first
/// iteration reports `true`, so unclipped geometry still draws once.
///
/// `pushed` tracks the scoped state push; the caller pops after the loop.
pub(crate) fn render_section(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    unit: &DrawUnit,
    pass: &mut usize,
    pushed: &mut bool,
    out: &mut OpStream,
) -> bool {
    let cur = *pass;
    *pass += 1;

    let clip_count = snap.applied.clip_planes.len();
    let concave = env.params.section_concave && clip_count > 1;

    if snap.depth_write_only
        || cur >= clip_count
        || unit.batch.part.is_some()
        || (!env.params.section_fill && !concave)
    {
        return cur == 0;
    }

    // Lines and points cannot fill a cut; in concave mode they still need
    // per-plane isolation.
    if unit.material.kind != PrimitiveKind::Triangle {
        if !concave {
            return cur == 0;
        }
        if !*pushed {
            *pushed = true;
            out.push(GfxOp::PushState);
        }
        if cur == 0 {
            for i in 1..clip_count {
                out.push(GfxOp::DisableClipPlane { index: i as u32 });
            }
        } else {
            out.push(GfxOp::DisableClipPlane { index: (cur - 1) as u32 });
        }
        out.push(GfxOp::EnableClipPlane { index: cur as u32 });
        return true;
    }

    if !*pushed {
        *pushed = true;
        out.push(GfxOp::PushState);
    }

    if cur == 0 && concave {
        if snap.applied.depth_func != DepthFunc::Less {
            out.push(GfxOp::SetDepthFunc(DepthFunc::Less));
        }
        if snap.applied.polygon_offset_style.filled {
            out.push(GfxOp::SetPolygonOffsetStyle(PolygonOffsetStyle {
                filled: false,
                ..snap.applied.polygon_offset_style
            }));
        }
    }

    // Sub-pass 1: invert the stencil bit per covered pixel, with only the
    // current plane clipping and no color or depth output.
    out.push(GfxOp::SetStencilTest(true));
    out.push(GfxOp::ClearStencil);

    for i in 0..clip_count {
        if i == cur {
            out.push(GfxOp::EnableClipPlane { index: i as u32 });
        } else {
            out.push(GfxOp::DisableClipPlane { index: i as u32 });
        }
    }

    out.push(GfxOp::PushState);
    out.push(GfxOp::SetDepthTest(false));
    out.push(GfxOp::SetColorMask(false));
    out.push(GfxOp::SetStencilFunc { func: StencilFunc::Always, reference: 1, mask: 0x01 });
    out.push(GfxOp::SetCullFace(false));
    out.push(GfxOp::SetLighting(false));
    out.push(GfxOp::SetStencilOp {
        fail: StencilAction::Keep,
        zfail: StencilAction::Keep,
        zpass: StencilAction::Invert,
    });
    out.push(GfxOp::DrawTriangles {
        batch: unit.batch.id,
        part: unit.batch.part,
        arrays: ArrayHints::POSITION_ONLY,
        set: TriangleSet::All,
    });
    out.push(GfxOp::SetColorMask(true));
    out.push(GfxOp::PopState);

    // Sub-pass 2: draw the cap where the stencil bit survived, with the
    // processed plane released and the others restored (concave keeps them
    // all off).
    if !concave {
        for i in 0..clip_count {
            if i != cur {
                out.push(GfxOp::EnableClipPlane { index: i as u32 });
            }
        }
    }
    out.push(GfxOp::DisableClipPlane { index: cur as u32 });

    out.push(GfxOp::SetStencilFunc { func: StencilFunc::Equal, reference: 1, mask: 0x01 });
    out.push(GfxOp::SetStencilOp {
        fail: StencilAction::Keep,
        zfail: StencilAction::Keep,
        zpass: StencilAction::Keep,
    });

    out.push(GfxOp::PushState);
    out.push(GfxOp::SetDepthTest(true));
    out.push(GfxOp::SetDepthWrite(true));

    emit_cap_quad(snap, env, unit, cur, out);

    out.push(GfxOp::PopState);

    if env.params.section_fill_invert {
        out.push(GfxOp::SetColor(snap.applied.diffuse));
    }

    out.push(GfxOp::SetStencilTest(false));

    if !concave {
        // Remaining planes fill through nested passes; geometry then draws
        // once with every plane re-enabled.
        render_section(snap, env, unit, pass, pushed, out);
        if cur == 0 {
            for i in 0..clip_count {
                out.push(GfxOp::EnableClipPlane { index: i as u32 });
            }
        }
    } else {
        for i in 0..clip_count {
            if i == cur {
                out.push(GfxOp::EnableClipPlane { index: i as u32 });
            } else {
                out.push(GfxOp::DisableClipPlane { index: i as u32 });
            }
        }
    }
    true
}

/// Emits the cap quad spanning the unit's bounding sphere, oriented to the
/// clip plane, optionally hatched at constant on-screen density.
fn emit_cap_quad(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    unit: &DrawUnit,
    clip_index: usize,
    out: &mut OpStream,
) {
    let plane = snap.applied.clip_planes[clip_index].effective_plane();
    let dir = plane.normal();
    let rotation = Quat::from_rotation_arc(Vec3::Z, dir);
    let u = rotation * Vec3::X * unit.radius;
    let v = rotation * Vec3::Y * unit.radius;
    let center = plane.project(unit.bounds.center());

    let mut corners = [
        center + v - u,
        center + v + u,
        center - v + u,
        center - v - u,
    ];
    // Corners are in scene space; the active model matrix maps them back
    // out, so pre-apply its inverse.
    if snap.current_matrix != glam::Mat4::IDENTITY {
        let inverse = snap.current_matrix.inverse();
        for corner in &mut corners {
            *corner = inverse.transform_point3(*corner);
        }
    }

    if env.params.section_fill_invert {
        out.push(GfxOp::SetColor(snap.applied.diffuse.section_inverted()));
    }

    let mut hatch_scale = (0.3 * env.params.section_hatch_scale).max(1e-4);
    let hatch = if env.params.section_hatch_enable { env.hatch } else { None };
    if let Some(image) = hatch {
        snap.pause_shadow(out, true);
        // Pixel footprint of one world unit at mid depth, scaled so the
        // pattern density stays constant on screen while zooming.
        let scale = hatch_scale * env.frame.world_scale;
        let pixel_size = env.frame.viewport.x as f32 / scale;
        let cap_pixels = unit.radius * pixel_size;
        hatch_scale = (cap_pixels / image.width() as f32).max(1e-3);
    }

    let normal = (-dir).to_array();
    let uv = |s: f32, t: f32| [s * hatch_scale, t * hatch_scale];
    let quad = [
        QuadVertex { position: corners[0].to_array(), normal, uv: uv(0.0, 1.0) },
        QuadVertex { position: corners[1].to_array(), normal, uv: uv(0.0, 0.0) },
        QuadVertex { position: corners[2].to_array(), normal, uv: uv(1.0, 0.0) },
        QuadVertex { position: corners[3].to_array(), normal, uv: uv(1.0, 1.0) },
    ];
    out.push(GfxOp::DrawSectionQuad { corners: quad, hatch: hatch.cloned() });
}
