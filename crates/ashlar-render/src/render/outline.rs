use crate::scene::PrimitiveKind;

use super::buckets::DrawUnit;
use super::ops::{ArrayHints, GfxOp, OpStream, PolygonMode, StencilAction, StencilFunc, TriangleSet};
use super::state::{PassEnv, PassSnapshot};

/// Draws the hidden-line outline of a triangle unit: per part, fill the
/// silhouette into the stencil with color writes off, then redraw in
/// polygon-mode lines where the stencil bit is clear, leaving only the
/// contour.
///
/// Runs for materials with the outline flag, and for highlighted face parts
/// when the preselected-face-outline param is on.
pub(crate) fn render_outline(
    snap: &mut PassSnapshot,
    env: &PassEnv<'_>,
    unit: &DrawUnit,
    highlight: bool,
    out: &mut OpStream,
) {
    let part = unit.batch.part;
    if snap.shadow_mapping
        || snap.depth_write_only
        || unit.material.kind != PrimitiveKind::Triangle
        || (!unit.material.outline
            && (!env.params.show_preselected_face_outline || !highlight || part.is_none()))
    {
        return;
    }

    // Whole-object outlines iterate the batch's non-flat parts; under
    // active clip planes every face part contributes a contour.
    let parts: Vec<Option<u32>> = if !snap.applied.clip_planes.is_empty() && part.is_none() {
        (0..unit.batch.face_part_count).map(Some).collect()
    } else if !unit.batch.non_flat_parts.is_empty() && part.is_none() {
        unit.batch.non_flat_parts.iter().copied().map(Some).collect()
    } else {
        vec![part]
    };

    let mut pushed = false;
    for p in parts {
        if !pushed {
            pushed = true;
            out.push(GfxOp::PushState);
            snap.pause_shadow(out, true);

            out.push(GfxOp::SetStencilTest(true));
            out.push(GfxOp::SetLighting(false));
            out.push(GfxOp::SetTexturingEnabled(false));

            let color = if part.is_some() {
                snap.applied.emissive
            } else {
                unit.material.hidden_line_color
            };
            out.push(GfxOp::SetColor(color.with_alpha(0xff)));

            let mut line_width = unit.material.line_width;
            if highlight {
                out.push(GfxOp::SetBlendEnabled(false));
                let mut w = line_width * env.params.selection_line_thicken.max(1.0);
                if env.params.selection_line_max_width > 1.0 {
                    w = w.min(line_width.max(env.params.selection_line_max_width));
                }
                line_width = w;
            }
            out.push(GfxOp::SetLineWidth(line_width * 1.5));
        }

        out.push(GfxOp::ClearStencil);
        out.push(GfxOp::SetColorMask(false));
        out.push(GfxOp::SetStencilFunc { func: StencilFunc::Always, reference: 1, mask: !0 });
        out.push(GfxOp::SetStencilOp {
            fail: StencilAction::Keep,
            zfail: StencilAction::Replace,
            zpass: StencilAction::Replace,
        });
        out.push(GfxOp::SetPolygonMode(PolygonMode::Fill));
        out.push(GfxOp::DrawTriangles {
            batch: unit.batch.id,
            part: p,
            arrays: ArrayHints::POSITION_ONLY,
            set: TriangleSet::All,
        });

        out.push(GfxOp::SetColorMask(true));
        out.push(GfxOp::SetStencilFunc { func: StencilFunc::NotEqual, reference: 1, mask: !0 });
        out.push(GfxOp::SetPolygonMode(PolygonMode::Line));
        out.push(GfxOp::DrawTriangles {
            batch: unit.batch.id,
            part: p,
            arrays: ArrayHints::POSITION_ONLY,
            set: TriangleSet::All,
        });
    }

    if pushed {
        out.push(GfxOp::PopState);
        // The state pop does not restore the current color side channel.
        out.push(GfxOp::SetColor(snap.applied.diffuse));
        if highlight {
            out.push(GfxOp::SetLineWidth(snap.applied.line_width));
        }
    }
}
