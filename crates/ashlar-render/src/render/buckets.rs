use std::sync::Arc;

use crate::geom::Aabb;
use crate::scene::{DrawStyle, GeometryBatch, Material, PrimitiveKind};

use super::sort::DepthBucket;

/// One (material, batch) pairing queued for submission, with bounds derived
/// once at insertion.
///
/// `suppress > 0` means an overlay has taken over the originating object and
/// the unit must not render in base-scene passes.
#[derive(Debug)]
pub(crate) struct DrawUnit {
    pub material: Arc<Material>,
    pub batch: GeometryBatch,
    /// Bounds with the batch transform applied.
    pub bounds: Aabb,
    /// Circumscribing-sphere radius of `bounds`.
    pub radius: f32,
    pub suppress: i32,
}

impl DrawUnit {
    /// Builds the unit, or `None` for a degenerate (empty-bounds) batch.
    pub fn new(material: Arc<Material>, batch: GeometryBatch) -> Option<Self> {
        let bounds = batch.world_bounds();
        if bounds.is_empty() {
            log::trace!("dropping degenerate batch {:?}", batch.id);
            return None;
        }
        let radius = bounds.radius();
        Some(Self { material, batch, bounds, radius, suppress: 0 })
    }

    #[inline]
    pub fn suppressed(&self) -> bool {
        self.suppress > 0
    }
}

/// Appends a unit to the arena, silently dropping degenerate batches.
/// Returns the index of the accepted unit.
pub(crate) fn push_draw_unit(
    units: &mut Vec<DrawUnit>,
    material: &Arc<Material>,
    batch: &GeometryBatch,
) -> Option<usize> {
    let unit = DrawUnit::new(material.clone(), batch.clone())?;
    units.push(unit);
    Some(units.len() - 1)
}

/// Which arena a pass is drawing from; selection and highlight draws pause
/// the shadow program and outline differently.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Arena {
    Scene,
    Selection,
    Highlight,
}

/// A material with no texture alpha and an opaque diffuse has nothing
/// transparent about it unless vertex colors say otherwise.
#[inline]
pub(crate) fn fully_transparent(material: &Material) -> bool {
    material.transparent_texture
        || (!material.per_vertex_color && !material.diffuse.is_opaque())
}

/// Whether the unit belongs in opaque buckets (it may also belong in
/// transparent ones; mixed per-vertex batches land in both).
#[inline]
pub(crate) fn has_opaque_side(material: &Material, batch: &GeometryBatch) -> bool {
    !fully_transparent(material) && (!material.per_vertex_color || batch.has_opaque_parts)
}

/// Whether the unit belongs in transparent buckets.
#[inline]
pub(crate) fn has_transparent_side(material: &Material, batch: &GeometryBatch) -> bool {
    fully_transparent(material) || (material.per_vertex_color && batch.has_transparency)
}

#[inline]
pub(crate) fn visible(material: &Material) -> bool {
    material.draw_style != DrawStyle::Invisible
}

/// Base-scene buckets, rebuilt on every `set_scene`.
#[derive(Debug, Default)]
pub(crate) struct SceneBuckets {
    pub opaque: Vec<usize>,
    pub opaque_on_top: Vec<usize>,
    /// On-top lines and points together.
    pub lines_on_top: Vec<usize>,
    /// Every on-top triangle unit, for the depth-write-only pre-pass.
    pub triangles_on_top: Vec<usize>,
    pub transp: DepthBucket,
    pub transp_on_top: DepthBucket,
}

impl SceneBuckets {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.opaque_on_top.clear();
        self.lines_on_top.clear();
        self.triangles_on_top.clear();
        self.transp.clear();
        self.transp_on_top.clear();
    }

    /// Routes one accepted unit into its buckets per the classification
    /// rules.
    pub fn classify(&mut self, index: usize, material: &Material, batch: &GeometryBatch) {
        if material.on_top && material.kind == PrimitiveKind::Triangle {
            self.triangles_on_top.push(index);
        }

        if has_opaque_side(material, batch) {
            if material.on_top {
                if material.kind != PrimitiveKind::Triangle {
                    self.lines_on_top.push(index);
                } else {
                    self.opaque_on_top.push(index);
                }
            } else {
                self.opaque.push(index);
            }
        }

        if has_transparent_side(material, batch) {
            if material.on_top {
                self.transp_on_top.push(index);
            } else {
                self.transp.push(index);
            }
        }
    }
}

/// Buckets over the selection arena, rebuilt by the lazy selection
/// recompute.
#[derive(Debug, Default)]
pub(crate) struct SelectionBuckets {
    pub opaque: Vec<usize>,
    pub transp: DepthBucket,
    /// On-top selection geometry drawn blended after the base scene.
    pub transp_on_top: DepthBucket,
    /// On-top selection triangles, for the depth-write-only pre-pass.
    pub triangles_on_top: Vec<usize>,
    /// On-top lines and points without an explicit per-part style.
    pub mixed_on_top: Vec<usize>,
    /// Explicitly selected on-top lines.
    pub lines_on_top: Vec<usize>,
    /// Explicitly selected on-top points.
    pub points_on_top: Vec<usize>,
}

impl SelectionBuckets {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transp.clear();
        self.transp_on_top.clear();
        self.triangles_on_top.clear();
        self.mixed_on_top.clear();
        self.lines_on_top.clear();
        self.points_on_top.clear();
    }
}

/// Buckets over the highlight arena, rebuilt eagerly on `set_highlight`.
#[derive(Debug, Default)]
pub(crate) struct HighlightBuckets {
    pub opaque: Vec<usize>,
    /// Opaque highlight lines and points together.
    pub opaque_lines: Vec<usize>,
    pub transp: DepthBucket,
}

impl HighlightBuckets {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.opaque_lines.clear();
        self.transp.clear();
    }
}
