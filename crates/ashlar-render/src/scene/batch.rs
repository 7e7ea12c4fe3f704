use std::sync::Arc;

use glam::Mat4;

use crate::geom::Aabb;

use super::CacheKey;

/// Identity of a pre-built vertex/index buffer owned by the backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BatchId(pub u64);

/// Opaque handle to one cached geometry batch: an immutable buffer built by
/// the scene-construction collaborator, plus the metadata classification
/// needs.
///
/// `bounds` is the batch-local box; the draw unit applies `transform` once
/// at insertion. A batch whose `whole` equals its own id represents the
/// entire originating object and is eligible to suppress that object's
/// base rendering when used in an overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBatch {
    pub id: BatchId,
    pub bounds: Aabb,
    /// Local transform; `None` is the identity fast path.
    pub transform: Option<Mat4>,
    /// Sub-part index; `None` means the whole object.
    pub part: Option<u32>,
    /// Provenance of the originating object, for suppression lookups.
    pub key: Option<Arc<CacheKey>>,
    /// Id of the scene node the buffer was built from.
    pub node_id: i64,
    /// The whole-object cache this batch was extracted from.
    pub whole: BatchId,

    /// Per-vertex color opacity summary, filled in at build time.
    pub has_opaque_parts: bool,
    pub has_transparency: bool,
    pub has_normals: bool,

    /// Part indices with non-flat geometry, used for outline passes.
    pub non_flat_parts: Vec<u32>,
    /// Number of face parts, used for outline passes under active clip
    /// planes.
    pub face_part_count: u32,
}

impl GeometryBatch {
    /// Minimal batch over the given bounds; callers adjust fields as needed.
    pub fn new(id: BatchId, bounds: Aabb) -> Self {
        Self {
            id,
            bounds,
            transform: None,
            part: None,
            key: None,
            node_id: 0,
            whole: id,
            has_opaque_parts: true,
            has_transparency: false,
            has_normals: true,
            non_flat_parts: Vec::new(),
            face_part_count: 0,
        }
    }

    /// Whether this batch is the whole-object cache itself (not a sub-part
    /// extraction).
    #[inline]
    pub fn is_whole(&self) -> bool {
        self.whole == self.id
    }

    /// Bounds with the batch transform applied.
    #[inline]
    pub fn world_bounds(&self) -> Aabb {
        match &self.transform {
            Some(m) => self.bounds.transformed(m),
            None => self.bounds,
        }
    }
}
