//! Scene-side data model consumed by the renderer.
//!
//! Responsibilities:
//! - material descriptors (everything needed to configure the pipeline for
//!   one batch) and their attachment lists
//! - opaque handles to pre-built geometry batches with provenance keys
//! - deterministic ordering for cache keys (length first, then
//!   lexicographic)
//!
//! Building batches and their bounds is the scene-construction
//! collaborator's job; nothing here owns vertex data.

mod batch;
mod color;
mod key;
mod material;

pub use batch::{BatchId, GeometryBatch};
pub use color::Rgba;
pub use key::CacheKey;
pub use material::{
    ClipAttachment, DepthFunc, DrawStyle, LightAttachment, LightHandle, LightModel, LinePattern,
    Material, PolygonOffsetStyle, PrimitiveKind, ShadowStyle, TextureAttachment, TextureHandle,
    Winding,
};

use std::sync::Arc;

/// Ingest shape for `set_scene` / overlay calls: material groups, each with
/// the batches rendered under that material.
pub type SceneGroups = Vec<(Arc<Material>, Vec<GeometryBatch>)>;
