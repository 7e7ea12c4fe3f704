//! Per-frame rendering subsystem.
//!
//! Consumes `scene` draw data and turns each frame into an ordered `GfxOp`
//! sequence: bucket classification on ingestion, overlay management with
//! base-scene suppression, material-state diffing to drop redundant
//! transitions, back-to-front transparency, stencil section caps, and the
//! fixed multi-pass orchestration on top.
//!
//! Convention:
//! - the renderer owns no GPU objects; batches, textures, and lights are
//!   referenced by handle and resolved by the backend executing the stream
//! - every `PushState` op is paired with a `PopState` on all exit paths

mod buckets;
mod hatch;
mod ops;
mod outline;
mod overlay;
mod params;
mod pass;
mod renderer;
mod section;
mod sort;
mod state;

pub use hatch::HatchImage;
pub use ops::{
    ArrayHints, BlendFunc, GfxOp, OpStream, PolygonMode, QuadVertex, StencilAction, StencilFunc,
    TriangleSet,
};
pub use overlay::{SelectionId, SelectionStyle};
pub use params::{FrameContext, FrameStyle, RenderOutcome, RenderParams};
pub use renderer::Renderer;
