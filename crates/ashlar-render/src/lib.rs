//! Frame-synchronous incremental renderer for cached, transform-tagged
//! geometry batches.
//!
//! The crate turns a pre-built scene of (material, batch) groups into a
//! minimal, correctly-ordered sequence of pipeline-state changes and draw
//! submissions per frame: opaque before transparent, back-to-front within
//! transparent buckets, selection/highlight overlays on top, stencil-filled
//! cross-section cuts, and a two-regime dashed/solid treatment for
//! always-visible lines.

pub mod geom;
pub mod logging;
pub mod render;
pub mod scene;
