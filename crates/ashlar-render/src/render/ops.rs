use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::geom::Plane;
use crate::scene::{
    BatchId, DepthFunc, LightHandle, LinePattern, PolygonOffsetStyle, Rgba, TextureHandle, Winding,
};

use super::hatch::HatchImage;

/// Which vertex attribute arrays a draw should source.
///
/// Positions are always sourced; these toggle the optional arrays.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ArrayHints {
    pub color: bool,
    pub texcoord: bool,
    pub normal: bool,
}

impl ArrayHints {
    pub const POSITION_ONLY: Self = Self { color: false, texcoord: false, normal: false };
}

/// Which triangles of a batch to draw, and in what depth order.
///
/// Mixed batches (per-vertex color with both opaque and transparent parts)
/// keep their opaque and transparent index ranges separate; passes pick the
/// subset they own.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TriangleSet {
    /// Every triangle, submission order.
    All,
    /// Only the opaque subset of a mixed batch, submission order.
    Opaque,
    /// Only the transparent subset, sorted back-to-front against the plane.
    TransparentSorted { plane: Plane },
    /// Every triangle, sorted back-to-front against the plane.
    AllSorted { plane: Plane },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlendFunc {
    /// Standard `src-alpha / one-minus-src-alpha`.
    SrcAlpha,
    /// Constant-alpha blending used when a material overrides transparency.
    ConstantAlpha { alpha: u8 },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StencilFunc {
    Always,
    Equal,
    NotEqual,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StencilAction {
    Keep,
    Replace,
    Invert,
}

/// Vertex of the section cap quad, laid out for direct upload.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// One pipeline-state change or draw submission.
///
/// A frame renders as an ordered `GfxOp` sequence; the backend executing it
/// owns the actual GPU objects (batches by `BatchId`, textures and lights by
/// handle). Ops compare by value so whole frames can be diffed in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum GfxOp {
    /// Snapshot all pipeline state; every `PushState` is paired with a
    /// `PopState` restoring it.
    PushState,
    PopState,

    SetColorMaterial(bool),
    SetModelMatrix(Mat4),

    /// Drop cached attachment bindings (clip planes, textures, lights)
    /// before they are re-issued.
    ResetAttachments,
    SetClipPlane { index: u32, plane: Plane },
    EnableClipPlane { index: u32 },
    DisableClipPlane { index: u32 },
    BindTexture { unit: u32, texture: TextureHandle, transform: Option<Mat4> },
    BindLight { light: LightHandle, transform: Option<Mat4> },
    SetTexturingEnabled(bool),

    SetDepthTest(bool),
    SetDepthWrite(bool),
    SetDepthFunc(DepthFunc),
    SetDepthClamp(bool),

    SetLighting(bool),
    SetColor(Rgba),
    SetAmbient(Rgba),
    SetEmissive(Rgba),
    SetSpecular(Rgba),
    SetShininess(f32),

    SetBlendEnabled(bool),
    SetBlendFunc(BlendFunc),

    SetLineWidth(f32),
    SetLinePattern(LinePattern),
    SetPointSize(f32),

    SetPolygonMode(PolygonMode),
    SetPolygonOffsetStyle(PolygonOffsetStyle),
    SetPolygonOffset { factor: f32, units: f32 },

    SetFrontFace(Winding),
    SetCullFace(bool),
    SetTwoSidedLighting(bool),

    SetColorMask(bool),

    SetStencilTest(bool),
    ClearStencil,
    SetStencilFunc { func: StencilFunc, reference: i32, mask: u32 },
    SetStencilOp { fail: StencilAction, zfail: StencilAction, zpass: StencilAction },

    /// Pause/resume the shadow shader program around draws that must not
    /// participate in shadowing.
    SetShadowProgram { enabled: bool },

    DrawTriangles { batch: BatchId, part: Option<u32>, arrays: ArrayHints, set: TriangleSet },
    DrawLines { batch: BatchId, part: Option<u32>, arrays: ArrayHints, hide_seams: bool },
    DrawPoints { batch: BatchId, part: Option<u32>, arrays: ArrayHints },
    DrawSectionQuad { corners: [QuadVertex; 4], hatch: Option<Arc<HatchImage>> },
}

/// Append-only op sequence for one frame.
///
/// The caller clears it between frames; the renderer only pushes.
#[derive(Debug, Default)]
pub struct OpStream {
    ops: Vec<GfxOp>,
}

impl OpStream {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, op: GfxOp) {
        self.ops.push(op);
    }

    #[inline]
    pub fn ops(&self) -> &[GfxOp] {
        &self.ops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Clears recorded ops, keeping allocated capacity for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}
