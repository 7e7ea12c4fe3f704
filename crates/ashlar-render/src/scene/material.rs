use glam::Mat4;

use crate::geom::Plane;

use super::Rgba;

/// Primitive topology of a batch's material.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
    Triangle,
    Line,
    Point,
}

impl PrimitiveKind {
    /// Stable discriminator for whole-object overlay keys.
    #[inline]
    pub(crate) fn discriminant(self) -> i64 {
        match self {
            PrimitiveKind::Triangle => 0,
            PrimitiveKind::Line => 1,
            PrimitiveKind::Point => 2,
        }
    }
}

/// How filled primitives are rasterized. `Invisible` batches are dropped at
/// classification time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DrawStyle {
    Filled,
    Lines,
    Points,
    Invisible,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DepthFunc {
    Never,
    Always,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LightModel {
    /// Flat, unlit color.
    BaseColor,
    Phong,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Winding {
    Ccw,
    Cw,
}

/// Stipple pattern for line rendering: low 16 bits are the pattern, the
/// high 16 bits a repeat factor. An all-ones pattern means solid.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LinePattern(pub u32);

impl LinePattern {
    pub const SOLID: Self = Self(0xffff);

    #[inline]
    pub const fn pattern(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub const fn factor(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub const fn is_solid(self) -> bool {
        self.pattern() == 0xffff
    }
}

impl Default for LinePattern {
    #[inline]
    fn default() -> Self {
        Self::SOLID
    }
}

/// Which raster modes get a polygon offset applied.
///
/// Stored as booleans rather than packed bits to keep it explicit.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct PolygonOffsetStyle {
    pub filled: bool,
    pub lines: bool,
    pub points: bool,
}

/// Shadow participation of a material.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShadowStyle {
    /// Receives shadows (shadow shader stays active while drawing it).
    pub shadowed: bool,
    /// Rendered into shadow maps.
    pub casts_shadow: bool,
}

impl Default for ShadowStyle {
    #[inline]
    fn default() -> Self {
        Self { shadowed: true, casts_shadow: true }
    }
}

/// Backend-owned texture identity. Equality of handles is the identity
/// short-circuit used by the diff engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureHandle(pub u64);

/// Backend-owned light identity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LightHandle(pub u64);

/// A clip plane carried by a material, with an optional local transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipAttachment {
    pub plane: Plane,
    pub transform: Option<Mat4>,
}

impl ClipAttachment {
    /// The plane with its local transform applied.
    #[inline]
    pub fn effective_plane(&self) -> Plane {
        match &self.transform {
            Some(m) => self.plane.transformed(m),
            None => self.plane,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureAttachment {
    pub unit: u32,
    pub texture: TextureHandle,
    pub transform: Option<Mat4>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightAttachment {
    pub light: LightHandle,
    pub transform: Option<Mat4>,
}

/// Everything needed to configure the pipeline for one batch.
///
/// Materials are immutable once built and shared via `Arc`; the diff engine
/// compares field-by-field, with handle equality as the short-circuit for
/// attachments.
///
/// Invariant: two materials with identical field values configure identical
/// pipeline state regardless of submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub kind: PrimitiveKind,
    pub draw_style: DrawStyle,

    /// Colors come from per-vertex data rather than `diffuse`.
    pub per_vertex_color: bool,
    /// Any bound texture carries an alpha channel.
    pub transparent_texture: bool,
    /// Render ignoring depth against the rest of the scene.
    pub on_top: bool,
    /// Force blending with the diffuse alpha regardless of texture/vertex
    /// opacity.
    pub override_transparency: bool,
    /// Overlay material highlighting a sub-part of an object.
    pub partial_highlight: bool,
    /// Hidden-line outline treatment for this batch.
    pub outline: bool,

    /// Diffuse color; the alpha byte encodes opacity.
    pub diffuse: Rgba,
    pub ambient: Rgba,
    pub emissive: Rgba,
    pub specular: Rgba,
    pub shininess: f32,
    pub hidden_line_color: Rgba,

    pub line_width: f32,
    pub line_pattern: LinePattern,
    pub point_size: f32,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub depth_clamp: bool,

    pub light_model: LightModel,
    pub winding: Winding,
    pub culling: bool,
    pub two_sided: bool,

    pub polygon_offset_style: PolygonOffsetStyle,
    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,

    pub shadow_style: ShadowStyle,

    pub clip_planes: Vec<ClipAttachment>,
    pub textures: Vec<TextureAttachment>,
    pub lights: Vec<LightAttachment>,
}

impl Material {
    /// Baseline material for the given primitive kind.
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            draw_style: DrawStyle::Filled,
            per_vertex_color: false,
            transparent_texture: false,
            on_top: false,
            override_transparency: false,
            partial_highlight: false,
            outline: false,
            diffuse: Rgba::new(0xcc, 0xcc, 0xcc, 0xff),
            ambient: Rgba::new(0x33, 0x33, 0x33, 0xff),
            emissive: Rgba::new(0, 0, 0, 0xff),
            specular: Rgba::new(0, 0, 0, 0xff),
            shininess: 0.2,
            hidden_line_color: Rgba::new(0x66, 0x66, 0x66, 0xff),
            line_width: 1.0,
            line_pattern: LinePattern::SOLID,
            point_size: 1.0,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            depth_clamp: false,
            light_model: LightModel::Phong,
            winding: Winding::Ccw,
            culling: false,
            two_sided: false,
            polygon_offset_style: PolygonOffsetStyle::default(),
            polygon_offset_factor: 0.0,
            polygon_offset_units: 0.0,
            shadow_style: ShadowStyle::default(),
            clip_planes: Vec::new(),
            textures: Vec::new(),
            lights: Vec::new(),
        }
    }

    #[inline]
    pub fn has_line_pattern(&self) -> bool {
        !self.line_pattern.is_solid()
    }
}
