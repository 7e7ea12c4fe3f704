use glam::{Mat4, UVec2};

use crate::geom::Plane;

/// Viewing-collaborator toggles consumed while scheduling a frame.
///
/// Values persist across frames on the renderer; the host updates them when
/// its settings change.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    /// Fill section cuts with a solid (or hatched) cap.
    pub section_fill: bool,
    /// Isolate clip planes per pass so concave cross-sections render
    /// correctly, at the cost of one pass per plane.
    pub section_concave: bool,
    /// Invert the cap fill color against the applied diffuse.
    pub section_fill_invert: bool,
    /// Drop clip planes from on-top materials.
    pub no_section_on_top: bool,
    /// Texture the cap with the installed hatch image.
    pub section_hatch_enable: bool,
    /// Hatch density multiplier (on-screen density stays constant under
    /// zoom).
    pub section_hatch_scale: f32,

    /// Alpha applied to dashed on-top line rendering, 0..=1.
    pub transparency_on_top: f32,

    /// Line width multiplier for highlight passes (>= 1).
    pub selection_line_thicken: f32,
    /// Upper clamp for thickened lines; values <= 1 disable the clamp.
    pub selection_line_max_width: f32,
    /// Point size multiplier for highlight passes; values < 1 fall back to
    /// the line multiplier.
    pub selection_point_scale: f32,
    /// Upper clamp for scaled points; values <= 1 disable the clamp.
    pub selection_point_max_size: f32,
    /// Dashed pattern substituted in line-pattern passes (0 keeps the
    /// material's own pattern).
    pub selection_line_pattern: u16,
    /// Repeat factor for the substituted pattern (applied when > 1).
    pub selection_line_pattern_scale: u16,

    /// Hidden-line mode: skip seam lines of whole outlined objects.
    pub hidden_line_hide_seam: bool,
    /// Hidden-line mode: skip vertices of whole outlined objects.
    pub hidden_line_hide_vertex: bool,
    /// Hidden-line mode: skip faces of outlined objects.
    pub hidden_line_hide_face: bool,
    /// Outline the highlighted face part during preselection.
    pub show_preselected_face_outline: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            section_fill: true,
            section_concave: false,
            section_fill_invert: false,
            no_section_on_top: false,
            section_hatch_enable: true,
            section_hatch_scale: 1.0,
            transparency_on_top: 0.5,
            selection_line_thicken: 1.5,
            selection_line_max_width: 4.0,
            selection_point_scale: 2.5,
            selection_point_max_size: 6.0,
            selection_line_pattern: 0x0f0f,
            selection_line_pattern_scale: 2,
            hidden_line_hide_seam: true,
            hidden_line_hide_vertex: true,
            hidden_line_hide_face: false,
            show_preselected_face_outline: false,
        }
    }
}

/// Shadow-related frame flags, set by the host per render invocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FrameStyle {
    /// Shadow rendering is active this frame; transparency resolves in a
    /// delayed second invocation.
    pub shadows: bool,
    /// This frame renders into a shadow map.
    pub shadow_map: bool,
    /// The shadow map pass wants transparent geometry.
    pub transp_shadow_map: bool,
}

/// Per-frame viewing state handed to `render`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameContext {
    /// External model transform applied on top of every batch transform.
    pub model_matrix: Mat4,
    /// World-space view plane; transparent buckets sort against its normal.
    pub view_plane: Plane,
    /// Viewport size in pixels.
    pub viewport: UVec2,
    /// World-to-screen scale at mid scene depth, for hatch density.
    pub world_scale: f32,
    pub style: FrameStyle,
    /// Second invocation of a shadow frame, resolving delayed transparency.
    pub delayed: bool,
    /// The scene draws in hidden-lines display mode this frame.
    pub show_hidden_lines: bool,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self {
            model_matrix: Mat4::IDENTITY,
            view_plane: Plane::default(),
            viewport: UVec2::new(1, 1),
            world_scale: 1.0,
            style: FrameStyle::default(),
            delayed: false,
            show_hidden_lines: false,
        }
    }
}

/// Result of one `render` invocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RenderOutcome {
    Completed,
    /// Opaque passes ran; the caller must re-invoke with
    /// `FrameContext::delayed` set once the rest of the scene has been
    /// traversed.
    Deferred,
}
