//! Nodes and Compiled Command Records
//!
//! A [`Cmd`] is one declared unit of GPU work for the current frame: a
//! reference to its [`NodeDecl`], one argument per declared parameter, and
//! the callback the record driver invokes to emit the actual API commands.
//!
//! During compilation each command gains a [`CmdInfo`] with its flattened
//! [`CmdAccessInfo`] records (one per `(parameter, array element)` with a
//! non-unknown access) and, for graphics nodes, a [`CmdRenderPassInfo`]
//! derived from the bound attachments.
//!
//! [`NodeDecl`]: crate::graph::signature::NodeDecl

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::graph::access::AccessAttr;
use crate::graph::format::Format;
use crate::graph::resource::{MAX_RENDER_TARGETS, RESOURCE_ID_INVALID, ResourceId, SubresourceRange};
use crate::graph::view::{BufferView, ImageView};
use crate::runtime::record::CmdCallbackContext;
use crate::utils::Span;

/// Type for node (command) identifiers.
pub type NodeId = u32;

/// Constant for an invalid node id.
pub const NODE_ID_INVALID: NodeId = u32::MAX;

/// A viewport rectangle with depth range.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Minimum depth.
    pub min_z: f32,
    /// Maximum depth.
    pub max_z: f32,
}

impl Viewport {
    /// Creates a viewport covering `width` × `height` with the default depth
    /// range.
    #[must_use]
    pub const fn covering(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_z: 0.0,
            max_z: 1.0,
        }
    }
}

/// An integer rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: i32,
    /// Height.
    pub height: i32,
}

impl Rect {
    /// Creates a rectangle covering `width` × `height` at the origin.
    #[must_use]
    pub const fn covering(width: i32, height: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// One node argument.
///
/// A single argument vector replaces typed per-parameter marshalling: each
/// entry matches one [`NodeParamDecl`] slot, and the parameter declaration
/// drives interpretation. Accessors keep call sites typed.
///
/// [`NodeParamDecl`]: crate::graph::signature::NodeParamDecl
#[derive(Clone, Debug)]
pub enum NodeArg {
    /// Image views for a resource parameter (one per array element).
    ImageViews(SmallVec<[ImageView; 1]>),
    /// Buffer views for a resource parameter (one per array element).
    BufferViews(SmallVec<[BufferView; 1]>),
    /// Viewport data.
    Viewports(SmallVec<[Viewport; 1]>),
    /// Scissor rectangle data.
    Scissors(SmallVec<[Rect; 1]>),
    /// Color clear value.
    ClearColor([f32; 4]),
    /// Depth clear value.
    ClearDepth(f32),
    /// Stencil clear value (lower 8 bits used).
    ClearStencil(u32),
    /// Opaque constant data forwarded to the callback.
    Raw(Vec<u8>),
}

impl NodeArg {
    /// Creates an argument holding one image view.
    #[must_use]
    pub fn image_view(view: ImageView) -> Self {
        Self::ImageViews(SmallVec::from_elem(view, 1))
    }

    /// Creates an argument holding one buffer view.
    #[must_use]
    pub fn buffer_view(view: BufferView) -> Self {
        Self::BufferViews(SmallVec::from_elem(view, 1))
    }

    /// Creates an argument holding one viewport.
    #[must_use]
    pub fn viewport(viewport: Viewport) -> Self {
        Self::Viewports(SmallVec::from_elem(viewport, 1))
    }

    /// Creates an argument holding one scissor rectangle.
    #[must_use]
    pub fn scissor(rect: Rect) -> Self {
        Self::Scissors(SmallVec::from_elem(rect, 1))
    }

    /// The image views, if this argument holds any.
    #[must_use]
    pub fn as_image_views(&self) -> Option<&[ImageView]> {
        match self {
            Self::ImageViews(views) => Some(views),
            _ => None,
        }
    }

    /// The buffer views, if this argument holds any.
    #[must_use]
    pub fn as_buffer_views(&self) -> Option<&[BufferView]> {
        match self {
            Self::BufferViews(views) => Some(views),
            _ => None,
        }
    }

    /// The viewports, if this argument holds any.
    #[must_use]
    pub fn as_viewports(&self) -> Option<&[Viewport]> {
        match self {
            Self::Viewports(viewports) => Some(viewports),
            _ => None,
        }
    }

    /// The scissor rectangles, if this argument holds any.
    #[must_use]
    pub fn as_scissors(&self) -> Option<&[Rect]> {
        match self {
            Self::Scissors(rects) => Some(rects),
            _ => None,
        }
    }

    /// Number of array elements the argument carries.
    #[must_use]
    pub fn element_count(&self) -> u32 {
        match self {
            Self::ImageViews(views) => views.len() as u32,
            Self::BufferViews(views) => views.len() as u32,
            Self::Viewports(viewports) => viewports.len() as u32,
            Self::Scissors(rects) => rects.len() as u32,
            _ => 1,
        }
    }

    /// The `(resource_id, format, temporal_layer)` triple of the `element`-th
    /// view, for either view kind.
    #[must_use]
    pub(crate) fn view_binding(&self, element: u32) -> Option<(ResourceId, Format, u32)> {
        match self {
            Self::ImageViews(views) => views
                .get(element as usize)
                .map(|v| (v.resource_id, v.format, v.temporal_layer)),
            Self::BufferViews(views) => views
                .get(element as usize)
                .map(|v| (v.resource_id, v.format, v.temporal_layer)),
            _ => None,
        }
    }
}

bitflags! {
    /// Bitflags controlling how the record driver wraps a node callback.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct CallbackFlags: u32 {
        /// The callback manages its own render pass; skip the automatic
        /// render-pass begin / end hooks.
        const CUSTOM_RENDER_PASS = 1 << 0;
    }
}

/// Node record callback. Invoked by the record driver with the command's
/// callback context; emits backend commands for the node.
pub type CmdCallback = Arc<dyn Fn(&CmdCallbackContext<'_>) + Send + Sync>;

/// One declared node of the current frame.
#[derive(Clone)]
pub struct Cmd {
    /// The node declaration this command instantiates.
    pub node_decl_id: u32,
    /// One argument per declared parameter.
    pub args: Vec<NodeArg>,
    /// Record callback, if any.
    pub callback: Option<CmdCallback>,
    /// Callback behavior flags.
    pub callback_flags: CallbackFlags,
    /// User tag forwarded to the callback context.
    pub user_tag: u64,
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd")
            .field("node_decl_id", &self.node_decl_id)
            .field("args", &self.args.len())
            .field("has_callback", &self.callback.is_some())
            .field("user_tag", &self.user_tag)
            .finish()
    }
}

/// Flattened access record for one `(node, parameter, array element)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CmdAccessInfo {
    /// Accessed resource instance, or `RESOURCE_ID_INVALID` for null views.
    pub resource_id: ResourceId,
    /// Accessed subresource range (view range ∩ resource range, aspects
    /// derived from the access).
    pub range: SubresourceRange,
    /// The access attribute, including decorations added by compilation.
    pub access: AccessAttr,
    /// Format the view sees.
    pub view_format: Format,
}

impl CmdAccessInfo {
    /// An access record referencing no resource.
    pub const INVALID: Self = Self {
        resource_id: RESOURCE_ID_INVALID,
        range: SubresourceRange::whole_buffer(),
        access: AccessAttr::UNKNOWN,
        view_format: Format::Unknown,
    };
}

/// Render-target state of a graphics command.
#[derive(Clone, Copy, Debug, Default)]
pub struct CmdRenderTargetInfo {
    /// Number of bound render targets.
    pub num_render_targets: u32,
    /// MSAA sample count across the attachments.
    pub num_samples: u32,
    /// Depth-stencil format, `Unknown` when no depth buffer is bound.
    pub depth_stencil_format: Format,
    /// Per-slot render-target formats.
    pub render_target_formats: [Format; MAX_RENDER_TARGETS],
}

/// Viewport / scissor state of a graphics command.
#[derive(Clone, Debug, Default)]
pub struct CmdViewportInfo {
    /// Bound viewports.
    pub viewports: SmallVec<[Viewport; 1]>,
    /// Bound scissor rectangles.
    pub scissors: SmallVec<[Rect; 1]>,
    /// Render area covering the smallest bound attachment.
    pub default_render_area: Rect,
}

/// Per-command render pass state computed by pre-processing.
#[derive(Clone, Debug, Default)]
pub struct CmdRenderPassInfo {
    /// Viewport / scissor state.
    pub viewport_info: CmdViewportInfo,
    /// Render-target state.
    pub render_target_info: CmdRenderTargetInfo,
}

/// Compiled per-command record.
#[derive(Clone, Debug)]
pub struct CmdInfo {
    /// The node declaration the command instantiates.
    pub node_decl_id: u32,
    /// Span of the command's records within the flattened access vector.
    pub accesses: Span,
    /// Render pass state for graphics nodes with attachments.
    pub render_pass_info: Option<CmdRenderPassInfo>,
}
