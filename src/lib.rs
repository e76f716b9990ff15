#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::struct_excessive_bools)]

//! Trellis — a backend-agnostic render graph compiler and runtime.
//!
//! An application declares a frame as a set of nodes (draw / dispatch / copy
//! operations) consuming and producing virtual resources with declared access
//! modes. [`RenderGraph::update`] compiles that declaration into an
//! executable schedule: it reconciles cached resource instances, analyses
//! per-subresource lifetimes, inserts layout transitions, partitions the
//! stream into per-queue batches with cross-queue fences, and assigns
//! lifetime-disjoint transient resources to shared heap memory.
//! [`RenderGraph::record_commands`] then replays any slice of the compiled
//! stream into a backend command buffer — concurrently for disjoint slices.
//!
//! GPU APIs plug in through the [`RuntimeBackend`] trait; the built-in
//! [`NullBackend`] compiles and replays graphs without a GPU.
//!
//! [`RenderGraph::update`]: graph::RenderGraph::update
//! [`RenderGraph::record_commands`]: graph::RenderGraph::record_commands
//! [`RuntimeBackend`]: runtime::RuntimeBackend
//! [`NullBackend`]: runtime::NullBackend

pub mod errors;
pub mod graph;
pub mod runtime;
pub mod utils;

pub use errors::{GraphError, Result};
pub use graph::access::{AccessAttr, AccessFlags, AccessTransitionInfo, ShaderStages};
pub use graph::builder::GraphBuilder;
pub use graph::format::Format;
pub use graph::graph::{
    BatchLayout, DebugPrintSink, RenderGraph, RenderGraphCreateInfo, RenderGraphDiagnosticInfo,
    RenderGraphFlags, ScheduleInfo, UpdateInfo, set_debug_print_sink,
};
pub use graph::node::{CmdCallback, CmdRenderTargetInfo, CmdViewportInfo, NodeArg, Rect, Viewport};
pub use graph::resource::{
    ClearInfo, ClearValue, ResourceDesc, ResourceFlags, ResourceId, ResourceType, SubresourceRange,
};
pub use graph::signature::{
    GraphParamDecl, GraphSignature, NodeDecl, NodeParamDecl, ParamFlags, QueueClass, Semantic,
};
pub use graph::view::{BufferView, ImageView};
pub use runtime::backend::{
    CommandBuffer, HeapInfo, MemoryTypeInfo, QueueFlags, RuntimeBackend, RuntimeHeap,
    RuntimeResource,
};
pub use runtime::null::NullBackend;
pub use runtime::record::{CmdCallbackContext, DebugMarkerMode, RecordCommandsInfo, RecordFlags};
