//! Record Driver
//!
//! Linear replay of a compiled runtime-cmd slice into one backend command
//! buffer. Transitions invoke the backend's transition callback; nodes are
//! wrapped in debug markers and render-pass begin / end hooks and then
//! dispatched to their user callback through a [`CmdCallbackContext`].
//!
//! # Concurrency
//!
//! Recording is the engine's parallelism seam: multiple threads may replay
//! *disjoint* `[cmd_begin, cmd_begin + num_cmds)` slices of one compiled
//! graph concurrently, each into its own command buffer. All compiled state
//! is read-only here; the per-call error slot lives inside the context.
//!
//! # Error Reporting
//!
//! A callback may report one error on the primary context; the first
//! non-OK code wins. After an error the driver stops invoking user
//! callbacks but keeps emitting render-pass begin / end hooks so passes
//! stay balanced, then surfaces the first error.

use std::cell::Cell;

use bitflags::bitflags;

use crate::errors::{GraphError, Result};
use crate::graph::node::{
    CallbackFlags, Cmd, CmdAccessInfo, CmdInfo, CmdRenderTargetInfo, CmdViewportInfo, NodeArg,
    NodeId,
};
use crate::graph::resource::{RESOURCE_ID_INVALID, ResourceDesc, ResourceInstance};
use crate::graph::signature::NodeDecl;
use crate::graph::compile::GraphState;
use crate::runtime::backend::{CommandBuffer, RuntimeBackend, RuntimeResource, TransitionRecord};

bitflags! {
    /// Bitflags controlling command recording.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct RecordFlags: u32 {
        /// Emit per-node debug markers.
        const ENABLE_DEBUG_MARKERS = 1 << 0;
    }
}

/// Debug marker modes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DebugMarkerMode {
    /// Beginning of a marker region.
    Begin,
    /// Standalone label.
    Label,
    /// End of a marker region.
    End,
}

/// Parameters for replaying a slice of the compiled stream.
#[derive(Clone, Copy, Debug)]
pub struct RecordCommandsInfo {
    /// Backend command buffer receiving the commands.
    pub command_buffer: CommandBuffer,
    /// Opaque application context forwarded to callbacks.
    pub user_context: u64,
    /// First runtime-cmd to replay.
    pub cmd_begin: u32,
    /// Number of runtime-cmds to replay.
    pub num_cmds: u32,
    /// Recording behavior flags.
    pub flags: RecordFlags,
}

/// Context handed to a node's record callback.
///
/// Borrows the compiled graph; everything reachable from it is read-only.
/// The context is valid for the duration of the callback.
pub struct CmdCallbackContext<'a> {
    /// Command buffer the node records into.
    pub command_buffer: CommandBuffer,
    /// Application context from [`RecordCommandsInfo::user_context`].
    pub user_context: u64,
    /// User tag of the node.
    pub user_tag: u64,
    /// The node's arguments, one per declared parameter.
    pub args: &'a [NodeArg],
    /// Id of the node being recorded.
    pub cmd_id: NodeId,
    /// Recording flags of the enclosing record call.
    pub record_flags: RecordFlags,

    node_decl: &'a NodeDecl,
    cmd_info: &'a CmdInfo,
    cmd_accesses: &'a [CmdAccessInfo],
    resource_instances: &'a [ResourceInstance],
    is_primary: bool,
    error: Cell<Option<GraphError>>,
}

impl<'a> CmdCallbackContext<'a> {
    /// Name of the node's declaration.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_decl.name
    }

    /// The node's declaration.
    #[must_use]
    pub fn node_decl(&self) -> &NodeDecl {
        self.node_decl
    }

    /// Render-target state of the node; `invalid-operation` for nodes
    /// without render-pass info.
    pub fn render_target_info(&self) -> Result<&CmdRenderTargetInfo> {
        self.cmd_info
            .render_pass_info
            .as_ref()
            .map(|info| &info.render_target_info)
            .ok_or(GraphError::InvalidOperation)
    }

    /// Viewport / scissor state of the node; `invalid-operation` for nodes
    /// without render-pass info.
    pub fn viewport_info(&self) -> Result<&CmdViewportInfo> {
        self.cmd_info
            .render_pass_info
            .as_ref()
            .map(|info| &info.viewport_info)
            .ok_or(GraphError::InvalidOperation)
    }

    /// The flattened access record of one `(parameter, element)`.
    pub fn access_info(&self, param_index: u32, element: u32) -> Result<&CmdAccessInfo> {
        let param = self
            .node_decl
            .params
            .get(param_index as usize)
            .ok_or(GraphError::IndexOutOfBounds {
                context: "node parameter",
                index: param_index as usize,
            })?;
        if !param.is_resource() {
            return Err(GraphError::TypeMismatch);
        }
        if element >= param.element_count {
            return Err(GraphError::IndexOutOfBounds {
                context: "parameter array element",
                index: element as usize,
            });
        }
        let index = (param.access_offset() + element) as usize;
        self.cmd_accesses.get(index).ok_or(GraphError::InternalError)
    }

    /// The resource instance a parameter element resolves to.
    fn resolved_instance(&self, param_index: u32, element: u32) -> Result<&ResourceInstance> {
        let access = self.access_info(param_index, element)?;
        if access.resource_id == RESOURCE_ID_INVALID {
            return Err(GraphError::KeyNotFound);
        }
        self.resource_instances
            .get(access.resource_id as usize)
            .ok_or(GraphError::InternalError)
    }

    /// The backend handle of a parameter element's resource.
    pub fn runtime_resource_arg(&self, param_index: u32, element: u32) -> Result<RuntimeResource> {
        self.resolved_instance(param_index, element)?
            .runtime_resource
            .ok_or(GraphError::KeyNotFound)
    }

    /// The reconciled descriptor of a parameter element's resource.
    pub fn resource_desc_arg(&self, param_index: u32, element: u32) -> Result<&ResourceDesc> {
        Ok(&self.resolved_instance(param_index, element)?.desc)
    }

    /// The image views of an argument; `type-mismatch` for other kinds.
    pub fn image_view_arg(&self, param_index: u32) -> Result<&[crate::graph::view::ImageView]> {
        self.args
            .get(param_index as usize)
            .and_then(NodeArg::as_image_views)
            .ok_or(GraphError::TypeMismatch)
    }

    /// The buffer views of an argument; `type-mismatch` for other kinds.
    pub fn buffer_view_arg(&self, param_index: u32) -> Result<&[crate::graph::view::BufferView]> {
        self.args
            .get(param_index as usize)
            .and_then(NodeArg::as_buffer_views)
            .ok_or(GraphError::TypeMismatch)
    }

    /// Whether this is the primary context of the record call (as opposed to
    /// a clone for secondary recording).
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Reports an error from inside a callback.
    ///
    /// Only the primary context accepts errors, and only the first one;
    /// reporting on a clone or reporting twice is `invalid-operation`.
    pub fn report_error(&self, error: GraphError) -> Result<()> {
        if !self.is_primary {
            return Err(GraphError::InvalidOperation);
        }
        if self.error_is_set() {
            return Err(GraphError::InvalidOperation);
        }
        self.error.set(Some(error));
        Ok(())
    }

    /// Clones the context for multithreaded secondary recording into a
    /// different command buffer. The clone is not primary: it cannot report
    /// errors through the shared slot.
    #[must_use]
    pub fn clone_for_command_buffer(&self, command_buffer: CommandBuffer) -> CmdCallbackContext<'a> {
        CmdCallbackContext {
            command_buffer,
            user_context: self.user_context,
            user_tag: self.user_tag,
            args: self.args,
            cmd_id: self.cmd_id,
            record_flags: self.record_flags,
            node_decl: self.node_decl,
            cmd_info: self.cmd_info,
            cmd_accesses: self.cmd_accesses,
            resource_instances: self.resource_instances,
            is_primary: false,
            error: Cell::new(None),
        }
    }

    fn take_error(&self) -> Option<GraphError> {
        self.error.take()
    }

    fn error_is_set(&self) -> bool {
        let current = self.error.take();
        let set = current.is_some();
        self.error.set(current);
        set
    }
}

/// Replays `[cmd_begin, cmd_begin + num_cmds)` of the compiled stream.
pub(crate) fn record_command_range(
    state: &GraphState,
    cmds: &[Cmd],
    node_decls: &[NodeDecl],
    backend: &dyn RuntimeBackend,
    info: &RecordCommandsInfo,
) -> Result<()> {
    let end = info
        .cmd_begin
        .checked_add(info.num_cmds)
        .ok_or(GraphError::IntegerOverflow)?;
    if end as usize > state.runtime_cmds.len() {
        return Err(GraphError::IndexOutOfBounds {
            context: "runtime-cmd range",
            index: end as usize,
        });
    }

    let markers = info.flags.contains(RecordFlags::ENABLE_DEBUG_MARKERS);
    let mut first_error: Option<GraphError> = None;

    for index in info.cmd_begin..end {
        let runtime_cmd = &state.runtime_cmds[index];

        if runtime_cmd.is_sentinel() {
            continue;
        }

        if let Some(transition_id) = runtime_cmd.transition_id() {
            let transition = &state.transitions[transition_id];
            let instance = &state.resource_instances[transition.access.resource_id as usize];
            let prev_access = state.previous_access(transition.prev_transition, instance);

            if let Some(resource) = instance.runtime_resource {
                backend.record_transition(
                    info.command_buffer,
                    &TransitionRecord {
                        resource,
                        prev_access,
                        next_access: transition.access.access,
                        range: transition.access.range,
                    },
                );
            }
            continue;
        }

        let Some(node_id) = runtime_cmd.node_id() else {
            continue;
        };

        let cmd = &cmds[node_id as usize];
        let cmd_info = &state.cmd_infos[node_id];
        let node_decl = &node_decls[cmd_info.node_decl_id as usize];

        let context = CmdCallbackContext {
            command_buffer: info.command_buffer,
            user_context: info.user_context,
            user_tag: cmd.user_tag,
            args: &cmd.args,
            cmd_id: node_id,
            record_flags: info.flags,
            node_decl,
            cmd_info,
            cmd_accesses: state.cmd_accesses.get_span(cmd_info.accesses),
            resource_instances: &state.resource_instances,
            is_primary: true,
            error: Cell::new(None),
        };

        if markers {
            backend.record_debug_marker(info.command_buffer, DebugMarkerMode::Begin, &node_decl.name);
        }

        let wrap_render_pass = node_decl.maybe_graphics_node()
            && cmd_info.render_pass_info.is_some()
            && !cmd.callback_flags.contains(CallbackFlags::CUSTOM_RENDER_PASS);

        if wrap_render_pass {
            backend.record_render_pass_begin(&context)?;
        }

        if first_error.is_none() {
            if let Some(callback) = &cmd.callback {
                callback(&context);
                if let Some(error) = context.take_error() {
                    log::warn!(
                        "node '{}' (cmd {node_id}) reported error: {error}",
                        node_decl.name
                    );
                    first_error = Some(error);
                }
            }
        }

        if wrap_render_pass {
            backend.record_render_pass_end(&context)?;
        }

        if markers {
            backend.record_debug_marker(info.command_buffer, DebugMarkerMode::End, "");
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
