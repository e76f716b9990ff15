//! Render Graph
//!
//! [`RenderGraph`] owns everything with a lifetime longer than one frame:
//! the signature, registered node declarations, cached resource instances,
//! engine heaps and the backend. Each frame:
//!
//! 1. [`update`](RenderGraph::update) rebuilds the declaration set through
//!    the build callback, then drives the compilation phases and backend
//!    materialization. A failed update poisons the graph until the next
//!    successful one.
//! 2. [`batch_layout`](RenderGraph::batch_layout) tells the application how
//!    to submit: batches per queue with fence signal / wait pairs.
//! 3. [`record_commands`](RenderGraph::record_commands) replays stream
//!    slices into backend command buffers — concurrently for disjoint
//!    slices.
//!
//! There is no process-wide state apart from the opt-in, set-once debug
//! print sink ([`set_debug_print_sink`]).

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::errors::{GraphError, Result};
use crate::graph::access::AccessAttr;
use crate::graph::builder::GraphBuilder;
use crate::graph::compile::{
    CommandBatch, CompileContext, GraphState, RenderGraphPhase, ResourceAliasingInfo,
    RuntimeCmdInfo, TransitionInfo,
};
use crate::graph::compile::aliasing::MemoryAliasingPhase;
use crate::graph::compile::lifetime::LifetimeAnalysisPhase;
use crate::graph::compile::preprocess::PreProcessPhase;
use crate::graph::compile::schedule::SchedulePhase;
use crate::graph::node::{CmdAccessInfo, CmdInfo, NodeId};
use crate::graph::resource::{
    AllocRequirement, HeapPlacement, ResourceDesc, ResourceId, ResourceInstance, SubresourceRange,
};
use crate::graph::signature::{GraphSignature, NodeDecl};
use crate::runtime::backend::{
    CreateResourceArgs, HeapInfo, MemoryTypeInfo, QueueFlags, RuntimeBackend, RuntimeHeap,
    RuntimeResource,
};
use crate::runtime::record::{RecordCommandsInfo, record_command_range};
use crate::utils::Span;

use bitflags::bitflags;

bitflags! {
    /// Bitflags for render graph behavior.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct RenderGraphFlags: u32 {
        /// Skip per-subresource lifetime analysis. Forced off when memory
        /// aliasing is enabled, which depends on lifetimes.
        const NO_LIFETIME_ANALYSIS = 1 << 0;
        /// Give every resource a dedicated placement instead of aliasing
        /// lifetime-disjoint transients.
        const NO_GPU_MEMORY_ALIASING = 1 << 1;
    }
}

/// Queue configuration for scheduling.
#[derive(Clone, Debug)]
pub struct ScheduleInfo {
    /// Capabilities of each device queue, by queue index.
    pub queue_flags: SmallVec<[QueueFlags; 4]>,
}

impl Default for ScheduleInfo {
    fn default() -> Self {
        Self::with_queues(&[QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::COPY])
    }
}

impl ScheduleInfo {
    /// Creates a schedule over the given queue capability table.
    #[must_use]
    pub fn with_queues(queues: &[QueueFlags]) -> Self {
        Self {
            queue_flags: SmallVec::from_slice(queues),
        }
    }
}

/// Parameters for creating a render graph.
#[derive(Default)]
pub struct RenderGraphCreateInfo {
    /// Graph-level parameter schema.
    pub signature: GraphSignature,
    /// Queue configuration.
    pub schedule: ScheduleInfo,
    /// Memory type buckets for heap creation.
    pub memory_types: Vec<MemoryTypeInfo>,
    /// Behavior flags.
    pub flags: RenderGraphFlags,
    /// Cap on a single heap's size; placements past it fail with
    /// out-of-memory.
    pub max_heap_size: Option<u64>,
}

/// Per-frame update parameters.
#[derive(Clone, Copy, Debug)]
pub struct UpdateInfo<'a> {
    /// Monotonic frame index.
    pub frame_index: u64,
    /// Latest frame known complete on the GPU; `u64::MAX` when none is.
    /// Must satisfy `gpu_completed_frame_index + 1 <= frame_index`.
    pub gpu_completed_frame_index: u64,
    /// Backend handles for external resource parameters, one slice per
    /// external resource slot (covering temporal layers where applicable).
    pub arg_resources: &'a [&'a [RuntimeResource]],
    /// Rebuild the diagnostic snapshot as part of this update.
    pub refresh_diagnostics: bool,
}

impl Default for UpdateInfo<'_> {
    fn default() -> Self {
        Self {
            frame_index: 0,
            gpu_completed_frame_index: u64::MAX,
            arg_resources: &[],
            refresh_diagnostics: false,
        }
    }
}

/// The batch layout query result: how the application should submit the
/// compiled stream.
#[derive(Clone, Copy, Debug)]
pub struct BatchLayout<'a> {
    /// Per-queue batches in submission order.
    pub batches: &'a [CommandBatch],
    /// Number of fences signaled across the layout.
    pub num_fence_signals: u32,
    /// Flat array of signal indices batches wait on; each batch's
    /// `(wait_fences_begin, num_wait_fences)` indexes into it.
    pub wait_fence_indices: &'a [u32],
}

// ─── Diagnostics ──────────────────────────────────────────────────────────────

/// Per-resource diagnostic record.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceDiagnosticInfo {
    /// Resource name.
    pub name: String,
    /// Slice index within the temporal parent, or `u32::MAX`.
    pub temporal_child_index: u32,
    /// Lifetime owned by the application.
    pub is_external: bool,
    /// Reconciled descriptor.
    pub desc: ResourceDesc,
    /// Union of all observed accesses.
    pub all_accesses: AccessAttr,
    /// First access of the last compiled frame.
    pub initial_access: AccessAttr,
    /// Lifetime interval in runtime-cmd index space.
    pub lifetime_begin: u32,
    /// End of the lifetime interval.
    pub lifetime_end: u32,
    /// Memory requirements.
    pub alloc_requirement: AllocRequirement,
    /// Heap placement.
    pub placement: HeapPlacement,
    /// Backend handle.
    pub runtime_resource: Option<RuntimeResource>,
}

/// Transition details of a cmd diagnostic record.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionDiagnostic {
    /// Access before the transition.
    pub prev_access: AccessAttr,
    /// Access after the transition.
    pub next_access: AccessAttr,
    /// Transitioned range.
    pub range: SubresourceRange,
    /// Transitioned resource.
    pub resource_id: ResourceId,
}

/// Per-runtime-cmd diagnostic record.
#[derive(Clone, Debug, PartialEq)]
pub struct CmdDiagnosticInfo {
    /// Stream position.
    pub cmd_index: u32,
    /// Entry is a transition.
    pub is_transition: bool,
    /// Transition details, for real (non-sentinel) transitions.
    pub transition: Option<TransitionDiagnostic>,
}

/// Per-heap diagnostic record.
#[derive(Clone, Debug, PartialEq)]
pub struct HeapDiagnosticInfo {
    /// Total heap size.
    pub size: u64,
    /// Bytes occupied after the last compile.
    pub used_size: u64,
    /// High-water mark.
    pub max_used_size: u64,
    /// Placement alignment.
    pub alignment: u32,
    /// Memory type bucket.
    pub memory_type: u32,
    /// Backend handle.
    pub runtime_heap: Option<RuntimeHeap>,
}

/// Snapshot of the graph's compiled state for tooling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderGraphDiagnosticInfo {
    /// One record per resource instance.
    pub resources: Vec<ResourceDiagnosticInfo>,
    /// One record per runtime-cmd.
    pub cmds: Vec<CmdDiagnosticInfo>,
    /// One record per engine heap.
    pub heaps: Vec<HeapDiagnosticInfo>,
}

// ─── Debug print sink ─────────────────────────────────────────────────────────

/// Sink receiving engine debug prints.
pub type DebugPrintSink = Box<dyn Fn(&str) + Send + Sync>;

static DEBUG_PRINT_SINK: RwLock<Option<DebugPrintSink>> = RwLock::new(None);

/// Installs the global debug print sink. Set-once: returns `false` without
/// replacing an already-installed sink.
pub fn set_debug_print_sink(sink: DebugPrintSink) -> bool {
    let mut slot = DEBUG_PRINT_SINK.write();
    if slot.is_some() {
        return false;
    }
    *slot = Some(sink);
    true
}

pub(crate) fn debug_print(message: &str) {
    if let Some(sink) = DEBUG_PRINT_SINK.read().as_ref() {
        sink(message);
    } else {
        log::debug!("{message}");
    }
}

// ─── RenderGraph ──────────────────────────────────────────────────────────────

/// A render graph instance: declarations in, compiled schedule out.
pub struct RenderGraph {
    signature: GraphSignature,
    schedule: ScheduleInfo,
    memory_types: Vec<MemoryTypeInfo>,
    flags: RenderGraphFlags,
    max_heap_size: Option<u64>,

    node_decls: Vec<NodeDecl>,
    builder: GraphBuilder,
    state: GraphState,
    backend: Box<dyn RuntimeBackend>,

    status: Option<GraphError>,
    diag_cache: Option<RenderGraphDiagnosticInfo>,
}

impl RenderGraph {
    /// Creates a render graph over the given backend.
    #[must_use]
    pub fn new(create_info: RenderGraphCreateInfo, backend: Box<dyn RuntimeBackend>) -> Self {
        let mut flags = create_info.flags;
        // Memory aliasing requires lifetime analysis.
        if !flags.contains(RenderGraphFlags::NO_GPU_MEMORY_ALIASING) {
            flags.remove(RenderGraphFlags::NO_LIFETIME_ANALYSIS);
        }

        let memory_types = if create_info.memory_types.is_empty() {
            vec![MemoryTypeInfo::default()]
        } else {
            create_info.memory_types
        };

        Self {
            signature: create_info.signature,
            schedule: create_info.schedule,
            memory_types,
            flags,
            max_heap_size: create_info.max_heap_size,
            node_decls: Vec::new(),
            builder: GraphBuilder::new(),
            state: GraphState::default(),
            backend,
            status: None,
            diag_cache: None,
        }
    }

    /// Creates a render graph over the built-in null backend.
    #[must_use]
    pub fn with_null_backend(create_info: RenderGraphCreateInfo) -> Self {
        Self::new(create_info, Box::new(crate::runtime::NullBackend::new()))
    }

    /// Registers a node declaration, returning its id for `add_node`.
    pub fn register_node_decl(&mut self, mut decl: NodeDecl) -> u32 {
        decl.finalize();
        let id = self.node_decls.len() as u32;
        self.node_decls.push(decl);
        id
    }

    /// The registered node declarations.
    #[must_use]
    pub fn node_decls(&self) -> &[NodeDecl] {
        &self.node_decls
    }

    /// The graph's parameter schema.
    #[must_use]
    pub fn signature(&self) -> &GraphSignature {
        &self.signature
    }

    // ── Update ─────────────────────────────────────────────────────────────

    /// Compiles one frame.
    ///
    /// `build` re-declares the frame through the builder; the phases then
    /// produce the runtime-cmd stream, transitions, batches and heap
    /// placements, and the backend materializes heaps and resources.
    ///
    /// A failed update caches its error: subsequent [`record_commands`]
    /// calls fail with `invalid-operation` until an update succeeds.
    ///
    /// [`record_commands`]: Self::record_commands
    pub fn update<F>(&mut self, info: &UpdateInfo<'_>, build: F) -> Result<()>
    where
        F: FnOnce(&mut GraphBuilder) -> Result<()>,
    {
        let result = self.update_impl(info, build);
        self.status = result.as_ref().err().cloned();
        self.diag_cache = None;
        match &result {
            Ok(()) if info.refresh_diagnostics => {
                self.diag_cache = Some(self.gather_diagnostic_info());
            }
            Err(error) => {
                debug_print(&format!(
                    "render graph update failed at frame {}: {error}",
                    info.frame_index
                ));
            }
            Ok(()) => {}
        }
        result
    }

    fn update_impl<F>(&mut self, info: &UpdateInfo<'_>, build: F) -> Result<()>
    where
        F: FnOnce(&mut GraphBuilder) -> Result<()>,
    {
        if info.gpu_completed_frame_index != u64::MAX
            && info.gpu_completed_frame_index.saturating_add(1) > info.frame_index
        {
            return Err(GraphError::InvalidArguments(
                "gpu_completed_frame_index + 1 must not exceed frame_index",
            ));
        }

        self.state.reset_frame();

        self.builder.begin(&self.signature);
        if let Err(error) = build(&mut self.builder) {
            self.builder.set_build_error(error);
        }
        self.builder.end()?;

        // Backend-injected phases run between lifetime analysis and
        // aliasing.
        let mut injected = self.backend.build_phases();

        {
            let mut ctx = CompileContext {
                frame_index: info.frame_index,
                gpu_completed_frame_index: info.gpu_completed_frame_index,
                arg_resources: info.arg_resources,
                signature: &self.signature,
                node_decls: &self.node_decls,
                builder: &self.builder,
                queue_flags: &self.schedule.queue_flags,
                memory_types: &self.memory_types,
                flags: self.flags,
                max_heap_size: self.max_heap_size,
                state: &mut self.state,
                backend: &mut *self.backend,
            };

            run_phase(&mut PreProcessPhase, &mut ctx)?;
            run_phase(&mut SchedulePhase, &mut ctx)?;
            run_phase(&mut LifetimeAnalysisPhase, &mut ctx)?;
            for phase in &mut injected {
                run_phase(phase.as_mut(), &mut ctx)?;
            }
            run_phase(&mut MemoryAliasingPhase, &mut ctx)?;
        }

        self.materialize(info)?;

        Ok(())
    }

    /// Backend materialization: heaps, pending resources, node resources,
    /// final-access carry-over for the next frame.
    fn materialize(&mut self, info: &UpdateInfo<'_>) -> Result<()> {
        self.backend
            .update_frame(info.frame_index, info.gpu_completed_frame_index)?;

        for heap in &mut self.state.heaps {
            if heap.runtime_heap.is_none() && heap.size > 0 {
                let name = format!("graph-heap-{}", heap.index);
                heap.runtime_heap = Some(self.backend.create_heap(heap, &name)?);
            }
        }

        for index in 0..self.state.resource_instances.len() {
            let instance = &self.state.resource_instances[index];
            if !instance.is_active()
                || !instance.is_pending_create
                || !instance.is_accessed
                || instance.is_external
                || instance.is_temporal_parent()
            {
                continue;
            }

            let decl_id = instance.resource_decl_id as usize;
            let name = self
                .builder
                .resource_decls()
                .get(decl_id)
                .map_or("", |decl| decl.name.as_str())
                .to_owned();

            let heap_placement = if instance.alloc_placement.is_placed() {
                let heap = &self.state.heaps[instance.alloc_placement.heap_id as usize];
                let runtime_heap = heap.runtime_heap.ok_or(GraphError::InternalError)?;
                Some((runtime_heap, instance.alloc_placement.offset))
            } else {
                None
            };

            let clear_value = instance
                .clear_value_id
                .and_then(|slot| self.state.clear_values.get(slot));

            let args = CreateResourceArgs {
                resource_id: instance.resource_decl_id,
                desc: &instance.desc,
                clear_value,
                alloc_requirement: instance.alloc_requirement,
                heap_placement,
                all_accesses: instance.all_accesses,
                initial_access: instance.initial_access,
                mutable_format: instance.is_mutable_format,
                buffer_formatted_read: instance.buffer_formatted_read,
                buffer_formatted_write: instance.buffer_formatted_write,
                name: &name,
            };

            let handle = self.backend.create_resource(&args)?;
            self.backend.set_debug_name(handle, &name);

            let instance = &mut self.state.resource_instances[index];
            instance.runtime_resource = Some(handle);
            instance.finalize_runtime_resource_creation(None);
        }

        self.backend.create_node_resources()?;

        // Propagate this frame's initial access as the next frame's carried
        // final access; aliased slots forget theirs unless the backend can
        // transition from an undefined state.
        if !self.state.runtime_cmds.is_empty() {
            let last = (self.state.runtime_cmds.len() - 1) as u32;
            let last_cmd = &self.state.runtime_cmds[last];
            if !(last_cmd.is_transition
                && last_cmd.cmd_id == crate::graph::compile::CMD_ID_POSTAMBLE)
            {
                return Err(GraphError::InvalidOperation);
            }

            let reset_aliased = self
                .backend
                .should_reset_aliased_resources_prev_final_access();

            for instance in &mut self.state.resource_instances {
                debug_assert!(!(instance.is_aliased && instance.is_persistent()));

                let created = instance.runtime_resource.is_some() && !instance.is_pending_create;
                if !instance.is_external && created && instance.is_accessed {
                    instance.prev_final_access = if reset_aliased && instance.is_aliased {
                        AccessAttr::UNKNOWN
                    } else {
                        instance.initial_access
                    };
                }
            }
        }

        Ok(())
    }

    // ── Recording ──────────────────────────────────────────────────────────

    /// Replays a slice of the compiled stream into a backend command buffer.
    ///
    /// Fails with `invalid-operation` while the last update's error is
    /// cached. Disjoint slices may be recorded concurrently from multiple
    /// threads, each into its own command buffer.
    pub fn record_commands(&self, info: &RecordCommandsInfo) -> Result<()> {
        if self.status.is_some() {
            return Err(GraphError::InvalidOperation);
        }

        record_command_range(
            &self.state,
            self.builder.cmds(),
            &self.node_decls,
            &*self.backend,
            info,
        )
    }

    // ── Compiled-state queries ─────────────────────────────────────────────

    /// The batch layout of the last compiled frame.
    #[must_use]
    pub fn batch_layout(&self) -> BatchLayout<'_> {
        let batches = self.state.cmd_batches.as_slice();
        let num_fence_signals = batches
            .iter()
            .filter(|batch| batch.signal_fence_index != CommandBatch::NO_SIGNAL)
            .count() as u32;
        BatchLayout {
            batches,
            num_fence_signals,
            wait_fence_indices: self.state.batch_wait_fence_ids.as_slice(),
        }
    }

    /// The compiled runtime-cmd stream.
    #[must_use]
    pub fn runtime_cmds(&self) -> &[RuntimeCmdInfo] {
        self.state.runtime_cmds.as_slice()
    }

    /// The synthesized transitions (entry 0 is the reserved null entry).
    #[must_use]
    pub fn transitions(&self) -> &[TransitionInfo] {
        self.state.transitions.as_slice()
    }

    /// The cached resource instances.
    #[must_use]
    pub fn resource_instances(&self) -> &[ResourceInstance] {
        &self.state.resource_instances
    }

    /// One resource instance.
    #[must_use]
    pub fn resource_instance(&self, id: ResourceId) -> Option<&ResourceInstance> {
        self.state.resource_instances.get(id as usize)
    }

    /// The flattened access records of one node.
    #[must_use]
    pub fn cmd_accesses(&self, node: NodeId) -> &[CmdAccessInfo] {
        let span = self.state.cmd_infos[node].accesses;
        self.state.cmd_accesses.get_span(span)
    }

    /// The compiled per-command records.
    #[must_use]
    pub fn cmd_infos(&self) -> &[CmdInfo] {
        self.state.cmd_infos.as_slice()
    }

    /// The engine heaps.
    #[must_use]
    pub fn heaps(&self) -> &[HeapInfo] {
        &self.state.heaps
    }

    /// Aliasing records attached to one runtime-cmd.
    #[must_use]
    pub fn aliasing_infos(&self, runtime_cmd_index: u32) -> &[ResourceAliasingInfo] {
        let span: Span = self.state.runtime_cmds[runtime_cmd_index].aliasing_infos;
        self.state.aliasing_infos.get_span(span)
    }

    /// The previous access of a transition.
    #[must_use]
    pub fn transition_previous_access(&self, transition_id: u32) -> AccessAttr {
        let transition = &self.state.transitions[transition_id];
        let instance = &self.state.resource_instances[transition.access.resource_id as usize];
        self.state
            .previous_access(transition.prev_transition, instance)
    }

    // ── Diagnostics ────────────────────────────────────────────────────────

    /// Builds (or returns the cached) diagnostic snapshot of the compiled
    /// state.
    pub fn diagnostic_info(&mut self, use_cached: bool) -> &RenderGraphDiagnosticInfo {
        if !use_cached || self.diag_cache.is_none() {
            self.diag_cache = Some(self.gather_diagnostic_info());
        }
        self.diag_cache.as_ref().expect("just populated")
    }

    fn gather_diagnostic_info(&self) -> RenderGraphDiagnosticInfo {
        let resources = self
            .state
            .resource_instances
            .iter()
            .enumerate()
            .map(|(index, instance)| {
                let temporal_child_index = if instance.is_temporal_slice {
                    let parent = &self.state.resource_instances
                        [instance.resource_decl_id as usize];
                    parent
                        .temporal_layer_offset
                        .map_or(u32::MAX, |offset| index as u32 - offset)
                } else {
                    u32::MAX
                };

                ResourceDiagnosticInfo {
                    name: self
                        .builder
                        .resource_decls()
                        .get(instance.resource_decl_id as usize)
                        .map_or_else(String::new, |decl| decl.name.clone()),
                    temporal_child_index,
                    is_external: instance.is_external,
                    desc: instance.desc,
                    all_accesses: instance.all_accesses,
                    initial_access: instance.initial_access,
                    lifetime_begin: instance.lifetime_begin,
                    lifetime_end: instance.lifetime_end,
                    alloc_requirement: instance.alloc_requirement,
                    placement: instance.alloc_placement,
                    runtime_resource: instance.runtime_resource,
                }
            })
            .collect();

        let cmds = self
            .state
            .runtime_cmds
            .iter()
            .enumerate()
            .map(|(index, runtime_cmd)| CmdDiagnosticInfo {
                cmd_index: index as u32,
                is_transition: runtime_cmd.is_transition,
                transition: runtime_cmd.transition_id().and_then(|id| {
                    if id == crate::graph::compile::INVALID_TRANSITION {
                        return None;
                    }
                    let transition = &self.state.transitions[id];
                    Some(TransitionDiagnostic {
                        prev_access: self.transition_previous_access(id),
                        next_access: transition.access.access,
                        range: transition.access.range,
                        resource_id: transition.access.resource_id,
                    })
                }),
            })
            .collect();

        let heaps = self
            .state
            .heaps
            .iter()
            .map(|heap| HeapDiagnosticInfo {
                size: heap.size,
                used_size: heap.used_size,
                max_used_size: heap.max_used_size,
                alignment: heap.alignment,
                memory_type: heap.memory_type,
                runtime_heap: heap.runtime_heap,
            })
            .collect();

        RenderGraphDiagnosticInfo {
            resources,
            cmds,
            heaps,
        }
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.backend.destroy_node_resources();

        // Hand every live backend object back before the heaps go away.
        let mut by_type: Vec<(crate::graph::resource::ResourceType, RuntimeResource)> = Vec::new();
        for instance in &mut self.state.resource_instances {
            if let Some(handle) = instance.runtime_resource.take() {
                if !instance.is_external {
                    by_type.push((instance.desc.ty, handle));
                }
            }
        }
        for (ty, handle) in by_type {
            self.backend.destroy_resources(ty, &[handle]);
        }

        self.backend.destroy_heaps(&mut self.state.heaps);
    }
}

fn run_phase(phase: &mut dyn RenderGraphPhase, ctx: &mut CompileContext<'_>) -> Result<()> {
    log::debug!("running phase '{}'", phase.name());
    phase.run(ctx)
}
