//! Compilation Pipeline
//!
//! `update` runs a fixed sequence of phases over the frame's declarations:
//!
//! 1. [`PreProcessPhase`] — reconcile cached resource instances with the
//!    current declarations and flatten per-node accesses.
//! 2. [`SchedulePhase`] — order nodes, synthesize transitions, emit the
//!    runtime-cmd stream and partition it into per-queue batches.
//! 3. [`LifetimeAnalysisPhase`] — per-subresource activity scans over the
//!    compiled stream; promotes discard hints.
//! 4. Backend-injected phases, if any.
//! 5. [`MemoryAliasingPhase`] — heap placement with lifetime aliasing.
//!
//! Phases communicate exclusively through [`GraphState`]: the arena-backed
//! vectors holding the compiled frame.
//!
//! [`PreProcessPhase`]: preprocess::PreProcessPhase
//! [`SchedulePhase`]: schedule::SchedulePhase
//! [`LifetimeAnalysisPhase`]: lifetime::LifetimeAnalysisPhase
//! [`MemoryAliasingPhase`]: aliasing::MemoryAliasingPhase

pub mod aliasing;
pub mod lifetime;
pub mod preprocess;
pub mod schedule;

use crate::errors::Result;
use crate::graph::builder::GraphBuilder;
use crate::graph::node::{CmdAccessInfo, CmdInfo, NodeId};
use crate::graph::resource::{FinalAccessInfo, ResourceId, ResourceInstance, SubresourceRange};
use crate::graph::signature::{GraphSignature, NodeDecl};
use crate::runtime::backend::{HeapInfo, RuntimeBackend, RuntimeResource};
use crate::utils::{ArenaVec, FreeListPool, Span};

/// Sentinel command id marking the start of the runtime-cmd stream.
pub const CMD_ID_PREAMBLE: u32 = 0x7FFF_FFFE;
/// Sentinel command id marking the end of the runtime-cmd stream.
pub const CMD_ID_POSTAMBLE: u32 = 0x7FFF_FFFF;

/// Index of the reserved null transition. A `prev_transition` equal to this
/// means the previous access is the instance's `prev_final_access`.
pub const INVALID_TRANSITION: u32 = 0;

/// One entry of the compiled runtime-cmd stream: either a node reference, a
/// transition reference, or a sentinel.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeCmdInfo {
    /// Node id, transition id or sentinel, depending on `is_transition`.
    pub cmd_id: u32,
    /// Entry references a transition (or sentinel) instead of a node.
    pub is_transition: bool,
    /// Aliasing records attached to this stream position.
    pub aliasing_infos: Span,
}

impl RuntimeCmdInfo {
    /// Creates a node entry.
    #[must_use]
    pub const fn node(cmd_id: NodeId) -> Self {
        Self {
            cmd_id,
            is_transition: false,
            aliasing_infos: Span::EMPTY,
        }
    }

    /// Creates a transition entry.
    #[must_use]
    pub const fn transition(transition_id: u32) -> Self {
        Self {
            cmd_id: transition_id,
            is_transition: true,
            aliasing_infos: Span::EMPTY,
        }
    }

    /// The transition id, if the entry is a real transition.
    #[must_use]
    pub fn transition_id(&self) -> Option<u32> {
        (self.is_transition && self.cmd_id < CMD_ID_PREAMBLE).then_some(self.cmd_id)
    }

    /// The node id, if the entry is a node.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        (!self.is_transition).then_some(self.cmd_id)
    }

    /// Returns `true` for the preamble / postamble sentinels.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.is_transition && self.cmd_id >= CMD_ID_PREAMBLE
    }
}

/// A transition synthesized between two accesses of one subresource range.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionInfo {
    /// The new access, including the transitioned range and resource.
    pub access: CmdAccessInfo,
    /// The node whose execution requires the transition.
    pub node_id: NodeId,
    /// Index of the previous transition on the same subresource range, or
    /// [`INVALID_TRANSITION`].
    pub prev_transition: u32,
}

/// A contiguous slice of the runtime-cmd stream submitted to one queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandBatch {
    /// Queue the batch executes on.
    pub queue_index: u32,
    /// First runtime-cmd of the batch.
    pub cmd_begin: u32,
    /// Number of runtime-cmds in the batch.
    pub num_cmds: u32,
    /// Offset of the batch's waits within the wait-fence index array.
    pub wait_fences_begin: u32,
    /// Number of fences the batch waits on.
    pub num_wait_fences: u32,
    /// Fence this batch signals, or `u32::MAX` if none.
    pub signal_fence_index: u32,
}

impl CommandBatch {
    /// Value of `signal_fence_index` for batches that signal no fence.
    pub const NO_SIGNAL: u32 = u32::MAX;
}

/// Aliasing relationship attached to a runtime-cmd.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceAliasingInfo {
    /// Resource whose memory is being handed over.
    pub src_resource_id: ResourceId,
    /// Resource taking over the memory.
    pub dst_resource_id: ResourceId,
    /// The source is past its last use; its contents become undefined.
    pub src_deactivating: bool,
    /// The destination is about to be first-used; the backend must
    /// discard / initialize it.
    pub dst_activating: bool,
}

/// The compiled frame: every vector the phases fill in, reset (capacity
/// preserved) at the start of each `update`.
#[derive(Default)]
pub struct GraphState {
    /// Cached per-resource state; survives across frames.
    pub resource_instances: Vec<ResourceInstance>,
    /// Per-command compiled records.
    pub cmd_infos: ArenaVec<CmdInfo>,
    /// Flattened access records.
    pub cmd_accesses: ArenaVec<CmdAccessInfo>,
    /// Synthesized transitions; entry 0 is the reserved null transition.
    pub transitions: ArenaVec<TransitionInfo>,
    /// The compiled runtime-cmd stream.
    pub runtime_cmds: ArenaVec<RuntimeCmdInfo>,
    /// Per-queue batches.
    pub cmd_batches: ArenaVec<CommandBatch>,
    /// Flat wait-fence index array referenced by batches.
    pub batch_wait_fence_ids: ArenaVec<u32>,
    /// Aliasing records referenced by runtime-cmds.
    pub aliasing_infos: ArenaVec<ResourceAliasingInfo>,
    /// Per-subresource final accesses referenced by instances.
    pub final_accesses: ArenaVec<FinalAccessInfo>,
    /// Engine-managed heaps; survive across frames.
    pub heaps: Vec<HeapInfo>,
    /// Clear-value slots referenced by instances; survive across frames.
    pub clear_values: FreeListPool<crate::graph::resource::ClearInfo>,
}

impl GraphState {
    /// Resets the per-frame vectors, keeping capacity. Cached cross-frame
    /// state (instances, heaps, clear values) is left alone.
    pub fn reset_frame(&mut self) {
        self.cmd_infos.reset();
        self.cmd_accesses.reset();
        self.transitions.reset();
        self.runtime_cmds.reset();
        self.cmd_batches.reset();
        self.batch_wait_fence_ids.reset();
        self.aliasing_infos.reset();
        self.final_accesses.reset();
    }

    /// The access preceding a transition: the linked previous transition's
    /// access, or the instance's carried-over final access.
    #[must_use]
    pub fn previous_access(&self, prev_transition: u32, instance: &ResourceInstance) -> crate::graph::access::AccessAttr {
        if prev_transition == INVALID_TRANSITION {
            instance.prev_final_access
        } else {
            self.transitions[prev_transition].access.access
        }
    }

    /// Per-resource offsets into a dense per-subresource table, plus the
    /// table length.
    #[must_use]
    pub fn subresource_offsets(&self) -> (Vec<u32>, u32) {
        let mut offsets = Vec::with_capacity(self.resource_instances.len());
        let mut total = 0u32;
        for instance in &self.resource_instances {
            offsets.push(total);
            total += instance.num_subresources;
        }
        (offsets, total)
    }
}

/// Dense per-subresource index of `(aspect, layer, mip)` within a resource.
///
/// Layout is aspect-major, then layer, then mip — matching the order
/// lifetime analysis and transition synthesis walk subresources in.
#[must_use]
pub fn subresource_index(full_range: &SubresourceRange, aspect_bit: u32, layer: u32, mip: u32) -> u32 {
    let mips = full_range.mip_count;
    let layers = full_range.layer_count;
    // Count aspect bits below this one that the resource actually has.
    let aspect_ordinal = (full_range.aspect_mask & (aspect_bit - 1)).count_ones();
    aspect_ordinal * layers * mips + layer * mips + mip
}

/// Everything a phase sees: the frame's inputs plus the mutable compiled
/// state and the backend.
pub struct CompileContext<'a> {
    /// Monotonic frame index of this update.
    pub frame_index: u64,
    /// Latest frame known to have completed on the GPU (`u64::MAX` = none).
    pub gpu_completed_frame_index: u64,
    /// Backend handles for external resource parameters, one slice per
    /// resource parameter (covering temporal layers where applicable).
    pub arg_resources: &'a [&'a [RuntimeResource]],
    /// The graph's parameter schema.
    pub signature: &'a GraphSignature,
    /// Registered node declarations.
    pub node_decls: &'a [NodeDecl],
    /// The frame's declarations.
    pub builder: &'a GraphBuilder,
    /// Queue capability table.
    pub queue_flags: &'a [crate::runtime::backend::QueueFlags],
    /// Memory type buckets reported by the backend / configuration.
    pub memory_types: &'a [crate::runtime::backend::MemoryTypeInfo],
    /// Graph behavior flags.
    pub flags: crate::graph::graph::RenderGraphFlags,
    /// Cap on a single heap's size; aliasing failures past it report
    /// out-of-memory.
    pub max_heap_size: Option<u64>,
    /// The compiled frame.
    pub state: &'a mut GraphState,
    /// The runtime backend.
    pub backend: &'a mut dyn RuntimeBackend,
}

/// One compilation phase. Backends may inject custom phases through
/// [`RuntimeBackend::build_phases`].
///
/// [`RuntimeBackend::build_phases`]:
///     crate::runtime::RuntimeBackend::build_phases
pub trait RenderGraphPhase: Send {
    /// Phase name for logging.
    fn name(&self) -> &'static str;

    /// Runs the phase over the frame being compiled.
    fn run(&mut self, ctx: &mut CompileContext<'_>) -> Result<()>;
}
