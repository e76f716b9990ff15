//! Scheduling & Transition Phase
//!
//! Turns the frame's node set into the linear runtime-cmd stream:
//!
//! 1. Pick the execution order: a deterministic topological sort of the
//!    dependency graph (declaration order breaks ties), with atomic
//!    subgraphs kept contiguous.
//! 2. Walk the order synthesizing transitions: a per-subresource table
//!    tracks the last transition; each access is checked against the
//!    previous access on the same range and either re-uses a pending
//!    read-combined transition, or appends a new one immediately before the
//!    node that needs it.
//! 3. Partition the stream into per-queue batches with cross-queue fence
//!    signal / wait pairs.
//!
//! Ordering is fully determined by node insertion order and dependency
//! edges: identical inputs compile to identical streams.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{GraphError, Result};
use crate::graph::access::AccessTransitionInfo;
use crate::graph::compile::{
    CMD_ID_POSTAMBLE, CMD_ID_PREAMBLE, CompileContext, INVALID_TRANSITION, RenderGraphPhase,
    RuntimeCmdInfo, TransitionInfo, CommandBatch,
};
use crate::graph::dag::SubgraphFlags;
use crate::graph::node::{CmdAccessInfo, NodeId};
use crate::graph::resource::{RESOURCE_ID_INVALID, SubresourceRange};
use crate::graph::signature::QueueClass;
use crate::runtime::backend::QueueFlags;

/// Phase 2: node ordering, transition synthesis and batching.
#[derive(Default)]
pub struct SchedulePhase;

impl RenderGraphPhase for SchedulePhase {
    fn name(&self) -> &'static str {
        "schedule"
    }

    fn run(&mut self, ctx: &mut CompileContext<'_>) -> Result<()> {
        let order = compute_order(ctx)?;

        synthesize_transitions(ctx, &order)?;

        build_batches(ctx);

        log::debug!(
            "schedule: {} nodes, {} transitions, {} batches",
            order.len(),
            ctx.state.transitions.len().saturating_sub(1),
            ctx.state.cmd_batches.len()
        );

        Ok(())
    }
}

/// Deterministic execution order: topological sort with declaration-order
/// tie-break, then atomic subgraphs pulled contiguous at their first
/// member's position. An order invalidated by explicit edges is an
/// ill-formed program.
fn compute_order(ctx: &CompileContext<'_>) -> Result<Vec<NodeId>> {
    let dag = ctx.builder.dag();
    let mut order = dag.topological_order()?;

    // Anchor atomic subgraphs at their first member.
    let mut anchors: FxHashMap<u32, NodeId> = FxHashMap::default();
    for node in 0..dag.node_count() as NodeId {
        let info = dag.node(node);
        if info.subgraph_flags.contains(SubgraphFlags::ATOMIC) {
            if let Some(subgraph) = info.subgraph_id {
                anchors.entry(subgraph).or_insert(node);
            }
        }
    }

    if !anchors.is_empty() {
        order.sort_by_key(|&node| {
            let info = dag.node(node);
            let anchor = info
                .subgraph_id
                .filter(|_| info.subgraph_flags.contains(SubgraphFlags::ATOMIC))
                .and_then(|subgraph| anchors.get(&subgraph).copied())
                .unwrap_or(node);
            (anchor, node)
        });

        // Grouping must not contradict explicit dependencies.
        let mut position = vec![0u32; order.len()];
        for (index, &node) in order.iter().enumerate() {
            position[node as usize] = index as u32;
        }
        for node in 0..dag.node_count() as NodeId {
            for &succ in dag.node(node).successors() {
                if position[node as usize] >= position[succ as usize] {
                    return Err(GraphError::InvalidProgram);
                }
            }
        }
    }

    Ok(order)
}

/// A singleton subresource range.
const fn single_subresource(aspect_bit: u32, layer: u32, mip: u32) -> SubresourceRange {
    SubresourceRange {
        aspect_mask: aspect_bit,
        base_mip: mip,
        mip_count: 1,
        base_layer: layer,
        layer_count: 1,
    }
}

fn synthesize_transitions(ctx: &mut CompileContext<'_>, order: &[NodeId]) -> Result<()> {
    let state = &mut *ctx.state;

    // Reserved null entry so that INVALID_TRANSITION == 0 never collides
    // with a real transition.
    debug_assert!(state.transitions.is_empty());
    state.transitions.push(TransitionInfo {
        access: CmdAccessInfo::INVALID,
        node_id: crate::graph::node::NODE_ID_INVALID,
        prev_transition: INVALID_TRANSITION,
    });

    state
        .runtime_cmds
        .push(RuntimeCmdInfo::transition(CMD_ID_PREAMBLE));

    let (subres_offsets, total_subres) = state.subresource_offsets();
    let mut last_transition = vec![INVALID_TRANSITION; total_subres as usize];

    for &node in order {
        let span = state.cmd_infos[node].accesses;

        for access_index in span.range() {
            let access = state.cmd_accesses[access_index as u32];
            if access.resource_id == RESOURCE_ID_INVALID {
                continue;
            }

            let instance = &state.resource_instances[access.resource_id as usize];
            let full_range = instance.full_range;
            let base = subres_offsets[access.resource_id as usize];

            // Collect the distinct previous-transition entries across the
            // range. One shared entry keeps the whole range as one
            // transition; divergent entries split per subresource.
            let mut groups: SmallVec<[(u32, SubresourceRange); 4]> = SmallVec::new();
            let mut shared: Option<u32> = None;
            let mut divergent = false;

            visit_range_subresources(&full_range, &access.range, |index, aspect_bit, layer, mip| {
                let entry = last_transition[(base + index) as usize];
                match shared {
                    None => shared = Some(entry),
                    Some(existing) if existing != entry => divergent = true,
                    _ => {}
                }
                groups.push((entry, single_subresource(aspect_bit, layer, mip)));
            });

            if shared.is_none() {
                continue;
            }

            let ranges: SmallVec<[(u32, SubresourceRange); 4]> = if divergent {
                groups
            } else {
                let mut single = SmallVec::new();
                single.push((shared.unwrap_or(INVALID_TRANSITION), access.range));
                single
            };

            for (entry, range) in ranges {
                let prev_access = state.previous_access(
                    entry,
                    &state.resource_instances[access.resource_id as usize],
                );

                let decision = ctx
                    .backend
                    .calculate_access_transition(&prev_access, &access.access)
                    .unwrap_or_else(|| {
                        AccessTransitionInfo::default_for(&prev_access, &access.access)
                    });

                if decision.transition {
                    let transition_id = state.transitions.push(TransitionInfo {
                        access: CmdAccessInfo { range, ..access },
                        node_id: node,
                        prev_transition: entry,
                    });
                    state
                        .runtime_cmds
                        .push(RuntimeCmdInfo::transition(transition_id));

                    visit_range_subresources(&full_range, &range, |index, _, _, _| {
                        last_transition[(base + index) as usize] = transition_id;
                    });
                } else if decision.merged_access_states && entry != INVALID_TRANSITION {
                    // Fold the read into the pending transition.
                    state.transitions[entry].access.access |= access.access;
                }
            }

            let instance = &mut state.resource_instances[access.resource_id as usize];
            if instance.initial_access.is_unknown() {
                instance.initial_access = access.access;
            }
        }

        state.runtime_cmds.push(RuntimeCmdInfo::node(node));
    }

    state
        .runtime_cmds
        .push(RuntimeCmdInfo::transition(CMD_ID_POSTAMBLE));

    // Record per-subresource final accesses for next-frame seeding.
    for (resource_index, instance) in state.resource_instances.iter_mut().enumerate() {
        if !instance.is_active() || instance.num_subresources == 0 {
            continue;
        }
        let base = subres_offsets[resource_index] as usize;
        let slots = &last_transition[base..base + instance.num_subresources as usize];

        let mut seen: SmallVec<[u32; 8]> = SmallVec::new();
        for &entry in slots {
            if entry != INVALID_TRANSITION && !seen.contains(&entry) {
                seen.push(entry);
            }
        }

        instance.final_accesses = state.final_accesses.extend_with_span(seen.iter().map(|&entry| {
            crate::graph::resource::FinalAccessInfo {
                prev_transition: entry,
                range: state.transitions[entry].access.range,
            }
        }));
    }

    Ok(())
}

/// Visits every subresource of `range` with its dense index and coordinates.
fn visit_range_subresources<F: FnMut(u32, u32, u32, u32)>(
    full_range: &SubresourceRange,
    range: &SubresourceRange,
    mut f: F,
) {
    let mut aspect_bits = full_range.aspect_mask & range.aspect_mask;
    while aspect_bits != 0 {
        let aspect_bit = aspect_bits & aspect_bits.wrapping_neg();
        aspect_bits &= aspect_bits - 1;

        for layer in range.base_layer..range.layer_end().min(full_range.layer_end()) {
            for mip in range.base_mip..range.mip_end().min(full_range.mip_end()) {
                let index = crate::graph::compile::subresource_index(full_range, aspect_bit, layer, mip);
                f(index, aspect_bit, layer, mip);
            }
        }
    }
}

/// Picks the queue for a node class: a dedicated queue of that class when
/// one exists, else the first capable queue, else queue 0.
#[must_use]
pub fn queue_index_for_class(class: QueueClass, queues: &[QueueFlags]) -> u32 {
    let (required, dedicated_excludes) = match class {
        QueueClass::Graphics => (QueueFlags::GRAPHICS, QueueFlags::empty()),
        QueueClass::Compute => (QueueFlags::COMPUTE, QueueFlags::GRAPHICS),
        QueueClass::Copy => (QueueFlags::COPY, QueueFlags::GRAPHICS | QueueFlags::COMPUTE),
    };

    queues
        .iter()
        .position(|q| q.contains(required) && !q.intersects(dedicated_excludes))
        .or_else(|| queues.iter().position(|q| q.contains(required)))
        .unwrap_or(0) as u32
}

fn build_batches(ctx: &mut CompileContext<'_>) {
    let state = &mut *ctx.state;

    let has_nodes = state
        .runtime_cmds
        .iter()
        .any(|cmd| !cmd.is_transition);
    if !has_nodes {
        // Zero nodes: empty batch layout.
        return;
    }

    // Queue of each runtime-cmd: nodes pick by queue class; transitions and
    // the preamble attach to the queue of the next node; the postamble and
    // trailing transitions stay on the last queue.
    let count = state.runtime_cmds.len();
    let mut queues = vec![u32::MAX; count];
    let mut pending: Vec<usize> = Vec::new();

    for index in 0..count {
        let cmd = &state.runtime_cmds[index as u32];
        if let Some(node_id) = cmd.node_id() {
            let decl_id = state.cmd_infos[node_id].node_decl_id;
            let class = ctx.node_decls[decl_id as usize].queue;
            let queue = queue_index_for_class(class, ctx.queue_flags);
            queues[index] = queue;
            for p in pending.drain(..) {
                queues[p] = queue;
            }
        } else {
            pending.push(index);
        }
    }
    let last_queue = queues
        .iter()
        .rev()
        .find(|&&q| q != u32::MAX)
        .copied()
        .unwrap_or(0);
    for p in pending.drain(..) {
        queues[p] = last_queue;
    }

    // Group consecutive same-queue runs into batches, wiring a fence across
    // every queue switch.
    let mut next_signal = 0u32;
    let mut begin = 0usize;
    while begin < count {
        let queue = queues[begin];
        let mut end = begin + 1;
        while end < count && queues[end] == queue {
            end += 1;
        }

        let wait_begin = state.batch_wait_fence_ids.len() as u32;
        let mut num_waits = 0u32;
        if begin != 0 {
            // Wait on the signal of the immediately preceding batch.
            let prev_signal = next_signal;
            state.batch_wait_fence_ids.push(prev_signal);
            num_waits = 1;

            let prev_batch = state.cmd_batches.len() as u32 - 1;
            state.cmd_batches[prev_batch].signal_fence_index = next_signal;
            next_signal += 1;
        }

        state.cmd_batches.push(CommandBatch {
            queue_index: queue,
            cmd_begin: begin as u32,
            num_cmds: (end - begin) as u32,
            wait_fences_begin: wait_begin,
            num_wait_fences: num_waits,
            signal_fence_index: CommandBatch::NO_SIGNAL,
        });

        begin = end;
    }
}
