//! Lifetime Analysis Phase
//!
//! Two scans over the compiled runtime-cmd stream annotate resources and
//! accesses with lifetime facts the aliasing phase and backends need:
//!
//! - Every resource's `[lifetime_begin, lifetime_end]` in runtime-cmd index
//!   space (persistent resources span the whole frame).
//! - Discard promotion: an access whose subresource data is dead on the far
//!   side of the scan gains the matching discard decoration. The forward
//!   scan discovers data that was never written (`DISCARD_BEFORE`); the
//!   reverse scan discovers data never read again (`DISCARD_AFTER`).
//!   Stencil aspects are tracked separately through the stencil variants.
//!
//! This is what turns an MSAA color target that only feeds a resolve into a
//! memoryless attachment: both scans find it inactive, the access ends up
//! with both discard bits, and the backend can use don't-care load / store
//! ops while aliasing reuses the memory aggressively.

use crate::errors::Result;
use crate::graph::access::AccessFlags;
use crate::graph::compile::{CompileContext, RenderGraphPhase, subresource_index};
use crate::graph::graph::RenderGraphFlags;
use crate::graph::node::CmdAccessInfo;
use crate::graph::resource::{RESOURCE_ID_INVALID, ResourceInstance};
use crate::runtime::backend::{AspectUsage, RuntimeBackend};

/// Phase 3: per-subresource lifetime and activity scans.
#[derive(Default)]
pub struct LifetimeAnalysisPhase;

/// Per-subresource activity tracking state.
///
/// `curr_cmd` remembers which command last touched the subresource so that
/// multiple accesses within one node combine additively: a subresource only
/// deactivates if every access of the node discards it.
#[derive(Clone, Copy, Default)]
struct SubresState {
    curr_active: bool,
    prev_active: bool,
    curr_cmd: u32,
}

impl SubresState {
    /// Updates the activity state for an access by `cmd_index`; returns
    /// whether the subresource was active before that command.
    fn access(&mut self, active: bool, cmd_index: u32) -> bool {
        if self.curr_cmd != cmd_index {
            self.prev_active = self.curr_active;
            self.curr_active = active;
            self.curr_cmd = cmd_index;
        } else {
            self.curr_active |= active;
        }
        self.prev_active
    }
}

impl RenderGraphPhase for LifetimeAnalysisPhase {
    fn name(&self) -> &'static str {
        "lifetime-analysis"
    }

    fn run(&mut self, ctx: &mut CompileContext<'_>) -> Result<()> {
        if ctx.flags.contains(RenderGraphFlags::NO_LIFETIME_ANALYSIS) {
            return Ok(());
        }

        let state = &mut *ctx.state;
        let (offsets, total_subres) = state.subresource_offsets();

        let cmd_count = state.runtime_cmds.len();
        let last_cmd = cmd_count.saturating_sub(1) as u32;

        for instance in &mut state.resource_instances {
            if !instance.is_active() {
                continue;
            }
            if instance.is_persistent() {
                instance.lifetime_begin = 0;
                instance.lifetime_end = last_cmd;
            } else {
                instance.lifetime_begin = u32::MAX;
                instance.lifetime_end = 0;
            }
        }

        if cmd_count == 0 {
            return Ok(());
        }

        debug_assert!(state.runtime_cmds[0].is_sentinel());
        debug_assert!(state.runtime_cmds[last_cmd].is_sentinel());

        let mut subres_states = vec![SubresState::default(); total_subres as usize];
        mark_persistent_subresources(&state.resource_instances, &offsets, &mut subres_states);

        // Forward scan: lifetimes plus discard-before promotion.
        for cmd_index in 1..last_cmd {
            let runtime_cmd = state.runtime_cmds[cmd_index].clone();

            if let Some(transition_id) = runtime_cmd.transition_id() {
                let resource_id = state.transitions[transition_id].access.resource_id;
                expand_lifetime(&mut state.resource_instances[resource_id as usize], cmd_index);
            } else if let Some(node_id) = runtime_cmd.node_id() {
                let span = state.cmd_infos[node_id].accesses;
                for access_index in span.range() {
                    let resource_id = state.cmd_accesses[access_index as u32].resource_id;
                    if resource_id == RESOURCE_ID_INVALID {
                        continue;
                    }
                    expand_lifetime(
                        &mut state.resource_instances[resource_id as usize],
                        cmd_index,
                    );
                    update_activity(
                        ScanDirection::Forward,
                        cmd_index,
                        &mut state.cmd_accesses[access_index as u32],
                        &state.resource_instances[resource_id as usize],
                        &offsets,
                        &mut subres_states,
                        ctx.backend,
                    );
                }
            }
        }

        // Reverse scan: discard-after promotion.
        subres_states.fill(SubresState::default());
        mark_persistent_subresources(&state.resource_instances, &offsets, &mut subres_states);

        for cmd_index in (1..last_cmd).rev() {
            let runtime_cmd = state.runtime_cmds[cmd_index].clone();
            let Some(node_id) = runtime_cmd.node_id() else {
                continue;
            };
            let span = state.cmd_infos[node_id].accesses;
            for access_index in span.range() {
                let resource_id = state.cmd_accesses[access_index as u32].resource_id;
                if resource_id == RESOURCE_ID_INVALID {
                    continue;
                }
                update_activity(
                    ScanDirection::Reverse,
                    cmd_index,
                    &mut state.cmd_accesses[access_index as u32],
                    &state.resource_instances[resource_id as usize],
                    &offsets,
                    &mut subres_states,
                    ctx.backend,
                );
            }
        }

        Ok(())
    }
}

fn expand_lifetime(instance: &mut ResourceInstance, cmd_index: u32) {
    instance.lifetime_begin = instance.lifetime_begin.min(cmd_index);
    instance.lifetime_end = instance.lifetime_end.max(cmd_index);
}

/// Persistent resources enter each scan fully active: their data is live
/// from previous frames and may never be discarded by default.
fn mark_persistent_subresources(
    instances: &[ResourceInstance],
    offsets: &[u32],
    subres_states: &mut [SubresState],
) {
    for (index, instance) in instances.iter().enumerate() {
        if instance.is_active() && instance.is_persistent() {
            let base = offsets[index] as usize;
            for state in &mut subres_states[base..base + instance.num_subresources as usize] {
                state.access(true, 0);
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanDirection {
    Forward,
    Reverse,
}

/// The per-access activity update.
///
/// `deactivating` is the discard decoration that kills data in scan
/// direction; `to_be_discarded` is the decoration written back when the data
/// turns out dead on the far side of the access.
fn update_activity(
    direction: ScanDirection,
    cmd_index: u32,
    access: &mut CmdAccessInfo,
    instance: &ResourceInstance,
    offsets: &[u32],
    subres_states: &mut [SubresState],
    backend: &dyn RuntimeBackend,
) {
    let (deactivating, to_be_discarded, stencil_deactivating, stencil_to_be_discarded) =
        match direction {
            ScanDirection::Forward => (
                AccessFlags::DISCARD_AFTER,
                AccessFlags::DISCARD_BEFORE,
                AccessFlags::STENCIL_DISCARD_AFTER,
                AccessFlags::STENCIL_DISCARD_BEFORE,
            ),
            ScanDirection::Reverse => (
                AccessFlags::DISCARD_BEFORE,
                AccessFlags::DISCARD_AFTER,
                AccessFlags::STENCIL_DISCARD_BEFORE,
                AccessFlags::STENCIL_DISCARD_AFTER,
            ),
        };

    let base = offsets[access.resource_id as usize];

    if instance.num_subresources == 1 {
        let active_after = !access.access.access.intersects(deactivating);
        let active_before =
            subres_states[base as usize].access(active_after, cmd_index);
        if !active_before {
            access.access.access |= to_be_discarded;
        }
        return;
    }

    debug_assert!(instance.desc.is_image());

    let full_range = instance.full_range;
    let range = access.range;

    let mut non_stencil_present = false;
    let mut non_stencil_inactive = true;

    let mut aspect_bits = full_range.aspect_mask & range.aspect_mask;
    while aspect_bits != 0 {
        let aspect_bit = aspect_bits & aspect_bits.wrapping_neg();
        aspect_bits &= aspect_bits - 1;

        let is_stencil = backend
            .get_image_aspect_usages(aspect_bit)
            .contains(AspectUsage::STENCIL);

        let active_after = !access.access.access.intersects(if is_stencil {
            stencil_deactivating
        } else {
            deactivating
        });

        let mut aspect_inactive = true;
        for layer in range.base_layer..range.layer_end().min(full_range.layer_end()) {
            for mip in range.base_mip..range.mip_end().min(full_range.mip_end()) {
                let index = base + subresource_index(&full_range, aspect_bit, layer, mip);
                let active_before =
                    subres_states[index as usize].access(active_after, cmd_index);
                aspect_inactive &= !active_before;
            }
        }

        if is_stencil {
            if aspect_inactive {
                access.access.access |= stencil_to_be_discarded;
            }
        } else {
            non_stencil_present = true;
            non_stencil_inactive &= aspect_inactive;
        }
    }

    if non_stencil_present && non_stencil_inactive {
        access.access.access |= to_be_discarded;
    }
}
