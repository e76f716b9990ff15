//! Memory Aliasing Phase
//!
//! Assigns heap offsets to every internal resource, letting
//! lifetime-disjoint transients share memory:
//!
//! - One engine heap per memory-type bucket. Persistent resources take
//!   sticky placements at the front of the heap (assigned once, kept across
//!   frames); transients pack the region behind them anew each frame.
//! - Transients are processed in `(lifetime_begin, -lifetime_end)` order
//!   over a free-span list: spans whose previous tenant's lifetime ended
//!   before the new tenant begins are recycled smallest-fit first; when
//!   nothing fits the heap grows.
//! - Every hand-over produces a pair of aliasing records the runtime
//!   replays: `src_deactivating` at the old tenant's last use and
//!   `dst_activating` at the new tenant's first use.
//!
//! A resource whose slot was reused forgets its carried final access
//! (unless the backend keeps it — see
//! [`RuntimeBackend::should_reset_aliased_resources_prev_final_access`]);
//! the next frame's first use then transitions from an undefined state.
//!
//! [`RuntimeBackend::should_reset_aliased_resources_prev_final_access`]:
//!     crate::runtime::RuntimeBackend::should_reset_aliased_resources_prev_final_access

use crate::errors::{GraphError, Result};
use crate::graph::compile::{CompileContext, RenderGraphPhase, ResourceAliasingInfo};
use crate::graph::graph::RenderGraphFlags;
use crate::graph::resource::HeapPlacement;
use crate::runtime::backend::{HeapInfo, MemoryTypeInfo};

/// Phase 4: heap placement with lifetime aliasing.
#[derive(Default)]
pub struct MemoryAliasingPhase;

/// A placement still occupying heap memory.
struct ActivePlacement {
    resource: u32,
    offset: u64,
    size: u64,
    lifetime_end: u32,
}

/// A recycled span of heap memory. `prev_owner` identifies the tenant whose
/// deactivation still needs an aliasing record.
struct FreeSpan {
    offset: u64,
    size: u64,
    prev_owner: Option<(u32, u32)>,
}

/// Per-heap packing state for one frame.
struct HeapRun {
    heap_index: usize,
    free_spans: Vec<FreeSpan>,
    active: Vec<ActivePlacement>,
    watermark: u64,
}

const fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = if alignment == 0 { 1 } else { alignment };
    value.div_ceil(alignment) * alignment
}

const fn memory_type_of(memory_type_mask: u32) -> u32 {
    if memory_type_mask == 0 {
        0
    } else {
        memory_type_mask.trailing_zeros()
    }
}

fn check_heap_limit(end: u64, max_heap_size: Option<u64>) -> Result<()> {
    if let Some(limit) = max_heap_size {
        if end > limit {
            return Err(GraphError::OutOfMemory);
        }
    }
    Ok(())
}

/// Finds the frame's packing run for a memory type, creating the engine heap
/// on first use.
fn heap_run_for(
    runs: &mut Vec<HeapRun>,
    heaps: &mut Vec<HeapInfo>,
    memory_types: &[MemoryTypeInfo],
    memory_type: u32,
) -> usize {
    if let Some(pos) = runs
        .iter()
        .position(|run| heaps[run.heap_index].memory_type == memory_type)
    {
        return pos;
    }

    let heap_index = heaps
        .iter()
        .position(|heap| heap.memory_type == memory_type)
        .unwrap_or_else(|| {
            let info = memory_types
                .get(memory_type as usize)
                .copied()
                .unwrap_or_default();
            heaps.push(HeapInfo {
                memory_type,
                index: heaps.len() as u32,
                size: 0,
                alignment: info.min_alignment,
                used_size: 0,
                max_used_size: 0,
                persistent_size: 0,
                runtime_heap: None,
            });
            heaps.len() - 1
        });

    let watermark = heaps[heap_index].persistent_size;
    runs.push(HeapRun {
        heap_index,
        free_spans: Vec::new(),
        active: Vec::new(),
        watermark,
    });
    runs.len() - 1
}

impl RenderGraphPhase for MemoryAliasingPhase {
    fn name(&self) -> &'static str {
        "memory-aliasing"
    }

    fn run(&mut self, ctx: &mut CompileContext<'_>) -> Result<()> {
        let allow_aliasing = !ctx.flags.contains(RenderGraphFlags::NO_GPU_MEMORY_ALIASING);
        let memory_types = ctx.memory_types;
        let max_heap_size = ctx.max_heap_size;
        let state = &mut *ctx.state;

        let mut runs: Vec<HeapRun> = Vec::new();

        // Sticky placements for persistent internal resources.
        for index in 0..state.resource_instances.len() {
            let instance = &state.resource_instances[index];
            if !instance.is_active()
                || instance.is_external
                || instance.is_temporal_parent()
                || !instance.is_persistent()
                || instance.alloc_requirement.size == 0
                || instance.alloc_placement.is_placed()
            {
                continue;
            }
            let size = instance.alloc_requirement.size;
            let alignment_req = instance.alloc_requirement.alignment;
            let memory_type = memory_type_of(instance.alloc_requirement.memory_type_mask);

            let run_index = heap_run_for(&mut runs, &mut state.heaps, memory_types, memory_type);
            let heap_index = runs[run_index].heap_index;
            let heap = &mut state.heaps[heap_index];

            let alignment = u64::from(alignment_req.max(heap.alignment));
            let offset = align_up(heap.persistent_size, alignment);
            let end = offset + size;
            check_heap_limit(end, max_heap_size)?;

            heap.persistent_size = end;
            heap.size = heap.size.max(end);
            let heap_id = heap.index;
            runs[run_index].watermark = runs[run_index].watermark.max(end);

            state.resource_instances[index].alloc_placement = HeapPlacement { heap_id, offset };
        }

        // Transients in (lifetime_begin, -lifetime_end) order.
        let mut transients: Vec<u32> = (0..state.resource_instances.len() as u32)
            .filter(|&id| {
                let instance = &state.resource_instances[id as usize];
                instance.is_active()
                    && !instance.is_external
                    && !instance.is_temporal_parent()
                    && !instance.is_persistent()
                    && !instance.has_empty_lifetime()
                    && instance.alloc_requirement.size > 0
            })
            .collect();
        transients.sort_by_key(|&id| {
            let instance = &state.resource_instances[id as usize];
            (
                instance.lifetime_begin,
                std::cmp::Reverse(instance.lifetime_end),
            )
        });

        let mut aliasing_events: Vec<(u32, ResourceAliasingInfo)> = Vec::new();

        for resource in transients {
            let (size, alignment_req, memory_type_mask, lifetime_begin, lifetime_end) = {
                let instance = &state.resource_instances[resource as usize];
                (
                    instance.alloc_requirement.size,
                    instance.alloc_requirement.alignment,
                    instance.alloc_requirement.memory_type_mask,
                    instance.lifetime_begin,
                    instance.lifetime_end,
                )
            };

            let memory_type = memory_type_of(memory_type_mask);
            let run_index = heap_run_for(&mut runs, &mut state.heaps, memory_types, memory_type);
            let run = &mut runs[run_index];
            let heap = &mut state.heaps[run.heap_index];
            let alignment = u64::from(alignment_req.max(heap.alignment));

            // Retire placements whose tenant is past its last use.
            if allow_aliasing {
                let free_spans = &mut run.free_spans;
                run.active.retain(|active| {
                    if active.lifetime_end < lifetime_begin {
                        free_spans.push(FreeSpan {
                            offset: active.offset,
                            size: active.size,
                            prev_owner: Some((active.resource, active.lifetime_end)),
                        });
                        false
                    } else {
                        true
                    }
                });
            }

            // Smallest recycled span that fits, aligned.
            let fitting = run
                .free_spans
                .iter()
                .enumerate()
                .filter(|(_, span)| {
                    align_up(span.offset, alignment) + size <= span.offset + span.size
                })
                .min_by_key(|(_, span)| span.size)
                .map(|(span_index, _)| span_index);

            let offset = if let Some(span_index) = fitting {
                let span = run.free_spans.swap_remove(span_index);
                let offset = align_up(span.offset, alignment);

                if let Some((prev_resource, prev_end)) = span.prev_owner {
                    aliasing_events.push((
                        prev_end,
                        ResourceAliasingInfo {
                            src_resource_id: prev_resource,
                            dst_resource_id: resource,
                            src_deactivating: true,
                            dst_activating: false,
                        },
                    ));
                    aliasing_events.push((
                        lifetime_begin,
                        ResourceAliasingInfo {
                            src_resource_id: prev_resource,
                            dst_resource_id: resource,
                            src_deactivating: false,
                            dst_activating: true,
                        },
                    ));
                    state.resource_instances[prev_resource as usize].is_aliased = true;
                    state.resource_instances[resource as usize].is_aliased = true;
                }

                // Return the unused head and tail of the span.
                if offset > span.offset {
                    run.free_spans.push(FreeSpan {
                        offset: span.offset,
                        size: offset - span.offset,
                        prev_owner: None,
                    });
                }
                let span_end = span.offset + span.size;
                if offset + size < span_end {
                    run.free_spans.push(FreeSpan {
                        offset: offset + size,
                        size: span_end - (offset + size),
                        prev_owner: None,
                    });
                }

                offset
            } else {
                let offset = align_up(run.watermark, alignment);
                let end = offset + size;
                check_heap_limit(end, max_heap_size)?;
                run.watermark = end;
                heap.size = heap.size.max(end);
                offset
            };

            run.active.push(ActivePlacement {
                resource,
                offset,
                size,
                lifetime_end,
            });

            let placement = HeapPlacement {
                heap_id: heap.index,
                offset,
            };
            let instance = &mut state.resource_instances[resource as usize];
            if instance.alloc_placement != placement && instance.runtime_resource.is_some() {
                // The backend object is bound to the old memory.
                if let Some(handle) = instance.runtime_resource.take() {
                    ctx.backend
                        .destroy_resource_deferred(instance.desc.ty, handle);
                }
                instance.is_pending_create = true;
            }
            instance.alloc_placement = placement;
        }

        // Heap accounting.
        for run in &runs {
            let heap = &mut state.heaps[run.heap_index];
            heap.used_size = run.watermark;
            heap.max_used_size = heap.max_used_size.max(run.watermark);
        }

        // Attach the aliasing records to their runtime-cmds.
        aliasing_events.sort_by_key(|&(cmd, _)| cmd);
        let mut cursor = 0usize;
        while cursor < aliasing_events.len() {
            let cmd = aliasing_events[cursor].0;
            let group_end = aliasing_events[cursor..]
                .iter()
                .position(|&(c, _)| c != cmd)
                .map_or(aliasing_events.len(), |relative| cursor + relative);

            let span = state.aliasing_infos.extend_with_span(
                aliasing_events[cursor..group_end].iter().map(|&(_, info)| info),
            );
            if (cmd as usize) < state.runtime_cmds.len() {
                state.runtime_cmds[cmd].aliasing_infos = span;
            }
            cursor = group_end;
        }

        log::debug!(
            "aliasing: {} heaps, {} aliasing records",
            state.heaps.len(),
            state.aliasing_infos.len()
        );

        Ok(())
    }
}
