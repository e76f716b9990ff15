//! Null Backend
//!
//! The reference no-op backend: compiles and replays graphs without a GPU.
//! Heap and resource handles are monotonically numbered stubs; deferred
//! destruction is modeled faithfully (handles are queued with the frame
//! that retired them and released once that frame is reported complete),
//! so the frame-retirement contract can be exercised in tests.

use crate::errors::Result;
use crate::runtime::backend::{
    CommandBuffer, CreateResourceArgs, HeapInfo, RuntimeBackend, RuntimeHeap, RuntimeResource,
    TransitionRecord,
};
use crate::graph::resource::ResourceType;
use crate::runtime::record::DebugMarkerMode;

/// No-op backend with counted stub handles.
#[derive(Default)]
pub struct NullBackend {
    heap_counter: u64,
    resource_counter: u64,
    frame_index: u64,
    /// Handles queued for destruction, keyed by the frame that retired them.
    deferred: Vec<(u64, RuntimeResource)>,
}

impl NullBackend {
    /// Creates a null backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles still waiting for their retiring frame to complete.
    #[must_use]
    pub fn pending_destructions(&self) -> usize {
        self.deferred.len()
    }
}

impl RuntimeBackend for NullBackend {
    fn update_frame(&mut self, frame_index: u64, gpu_completed_frame_index: u64) -> Result<()> {
        self.frame_index = frame_index;
        self.recycle_frame(gpu_completed_frame_index);
        Ok(())
    }

    fn create_heap(&mut self, heap: &HeapInfo, debug_name: &str) -> Result<RuntimeHeap> {
        self.heap_counter += 1;
        log::debug!(
            "null backend: heap {} ({debug_name}, {} bytes, memory type {})",
            self.heap_counter,
            heap.size,
            heap.memory_type
        );
        Ok(RuntimeHeap(self.heap_counter))
    }

    fn destroy_heaps(&mut self, heaps: &mut [HeapInfo]) {
        for heap in heaps {
            heap.runtime_heap = None;
        }
    }

    fn create_resource(&mut self, args: &CreateResourceArgs<'_>) -> Result<RuntimeResource> {
        self.resource_counter += 1;
        log::debug!(
            "null backend: resource {} ('{}', all accesses: {})",
            self.resource_counter,
            args.name,
            args.all_accesses
        );
        Ok(RuntimeResource(self.resource_counter))
    }

    fn destroy_resources(&mut self, _ty: ResourceType, _resources: &[RuntimeResource]) {}

    fn destroy_resource_deferred(&mut self, _ty: ResourceType, resource: RuntimeResource) {
        self.deferred.push((self.frame_index, resource));
    }

    fn recycle_frame(&mut self, gpu_completed_frame_index: u64) {
        if gpu_completed_frame_index == u64::MAX {
            return;
        }
        self.deferred
            .retain(|&(retired_frame, _)| retired_frame > gpu_completed_frame_index);
    }

    fn record_transition(&self, _command_buffer: CommandBuffer, _transition: &TransitionRecord) {}

    fn record_debug_marker(
        &self,
        _command_buffer: CommandBuffer,
        _mode: DebugMarkerMode,
        _text: &str,
    ) {
    }
}
