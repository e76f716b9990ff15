//! Runtime Backend Interface
//!
//! The engine talks to GPU APIs exclusively through the [`RuntimeBackend`]
//! trait: a capability set covering heap and resource materialization,
//! access-transition refinement, command recording hooks and debug utilities.
//! Backends hold their native objects behind opaque integer handles
//! ([`RuntimeResource`], [`RuntimeHeap`], [`CommandBuffer`]); the engine
//! never interprets a handle between `create` and `destroy`.
//!
//! Method split: everything invoked during [`update`] takes `&mut self`;
//! everything invoked during [`record_commands`] takes `&self`, because
//! recording disjoint stream slices may happen concurrently (one thread per
//! command buffer).
//!
//! [`update`]: crate::graph::RenderGraph::update
//! [`record_commands`]: crate::graph::RenderGraph::record_commands

use bitflags::bitflags;

use crate::errors::Result;
use crate::graph::access::{AccessAttr, AccessTransitionInfo};
use crate::graph::compile::RenderGraphPhase;
use crate::graph::resource::{
    AllocRequirement, ClearInfo, ResourceDesc, ResourceInstance, ResourceType, SubresourceRange,
};
use crate::runtime::record::DebugMarkerMode;

/// Opaque handle to a backend resource object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RuntimeResource(pub u64);

/// Opaque handle to a backend memory heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RuntimeHeap(pub u64);

/// Opaque handle to a backend command buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct CommandBuffer(pub u64);

bitflags! {
    /// Capabilities of one device queue.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct QueueFlags: u32 {
        /// Queue executes graphics work.
        const GRAPHICS = 1 << 0;
        /// Queue executes compute work.
        const COMPUTE = 1 << 1;
        /// Queue executes copy work.
        const COPY = 1 << 2;
    }
}

/// Properties of one backend memory type bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryTypeInfo {
    /// Granularity heaps of this type grow by.
    pub default_heap_size: u64,
    /// Minimum alignment of placements on heaps of this type.
    pub min_alignment: u32,
}

impl Default for MemoryTypeInfo {
    fn default() -> Self {
        Self {
            default_heap_size: 64 * 1024 * 1024,
            min_alignment: 256,
        }
    }
}

/// State of one engine-managed memory heap.
#[derive(Clone, Debug)]
pub struct HeapInfo {
    /// Memory type bucket the heap belongs to.
    pub memory_type: u32,
    /// Heap index within the graph.
    pub index: u32,
    /// Total size in bytes.
    pub size: u64,
    /// Placement alignment in bytes.
    pub alignment: u32,
    /// Bytes currently occupied.
    pub used_size: u64,
    /// High-water mark of `used_size`.
    pub max_used_size: u64,
    /// Bytes at the front of the heap reserved for persistent placements;
    /// stable across frames, transient packing starts past it.
    pub persistent_size: u64,
    /// Backend heap object, once created.
    pub runtime_heap: Option<RuntimeHeap>,
}

/// Parameters for creating one backend resource.
#[derive(Clone, Debug)]
pub struct CreateResourceArgs<'a> {
    /// Declaration id of the resource.
    pub resource_id: u32,
    /// Reconciled descriptor.
    pub desc: &'a ResourceDesc,
    /// Captured clear value, if any.
    pub clear_value: Option<&'a ClearInfo>,
    /// Memory requirements.
    pub alloc_requirement: AllocRequirement,
    /// Placement on an engine heap, if the resource is heap-placed.
    pub heap_placement: Option<(RuntimeHeap, u64)>,
    /// Union of all accesses ever observed.
    pub all_accesses: AccessAttr,
    /// First access of the current frame.
    pub initial_access: AccessAttr,
    /// Views reinterpret the resource format.
    pub mutable_format: bool,
    /// Buffer is read through formatted (texel) views.
    pub buffer_formatted_read: bool,
    /// Buffer is written through formatted (texel) views.
    pub buffer_formatted_write: bool,
    /// Debug name.
    pub name: &'a str,
}

/// One transition record handed to the backend during recording.
#[derive(Clone, Copy, Debug)]
pub struct TransitionRecord {
    /// The transitioned resource.
    pub resource: RuntimeResource,
    /// Access state before the transition.
    pub prev_access: AccessAttr,
    /// Access state after the transition.
    pub next_access: AccessAttr,
    /// Transitioned subresource range.
    pub range: SubresourceRange,
}

/// Backend capability set invoked by compilation and recording.
///
/// Every method has a workable default, so a minimal backend only overrides
/// what its API needs. The [`NullBackend`] relies almost entirely on these
/// defaults.
///
/// [`NullBackend`]: crate::runtime::NullBackend
pub trait RuntimeBackend: Send + Sync {
    // ── Update-side (compilation) ──────────────────────────────────────────

    /// Called once per `update` before materialization, with the frame
    /// indices of the update.
    fn update_frame(&mut self, frame_index: u64, gpu_completed_frame_index: u64) -> Result<()> {
        let _ = (frame_index, gpu_completed_frame_index);
        Ok(())
    }

    /// Lets the backend inject custom compilation phases, run after lifetime
    /// analysis and before memory aliasing.
    fn build_phases(&self) -> Vec<Box<dyn RenderGraphPhase>> {
        Vec::new()
    }

    /// Creates the backend heap object for `heap`.
    fn create_heap(&mut self, heap: &HeapInfo, debug_name: &str) -> Result<RuntimeHeap>;

    /// Destroys backend heap objects.
    fn destroy_heaps(&mut self, heaps: &mut [HeapInfo]);

    /// Creates one backend resource object.
    fn create_resource(&mut self, args: &CreateResourceArgs<'_>) -> Result<RuntimeResource>;

    /// Destroys backend resource objects immediately.
    fn destroy_resources(&mut self, ty: ResourceType, resources: &[RuntimeResource]);

    /// Queues a backend resource object for destruction once the frame that
    /// retired it completes on the GPU.
    fn destroy_resource_deferred(&mut self, ty: ResourceType, resource: RuntimeResource);

    /// Releases deferred destructions whose retiring frame has completed.
    fn recycle_frame(&mut self, gpu_completed_frame_index: u64) {
        let _ = gpu_completed_frame_index;
    }

    /// Creates user resources associated with the frame's nodes (descriptor
    /// allocations, PSOs, …).
    fn create_node_resources(&mut self) -> Result<()> {
        Ok(())
    }

    /// Destroys user resources created by [`Self::create_node_resources`].
    fn destroy_node_resources(&mut self) {}

    /// Computes the memory requirements of a resource. The default provides a
    /// conservative tightly-packed estimate for the null backend.
    fn get_resource_alloc_requirement(&self, instance: &ResourceInstance) -> AllocRequirement {
        let desc = &instance.desc;
        let size = if desc.is_buffer() {
            desc.buffer_size
        } else {
            let texel = u64::from(desc.image.format.element_bytes().max(1));
            let layers = u64::from(desc.array_layers());
            let samples = u64::from(desc.sample_count());
            let depth = u64::from(match desc.ty {
                ResourceType::Image3D => desc.image.depth_or_layers,
                _ => 1,
            });
            let mut total = 0u64;
            for mip in 0..desc.image.mip_levels.max(1) {
                let w = u64::from((desc.image.width >> mip).max(1));
                let h = u64::from((desc.image.height >> mip).max(1));
                let d = (depth >> mip).max(1);
                total += w * h * d * layers * samples * texel;
            }
            total
        };

        AllocRequirement {
            size,
            alignment: 256,
            memory_type_mask: 1,
        }
    }

    /// Refines the transition decision for an ordered access pair. Returning
    /// `None` selects the engine default
    /// ([`AccessTransitionInfo::default_for`]).
    fn calculate_access_transition(
        &self,
        before: &AccessAttr,
        after: &AccessAttr,
    ) -> Option<AccessTransitionInfo> {
        let _ = (before, after);
        None
    }

    /// Reports which image aspects the given aspect-mask bits address. The
    /// default implements the two-aspect model: bit 0 is color-or-depth,
    /// bit 1 is stencil.
    fn get_image_aspect_usages(&self, aspect_mask: u32) -> AspectUsage {
        let mut usage = AspectUsage::empty();
        if aspect_mask & 0b01 != 0 {
            usage |= AspectUsage::COLOR | AspectUsage::DEPTH;
        }
        if aspect_mask & 0b10 != 0 {
            usage |= AspectUsage::STENCIL;
        }
        usage
    }

    /// Whether aliased resources forget their final access at the end of the
    /// frame. Backends able to transition from an undefined layout may return
    /// `false` to keep the state.
    fn should_reset_aliased_resources_prev_final_access(&self) -> bool {
        true
    }

    // ── Record-side (may run concurrently on disjoint stream slices) ──────

    /// Records one layout / visibility transition.
    fn record_transition(&self, command_buffer: CommandBuffer, transition: &TransitionRecord) {
        let _ = (command_buffer, transition);
    }

    /// Emitted before a graphics node's callback (unless the node opts out):
    /// begins the render pass over the command's attachments.
    fn record_render_pass_begin(
        &self,
        context: &crate::runtime::record::CmdCallbackContext<'_>,
    ) -> Result<()> {
        let _ = context;
        Ok(())
    }

    /// Emitted after a graphics node's callback: ends the render pass, and
    /// may emit resolve operations for render targets with resolve targets.
    fn record_render_pass_end(
        &self,
        context: &crate::runtime::record::CmdCallbackContext<'_>,
    ) -> Result<()> {
        let _ = context;
        Ok(())
    }

    /// Records a debug marker.
    fn record_debug_marker(&self, command_buffer: CommandBuffer, mode: DebugMarkerMode, text: &str) {
        let _ = (command_buffer, mode, text);
    }

    /// Assigns a debug name to a backend resource.
    fn set_debug_name(&self, resource: RuntimeResource, name: &str) {
        let _ = (resource, name);
    }
}

bitflags! {
    /// Bitflags for used aspects of an image resource.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct AspectUsage: u32 {
        /// The color aspect is used.
        const COLOR = 1 << 0;
        /// The depth aspect is used.
        const DEPTH = 1 << 1;
        /// The stencil aspect is used.
        const STENCIL = 1 << 2;
        /// The metadata aspect is used.
        const METADATA = 1 << 3;
    }
}
