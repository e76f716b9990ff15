//! Resource Descriptors and Instances
//!
//! [`ResourceDesc`] is the application-facing description of a virtual
//! resource (buffer or 1D/2D/3D image). [`ResourceInstance`] is the engine's
//! cached per-resource state: it survives across frames and carries the
//! reconciled descriptor, the union of observed accesses, the lifetime in
//! runtime-command index space, the heap placement, and the backend handle.
//!
//! Subresources follow the two-aspect model: aspect bit 0 is the color or
//! depth plane, bit 1 is the stencil plane. Backends report which aspect bits
//! are in use for a format through
//! [`RuntimeBackend::get_image_aspect_usages`].
//!
//! [`RuntimeBackend::get_image_aspect_usages`]:
//!     crate::runtime::RuntimeBackend::get_image_aspect_usages

use bitflags::bitflags;

use crate::graph::access::AccessAttr;
use crate::graph::format::Format;
use crate::runtime::backend::RuntimeResource;
use crate::utils::Span;

/// Type for resource identifiers (dense indices into the instance vector).
pub type ResourceId = u32;

/// Constant for an invalid resource id.
pub const RESOURCE_ID_INVALID: ResourceId = u32::MAX;

/// Maximum number of temporal layers a resource may have.
pub const MAX_TEMPORAL_LAYERS: u32 = 256;

/// Maximum number of simultaneously bound render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Resource types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ResourceType {
    /// Resource type is unknown / invalid.
    #[default]
    Unknown,
    /// A buffer resource.
    Buffer,
    /// A 1D image resource.
    Image1D,
    /// A 2D image resource.
    Image2D,
    /// A 3D image resource.
    Image3D,
}

bitflags! {
    /// Bitflags for special properties of a resource.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct ResourceFlags: u32 {
        /// Supports cubemap views.
        const CUBEMAP_COMPATIBLE = 1 << 1;
        /// Uses row-major image layout.
        const ROW_MAJOR_IMAGE = 1 << 2;
        /// Preferred to live in a GPU-local CPU-visible heap if available.
        const PREFER_GPU_LOCAL_CPU_VISIBLE = 1 << 3;
        /// Preferred to be a dedicated allocation.
        const PREFER_DEDICATED_ALLOCATION = 1 << 4;
        /// Resource data is persistent from frame to frame.
        const PERSISTENT = 1 << 15;
    }
}

/// Image-specific descriptor fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ImageDesc {
    /// Width in texels.
    pub width: u32,
    /// Height in texels (1 for 1D images).
    pub height: u32,
    /// Depth for 3D images, array layer count otherwise.
    pub depth_or_layers: u32,
    /// Number of mipmap levels. 0 requests a full chain
    /// (see [`ResourceDesc::canonicalize_mips`]).
    pub mip_levels: u32,
    /// Texel format.
    pub format: Format,
    /// MSAA sample count.
    pub sample_count: u32,
}

/// Description of a virtual resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceDesc {
    /// Resource type selecting which of `image` / `buffer_size` applies.
    pub ty: ResourceType,
    /// Number of temporal layers (>= 1; > 1 makes the resource a rolling
    /// history keyed by frame index).
    pub temporal_layers: u32,
    /// Special property flags.
    pub flags: ResourceFlags,
    /// Image fields; ignored for buffers.
    pub image: ImageDesc,
    /// Buffer size in bytes; ignored for images.
    pub buffer_size: u64,
}

impl Default for ResourceDesc {
    fn default() -> Self {
        Self {
            ty: ResourceType::Unknown,
            temporal_layers: 1,
            flags: ResourceFlags::empty(),
            image: ImageDesc::default(),
            buffer_size: 0,
        }
    }
}

impl ResourceDesc {
    /// Creates a buffer description.
    #[must_use]
    pub fn buffer(size_in_bytes: u64) -> Self {
        Self {
            ty: ResourceType::Buffer,
            buffer_size: size_in_bytes,
            ..Self::default()
        }
    }

    /// Creates a 1D image description.
    #[must_use]
    pub fn image_1d(format: Format, width: u32) -> Self {
        Self {
            ty: ResourceType::Image1D,
            image: ImageDesc {
                width,
                height: 1,
                depth_or_layers: 1,
                mip_levels: 1,
                format,
                sample_count: 1,
            },
            ..Self::default()
        }
    }

    /// Creates a 2D image description.
    #[must_use]
    pub fn image_2d(format: Format, width: u32, height: u32) -> Self {
        Self {
            ty: ResourceType::Image2D,
            image: ImageDesc {
                width,
                height,
                depth_or_layers: 1,
                mip_levels: 1,
                format,
                sample_count: 1,
            },
            ..Self::default()
        }
    }

    /// Creates a 3D image description.
    #[must_use]
    pub fn image_3d(format: Format, width: u32, height: u32, depth: u32) -> Self {
        Self {
            ty: ResourceType::Image3D,
            image: ImageDesc {
                width,
                height,
                depth_or_layers: depth,
                mip_levels: 1,
                format,
                sample_count: 1,
            },
            ..Self::default()
        }
    }

    /// Sets the array layer count (non-3D images).
    #[must_use]
    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.image.depth_or_layers = layers;
        self
    }

    /// Sets the mip level count (0 requests a full chain).
    #[must_use]
    pub fn with_mip_levels(mut self, mips: u32) -> Self {
        self.image.mip_levels = mips;
        self
    }

    /// Sets the MSAA sample count.
    #[must_use]
    pub fn with_sample_count(mut self, samples: u32) -> Self {
        self.image.sample_count = samples;
        self
    }

    /// Sets the temporal layer count.
    #[must_use]
    pub fn with_temporal_layers(mut self, layers: u32) -> Self {
        self.temporal_layers = layers;
        self
    }

    /// Adds resource flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns `true` if the resource is a buffer.
    #[must_use]
    pub const fn is_buffer(&self) -> bool {
        matches!(self.ty, ResourceType::Buffer)
    }

    /// Returns `true` if the resource is an image.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(
            self.ty,
            ResourceType::Image1D | ResourceType::Image2D | ResourceType::Image3D
        )
    }

    /// Array layer count (1 for 3D images and buffers).
    #[must_use]
    pub const fn array_layers(&self) -> u32 {
        match self.ty {
            ResourceType::Image1D | ResourceType::Image2D => self.image.depth_or_layers,
            _ => 1,
        }
    }

    /// MSAA sample count (1 for buffers).
    #[must_use]
    pub const fn sample_count(&self) -> u32 {
        if self.is_image() {
            self.image.sample_count
        } else {
            1
        }
    }

    /// Replaces a zero mip count with the full chain for the largest
    /// dimension: `floor(log2(max_dim)) + 1`.
    pub fn canonicalize_mips(&mut self) {
        if self.is_image() && self.image.mip_levels == 0 {
            let max_dim = self
                .image
                .width
                .max(self.image.height)
                .max(match self.ty {
                    ResourceType::Image3D => self.image.depth_or_layers,
                    _ => 1,
                })
                .max(1);
            self.image.mip_levels = 32 - max_dim.leading_zeros();
        }
    }

    /// The full subresource range of a resource with this description.
    #[must_use]
    pub fn full_subresource_range(&self) -> SubresourceRange {
        if self.is_image() {
            SubresourceRange {
                aspect_mask: self.image.format.aspect_mask(),
                base_mip: 0,
                mip_count: self.image.mip_levels.max(1),
                base_layer: 0,
                layer_count: self.array_layers(),
            }
        } else {
            SubresourceRange::whole_buffer()
        }
    }
}

/// Subsection of a resource: aspect planes, mip levels and array layers.
///
/// Buffers use the single-subresource range `(aspect 1, mip 0..1, layer
/// 0..1)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubresourceRange {
    /// Aspect planes included in the range (two-aspect model).
    pub aspect_mask: u32,
    /// First mip level in the range.
    pub base_mip: u32,
    /// Number of mip levels in the range.
    pub mip_count: u32,
    /// First array layer in the range.
    pub base_layer: u32,
    /// Number of array layers in the range.
    pub layer_count: u32,
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::whole_buffer()
    }
}

impl SubresourceRange {
    /// The single-subresource range used for buffers.
    #[must_use]
    pub const fn whole_buffer() -> Self {
        Self {
            aspect_mask: 1,
            base_mip: 0,
            mip_count: 1,
            base_layer: 0,
            layer_count: 1,
        }
    }

    /// Creates a mip / layer range over aspect bit 0.
    #[must_use]
    pub const fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            aspect_mask: 1,
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    /// Number of subresources covered: aspects × mips × layers.
    #[must_use]
    pub const fn subresource_count(&self) -> u32 {
        self.aspect_mask.count_ones() * self.mip_count * self.layer_count
    }

    /// One-past-the-end mip level.
    #[must_use]
    pub const fn mip_end(&self) -> u32 {
        self.base_mip + self.mip_count
    }

    /// One-past-the-end array layer.
    #[must_use]
    pub const fn layer_end(&self) -> u32 {
        self.base_layer + self.layer_count
    }

    /// Intersects `self` with `other`, returning `None` when disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let aspect_mask = self.aspect_mask & other.aspect_mask;
        let base_mip = self.base_mip.max(other.base_mip);
        let mip_end = self.mip_end().min(other.mip_end());
        let base_layer = self.base_layer.max(other.base_layer);
        let layer_end = self.layer_end().min(other.layer_end());

        if aspect_mask == 0 || base_mip >= mip_end || base_layer >= layer_end {
            return None;
        }

        Some(Self {
            aspect_mask,
            base_mip,
            mip_count: mip_end - base_mip,
            base_layer,
            layer_count: layer_end - base_layer,
        })
    }
}

/// RGBA color value to clear a resource to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearColorValue {
    /// Float clear color.
    Float([f32; 4]),
    /// Signed integer clear color.
    Int([i32; 4]),
    /// Unsigned integer clear color.
    Uint([u32; 4]),
}

impl Default for ClearColorValue {
    fn default() -> Self {
        Self::Float([0.0; 4])
    }
}

/// General value a resource can be cleared to.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ClearValue {
    /// Clear value for a color resource.
    pub color: ClearColorValue,
    /// Clear value for the depth aspect.
    pub depth: f32,
    /// Clear value for the stencil aspect (lower 8 bits used).
    pub stencil: u32,
}

/// Clear value paired with the view format to clear through.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ClearInfo {
    /// Format of the resource view to use for clearing.
    pub format: Format,
    /// Clear value.
    pub value: ClearValue,
}

/// GPU memory allocation requirements of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AllocRequirement {
    /// Required size in bytes.
    pub size: u64,
    /// Required alignment in bytes.
    pub alignment: u32,
    /// Mask of compatible memory type indices.
    pub memory_type_mask: u32,
}

/// Placement of a resource on a heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapPlacement {
    /// Index of the heap, or `u32::MAX` when unplaced.
    pub heap_id: u32,
    /// Byte offset on the heap.
    pub offset: u64,
}

impl Default for HeapPlacement {
    fn default() -> Self {
        Self::UNPLACED
    }
}

impl HeapPlacement {
    /// Placement of a resource that has not been assigned heap memory.
    pub const UNPLACED: Self = Self {
        heap_id: u32::MAX,
        offset: 0,
    };

    /// Returns `true` if the resource has been assigned heap memory.
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        self.heap_id != u32::MAX
    }
}

/// Final access state of a contiguous subresource range, recorded at the end
/// of a frame for next-frame transition seeding.
#[derive(Clone, Copy, Debug, Default)]
pub struct FinalAccessInfo {
    /// Index of the last transition on the range.
    pub prev_transition: u32,
    /// The covered subresource range.
    pub range: SubresourceRange,
}

/// Canonical per-resource state cached across frames.
///
/// One instance exists per declared resource, plus one per temporal slice of
/// temporal resources (placed past the declaration range). Instances are
/// addressed by dense [`ResourceId`]s; no pointers cross between them.
#[derive(Clone, Debug)]
pub struct ResourceInstance {
    /// Declaration slot this instance belongs to, or `RESOURCE_ID_INVALID`
    /// for an inactive slot.
    pub resource_decl_id: ResourceId,
    /// For a temporal parent, index of its first slice; `None` otherwise.
    pub temporal_layer_offset: Option<u32>,
    /// Reconciled descriptor.
    pub desc: ResourceDesc,
    /// Full subresource range of the resource.
    pub full_range: SubresourceRange,
    /// Cached `full_range.subresource_count()`.
    pub num_subresources: u32,
    /// Clear-value slot id, if a clear value has been captured.
    pub clear_value_id: Option<u32>,
    /// Union of all accesses ever seen.
    pub all_accesses: AccessAttr,
    /// First access of the current frame.
    pub initial_access: AccessAttr,
    /// Final access carried over from the previous frame.
    pub prev_final_access: AccessAttr,
    /// Span into the final-access vector (per-subresource last accesses).
    pub final_accesses: Span,
    /// First runtime-cmd index using the resource this frame.
    pub lifetime_begin: u32,
    /// Last runtime-cmd index using the resource this frame.
    pub lifetime_end: u32,
    /// Instance is a temporal slice.
    pub is_temporal_slice: bool,
    /// Instance is the first slice of its parent.
    pub is_first_temporal_slice: bool,
    /// Lifetime is owned by the application.
    pub is_external: bool,
    /// Instance shares heap memory with a lifetime-disjoint resource.
    pub is_aliased: bool,
    /// Backend object must be (re)created.
    pub is_pending_create: bool,
    /// Resource was accessed by at least one node this frame.
    pub is_accessed: bool,
    /// Views with formats differing from the resource format exist.
    pub is_mutable_format: bool,
    /// Buffer is used through formatted (texel) writes.
    pub buffer_formatted_write: bool,
    /// Buffer is used through formatted (texel) reads.
    pub buffer_formatted_read: bool,
    /// GPU memory requirements.
    pub alloc_requirement: AllocRequirement,
    /// Heap placement.
    pub alloc_placement: HeapPlacement,
    /// Backend object handle.
    pub runtime_resource: Option<RuntimeResource>,
}

impl Default for ResourceInstance {
    fn default() -> Self {
        Self {
            resource_decl_id: RESOURCE_ID_INVALID,
            temporal_layer_offset: None,
            desc: ResourceDesc::default(),
            full_range: SubresourceRange::whole_buffer(),
            num_subresources: 0,
            clear_value_id: None,
            all_accesses: AccessAttr::UNKNOWN,
            initial_access: AccessAttr::UNKNOWN,
            prev_final_access: AccessAttr::UNKNOWN,
            final_accesses: Span::EMPTY,
            lifetime_begin: u32::MAX,
            lifetime_end: u32::MAX,
            is_temporal_slice: false,
            is_first_temporal_slice: false,
            is_external: false,
            is_aliased: false,
            is_pending_create: false,
            is_accessed: false,
            is_mutable_format: false,
            buffer_formatted_write: false,
            buffer_formatted_read: false,
            alloc_requirement: AllocRequirement::default(),
            alloc_placement: HeapPlacement::UNPLACED,
            runtime_resource: None,
        }
    }
}

impl ResourceInstance {
    /// Returns `true` if the slot holds an active declaration.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.resource_decl_id != RESOURCE_ID_INVALID
    }

    /// Returns `true` if the instance is a temporal parent (owns slices, has
    /// no backend object of its own).
    #[must_use]
    pub const fn is_temporal_parent(&self) -> bool {
        self.temporal_layer_offset.is_some()
    }

    /// Returns `true` if no access has ever been observed.
    #[must_use]
    pub const fn has_no_access(&self) -> bool {
        self.all_accesses.is_unknown()
    }

    /// Returns `true` if the lifetime interval is empty.
    #[must_use]
    pub const fn has_empty_lifetime(&self) -> bool {
        self.lifetime_begin > self.lifetime_end
    }

    /// Returns `true` if the resource outlives the frame: external, or
    /// flagged persistent (temporal resources are forced persistent).
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.is_external || self.desc.flags.contains(ResourceFlags::PERSISTENT)
    }

    /// Finalizes a pending backend-object creation, seeding
    /// `prev_final_access` for the first transition.
    pub fn finalize_runtime_resource_creation(&mut self, override_prev_access: Option<AccessAttr>) {
        debug_assert!(self.runtime_resource.is_some());
        debug_assert!(self.is_pending_create);

        self.prev_final_access = override_prev_access.unwrap_or(self.initial_access);
        self.is_pending_create = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_full_mip_chain() {
        let mut desc = ResourceDesc::image_2d(Format::Rgba8Unorm, 800, 600).with_mip_levels(0);
        desc.canonicalize_mips();
        // floor(log2(800)) + 1 == 10
        assert_eq!(desc.image.mip_levels, 10);
    }

    #[test]
    fn canonicalize_leaves_explicit_mips() {
        let mut desc = ResourceDesc::image_2d(Format::Rgba8Unorm, 256, 256).with_mip_levels(3);
        desc.canonicalize_mips();
        assert_eq!(desc.image.mip_levels, 3);
    }

    #[test]
    fn subresource_count_spans_aspects() {
        let range = SubresourceRange {
            aspect_mask: 0b11,
            base_mip: 0,
            mip_count: 4,
            base_layer: 0,
            layer_count: 2,
        };
        assert_eq!(range.subresource_count(), 16);
    }

    #[test]
    fn range_intersection() {
        let a = SubresourceRange::new(0, 4, 0, 6);
        let b = SubresourceRange::new(2, 4, 4, 4);
        let i = a.intersect(&b).unwrap();
        assert_eq!((i.base_mip, i.mip_count), (2, 2));
        assert_eq!((i.base_layer, i.layer_count), (4, 2));

        let disjoint = SubresourceRange::new(4, 2, 0, 1);
        assert!(SubresourceRange::new(0, 2, 0, 1).intersect(&disjoint).is_none());
    }

    #[test]
    fn persistent_classification() {
        let mut inst = ResourceInstance {
            desc: ResourceDesc::buffer(256),
            ..ResourceInstance::default()
        };
        assert!(!inst.is_persistent());
        inst.is_external = true;
        assert!(inst.is_persistent());
        inst.is_external = false;
        inst.desc.flags |= ResourceFlags::PERSISTENT;
        assert!(inst.is_persistent());
    }
}
