//! Resource Views
//!
//! Views are the payloads node arguments carry: a resource id plus the
//! subsection and reinterpretation the node sees. The compiler intersects a
//! view's declared range with the resource's full range and derives the
//! accessed aspects from the parameter's access attribute.

use bitflags::bitflags;

use crate::graph::format::Format;
use crate::graph::resource::{RESOURCE_ID_INVALID, ResourceId, SubresourceRange};

/// Buffer range value meaning "the entire remaining size of the buffer".
pub const WHOLE_SIZE: u64 = u64::MAX;

bitflags! {
    /// Bitflags for resource view properties.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct ResourceViewFlags: u32 {
        /// Resource view is used as a cubemap.
        const CUBEMAP = 1 << 0;
    }
}

/// Image resource view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageView {
    /// Viewed resource, or `RESOURCE_ID_INVALID` for a null view.
    pub resource_id: ResourceId,
    /// View format. `Unknown` inherits the resource format.
    pub format: Format,
    /// Temporal layer: 0 = current frame, 1 = previous frame, …
    pub temporal_layer: u32,
    /// Additional view properties.
    pub flags: ResourceViewFlags,
    /// Subresource range of the view.
    pub subresource_range: SubresourceRange,
    /// Min LOD clamp value.
    pub min_lod_clamp: f32,
    /// Packed RGBA channel mapping, one byte per destination channel.
    pub component_mapping: u32,
}

/// Identity channel mapping: R, G, B, A map to themselves.
pub const COMPONENT_MAPPING_DEFAULT: u32 = u32::from_le_bytes([0, 1, 2, 3]);

impl Default for ImageView {
    fn default() -> Self {
        Self::null()
    }
}

impl ImageView {
    /// The null image view.
    #[must_use]
    pub fn null() -> Self {
        Self {
            resource_id: RESOURCE_ID_INVALID,
            format: Format::Unknown,
            temporal_layer: 0,
            flags: ResourceViewFlags::empty(),
            subresource_range: SubresourceRange::new(0, 1, 0, 1),
            min_lod_clamp: 0.0,
            component_mapping: COMPONENT_MAPPING_DEFAULT,
        }
    }

    /// Creates a view of a resource's first mip and layer.
    #[must_use]
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            ..Self::null()
        }
    }

    /// Sets the view format.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the temporal layer.
    #[must_use]
    pub fn with_temporal_layer(mut self, layer: u32) -> Self {
        self.temporal_layer = layer;
        self
    }

    /// Sets the subresource range.
    #[must_use]
    pub fn with_range(mut self, range: SubresourceRange) -> Self {
        self.subresource_range = range;
        self
    }

    /// Marks the view as a cubemap view.
    #[must_use]
    pub fn as_cubemap(mut self) -> Self {
        self.flags |= ResourceViewFlags::CUBEMAP;
        self
    }

    /// Returns `true` if the view references no resource.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.resource_id == RESOURCE_ID_INVALID
    }
}

/// Buffer resource view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferView {
    /// Viewed resource, or `RESOURCE_ID_INVALID` for a null view.
    pub resource_id: ResourceId,
    /// View format for formatted (texel) buffer access; `Unknown` for
    /// structured or raw access.
    pub format: Format,
    /// Temporal layer: 0 = current frame, 1 = previous frame, …
    pub temporal_layer: u32,
    /// Offset of the viewed range in bytes.
    pub offset: u64,
    /// Size of the viewed range in bytes ([`WHOLE_SIZE`] for the rest of the
    /// buffer).
    pub size_in_bytes: u64,
    /// Stride of a structured buffer view.
    pub stride: u32,
}

impl Default for BufferView {
    fn default() -> Self {
        Self::null()
    }
}

impl BufferView {
    /// The null buffer view.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            resource_id: RESOURCE_ID_INVALID,
            format: Format::Unknown,
            temporal_layer: 0,
            offset: 0,
            size_in_bytes: WHOLE_SIZE,
            stride: 0,
        }
    }

    /// Creates a whole-buffer view.
    #[must_use]
    pub const fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            ..Self::null()
        }
    }

    /// Sets the view format.
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the temporal layer.
    #[must_use]
    pub const fn with_temporal_layer(mut self, layer: u32) -> Self {
        self.temporal_layer = layer;
        self
    }

    /// Sets the viewed byte range.
    #[must_use]
    pub const fn with_range(mut self, offset: u64, size_in_bytes: u64) -> Self {
        self.offset = offset;
        self.size_in_bytes = size_in_bytes;
        self
    }

    /// Returns `true` if the view references no resource.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.resource_id == RESOURCE_ID_INVALID
    }
}
