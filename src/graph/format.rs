//! Pixel Formats
//!
//! A trimmed format enumeration carrying exactly what the compiler computes
//! with: texel sizes for formatted-buffer render targets and depth / stencil
//! aspect queries for subresource-range derivation. Backends own the full
//! format truth (tiling, feature support, plane layouts).

/// Platform-independent resource formats.
///
/// `Unknown` means the format is inherited from the resource or the view does
/// not require one (e.g. structured buffers).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Format {
    /// Format is unspecified / inherited.
    #[default]
    Unknown,

    // 8-bit
    /// Single 8-bit unsigned-normalized channel.
    R8Unorm,
    /// Two 8-bit unsigned-normalized channels.
    Rg8Unorm,
    /// Four 8-bit unsigned-normalized channels.
    Rgba8Unorm,
    /// Four 8-bit unsigned-normalized channels, sRGB encoded.
    Rgba8UnormSrgb,
    /// Four 8-bit unsigned-normalized channels, BGRA order.
    Bgra8Unorm,

    // 16-bit
    /// Single 16-bit float channel.
    R16Float,
    /// Two 16-bit float channels.
    Rg16Float,
    /// Four 16-bit float channels.
    Rgba16Float,
    /// Single 16-bit unsigned-integer channel.
    R16Uint,

    // 32-bit
    /// Single 32-bit float channel.
    R32Float,
    /// Single 32-bit unsigned-integer channel.
    R32Uint,
    /// Two 32-bit float channels.
    Rg32Float,
    /// Four 32-bit float channels.
    Rgba32Float,
    /// Packed 10-10-10-2 unsigned-normalized.
    Rgb10A2Unorm,
    /// Packed 11-11-10 float.
    Rg11B10Float,

    // Depth / stencil
    /// 16-bit unsigned-normalized depth.
    D16Unorm,
    /// 32-bit float depth.
    D32Float,
    /// 24-bit unsigned-normalized depth with 8-bit stencil.
    D24UnormS8Uint,
    /// 32-bit float depth with 8-bit stencil (and 24 unused bits).
    D32FloatS8X24Uint,
}

impl Format {
    /// Size of one element (texel) in bytes, or 0 for `Unknown`.
    #[must_use]
    pub const fn element_bytes(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float | Self::R16Uint | Self::D16Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Rg16Float
            | Self::R32Float
            | Self::R32Uint
            | Self::Rgb10A2Unorm
            | Self::Rg11B10Float
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::D32FloatS8X24Uint => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Returns `true` if the format has a depth aspect.
    #[must_use]
    pub const fn has_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8X24Uint
        )
    }

    /// Returns `true` if the format has a stencil aspect.
    #[must_use]
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8X24Uint)
    }

    /// Returns `true` if the format has a depth or stencil aspect.
    #[must_use]
    pub const fn is_depth_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    /// The full aspect mask of the format under the two-aspect model:
    /// bit 0 is color-or-depth, bit 1 is stencil.
    #[must_use]
    pub const fn aspect_mask(self) -> u32 {
        if self.has_stencil() { 0b11 } else { 0b01 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_stencil_classification() {
        assert!(Format::D32Float.has_depth());
        assert!(!Format::D32Float.has_stencil());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(!Format::Rgba8Unorm.is_depth_stencil());
    }

    #[test]
    fn aspect_masks() {
        assert_eq!(Format::Rgba8Unorm.aspect_mask(), 0b01);
        assert_eq!(Format::D32Float.aspect_mask(), 0b01);
        assert_eq!(Format::D24UnormS8Uint.aspect_mask(), 0b11);
    }

    #[test]
    fn unknown_has_zero_element_size() {
        assert_eq!(Format::Unknown.element_bytes(), 0);
        assert_eq!(Format::Rgba16Float.element_bytes(), 8);
    }
}
