//! Surface formats and descriptors

use serde::{Deserialize, Serialize};

/// Pixel formats a driver may be asked to allocate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SurfaceFormat {
    /// Depth 16-bit unorm
    Depth16,
    /// Depth 24 + Stencil 8
    Depth24Stencil8,
    /// Depth 32-bit float
    Depth32Float,
    /// R8 unorm (single channel)
    R8Unorm,
    /// RG8 unorm
    Rg8Unorm,
    /// RGBA 8-bit unorm
    Rgba8Unorm,
    /// RGB10 A2 unorm, used for packed normals
    Rgb10A2Unorm,
    /// R16 float
    R16Float,
    /// RG16 float
    Rg16Float,
    /// RGBA 16-bit float
    Rgba16Float,
    /// R32 float
    R32Float,
    /// RG32 float
    Rg32Float,
    /// RGBA 32-bit float
    Rgba32Float,
}

impl SurfaceFormat {
    /// Bytes per texel
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Depth16 | Self::Rg8Unorm | Self::R16Float => 2,
            Self::Depth24Stencil8
            | Self::Depth32Float
            | Self::Rgba8Unorm
            | Self::Rgb10A2Unorm
            | Self::Rg16Float
            | Self::R32Float => 4,
            Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Number of color channels (depth formats report 1)
    pub fn channels(self) -> u32 {
        match self {
            Self::Depth16
            | Self::Depth24Stencil8
            | Self::Depth32Float
            | Self::R8Unorm
            | Self::R16Float
            | Self::R32Float => 1,
            Self::Rg8Unorm | Self::Rg16Float | Self::Rg32Float => 2,
            Self::Rgba8Unorm | Self::Rgb10A2Unorm | Self::Rgba16Float | Self::Rgba32Float => 4,
        }
    }

    /// Bits of precision per channel
    pub fn precision(self) -> u32 {
        match self {
            Self::R8Unorm | Self::Rg8Unorm | Self::Rgba8Unorm => 8,
            Self::Rgb10A2Unorm => 10,
            Self::Depth16 | Self::R16Float | Self::Rg16Float | Self::Rgba16Float => 16,
            Self::Depth24Stencil8 => 24,
            Self::Depth32Float | Self::R32Float | Self::Rg32Float | Self::Rgba32Float => 32,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth24Stencil8 | Self::Depth32Float)
    }

    /// Best depth format for a requested precision.
    ///
    /// Tries the exact precision first, then higher precisions. Returns
    /// `None` when the driver supports none of them.
    pub fn best_depth(precision: u32, supported: impl Fn(SurfaceFormat) -> bool) -> Option<Self> {
        const DEPTH: [SurfaceFormat; 3] = [
            SurfaceFormat::Depth16,
            SurfaceFormat::Depth24Stencil8,
            SurfaceFormat::Depth32Float,
        ];
        DEPTH
            .iter()
            .copied()
            .filter(|f| f.precision() >= precision)
            .find(|f| supported(*f))
    }

    /// Best color render target format for a precision and channel count.
    ///
    /// Prefers the smallest format that satisfies both, so a 2 channel
    /// 16-bit request falls back to RGBA16 before RG32.
    pub fn best_render_target(
        precision: u32,
        channels: u32,
        supported: impl Fn(SurfaceFormat) -> bool,
    ) -> Option<Self> {
        const COLOR: [SurfaceFormat; 9] = [
            SurfaceFormat::R8Unorm,
            SurfaceFormat::Rg8Unorm,
            SurfaceFormat::Rgba8Unorm,
            SurfaceFormat::R16Float,
            SurfaceFormat::Rg16Float,
            SurfaceFormat::Rgba16Float,
            SurfaceFormat::R32Float,
            SurfaceFormat::Rg32Float,
            SurfaceFormat::Rgba32Float,
        ];
        let precision = precision.max(8);
        COLOR
            .iter()
            .copied()
            .filter(|f| f.precision() >= precision && f.channels() >= channels)
            .find(|f| supported(*f))
    }
}

/// What a surface is used for. Mirrors the channels a shadow generator or
/// post-process stage asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SurfaceUsage {
    /// Write-only depth-stencil used while filling a statistics target
    DepthStencil,
    /// Readable depth map
    DepthMap,
    /// Reflective color (flux) channel
    ColorMap,
    /// Moments for VSM / ESM / EVSM
    StatisticsMap,
    /// Surface normals for reflective shadow maps
    NormalMap,
    /// Depth and normal packed into one target
    DepthNormalMap,
    /// Edge / depth extents mask
    EdgeMap,
    /// Generic render target (scratch, post-process)
    RenderTarget,
}

/// Full description of a surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    /// Array layers (6 for cube faces, N for cascades)
    pub layers: u32,
    pub format: SurfaceFormat,
    pub usage: SurfaceUsage,
}

impl SurfaceDesc {
    /// Square single-layer surface
    pub fn square(resolution: u32, format: SurfaceFormat, usage: SurfaceUsage) -> Self {
        Self {
            width: resolution,
            height: resolution,
            layers: 1,
            format,
            usage,
        }
    }

    /// Set layer count
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }

    /// GPU memory footprint in bytes
    pub fn byte_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.layers.max(1) as u64
            * self.format.bytes_per_pixel() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        let desc = SurfaceDesc::square(512, SurfaceFormat::Depth32Float, SurfaceUsage::DepthMap);
        assert_eq!(desc.byte_size(), 512 * 512 * 4);

        let cube = SurfaceDesc::square(1024, SurfaceFormat::Depth16, SurfaceUsage::DepthMap).with_layers(6);
        assert_eq!(cube.byte_size(), 1024 * 1024 * 2 * 6);
    }

    #[test]
    fn test_best_depth_falls_back_upward() {
        let only_32 = |f: SurfaceFormat| f == SurfaceFormat::Depth32Float;
        assert_eq!(SurfaceFormat::best_depth(16, only_32), Some(SurfaceFormat::Depth32Float));
        assert_eq!(SurfaceFormat::best_depth(24, |_| true), Some(SurfaceFormat::Depth24Stencil8));
        assert_eq!(SurfaceFormat::best_depth(16, |_| false), None);
    }

    #[test]
    fn test_best_render_target_channels() {
        let all = |_: SurfaceFormat| true;
        assert_eq!(SurfaceFormat::best_render_target(16, 2, all), Some(SurfaceFormat::Rg16Float));
        assert_eq!(SurfaceFormat::best_render_target(32, 4, all), Some(SurfaceFormat::Rgba32Float));
        assert_eq!(SurfaceFormat::best_render_target(8, 3, all), Some(SurfaceFormat::Rgba8Unorm));

        let no_rg16 = |f: SurfaceFormat| f != SurfaceFormat::Rg16Float;
        assert_eq!(SurfaceFormat::best_render_target(16, 2, no_rg16), Some(SurfaceFormat::Rgba16Float));
    }

    #[test]
    fn test_format_properties() {
        assert!(SurfaceFormat::Depth24Stencil8.is_depth());
        assert!(!SurfaceFormat::R32Float.is_depth());
        assert_eq!(SurfaceFormat::Rgba16Float.channels(), 4);
        assert_eq!(SurfaceFormat::Rg32Float.bytes_per_pixel(), 8);
    }
}
