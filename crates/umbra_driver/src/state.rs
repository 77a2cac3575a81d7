//! GPU state object descriptors
//!
//! Descriptors are plain data and hash by content, so equal descriptors can
//! share a single driver state object. Float fields hash by bit pattern.

use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// Face culling mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull back faces (default)
    #[default]
    Back,
    /// Cull front faces (used for shadow mapping)
    Front,
}

/// Depth comparison function
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunc {
    Never,
    Less,
    #[default]
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    Always,
}

/// Blend factor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    SrcColor,
}

/// Blend state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendStateDesc {
    pub enabled: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    /// RGBA write mask, bit 0 = red
    pub write_mask: u8,
}

impl Default for BlendStateDesc {
    fn default() -> Self {
        Self::opaque()
    }
}

impl BlendStateDesc {
    /// Blending disabled, all channels written
    pub const fn opaque() -> Self {
        Self {
            enabled: false,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            write_mask: 0b1111,
        }
    }

    /// Additive blending
    pub const fn additive() -> Self {
        Self {
            enabled: true,
            src: BlendFactor::One,
            dst: BlendFactor::One,
            write_mask: 0b1111,
        }
    }

    /// Standard alpha blending
    pub const fn alpha() -> Self {
        Self {
            enabled: true,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            write_mask: 0b1111,
        }
    }

    /// Modulate the destination (used by the AO resolve)
    pub const fn modulate() -> Self {
        Self {
            enabled: true,
            src: BlendFactor::DstColor,
            dst: BlendFactor::Zero,
            write_mask: 0b0111,
        }
    }
}

/// Depth-stencil state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthStencilStateDesc {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunc,
    pub stencil_test: bool,
    pub stencil_ref: u8,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunc::LessEqual,
            stencil_test: false,
            stencil_ref: 0,
        }
    }
}

impl DepthStencilStateDesc {
    /// Depth fully disabled, used by screen-space passes
    pub const fn disabled() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare: CompareFunc::Always,
            stencil_test: false,
            stencil_ref: 0,
        }
    }

    /// Depth write only, used while filling shadow maps
    pub const fn write_only() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunc::Less,
            stencil_test: false,
            stencil_ref: 0,
        }
    }
}

/// Rasterizer state
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RasterizerStateDesc {
    pub cull: CullMode,
    /// Constant depth bias
    pub depth_bias: f32,
    /// Slope-scaled depth bias
    pub slope_bias: f32,
    pub scissor: bool,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            depth_bias: 0.0,
            slope_bias: 0.0,
            scissor: false,
        }
    }
}

impl RasterizerStateDesc {
    /// Shadow fill rasterizer with bias
    pub fn shadow(cull: CullMode, depth_bias: f32, slope_bias: f32) -> Self {
        Self {
            cull,
            depth_bias,
            slope_bias,
            scissor: false,
        }
    }

    /// No culling, no bias; full screen quads
    pub fn screen() -> Self {
        Self {
            cull: CullMode::None,
            ..Default::default()
        }
    }
}

impl PartialEq for RasterizerStateDesc {
    fn eq(&self, other: &Self) -> bool {
        self.cull == other.cull
            && self.depth_bias.to_bits() == other.depth_bias.to_bits()
            && self.slope_bias.to_bits() == other.slope_bias.to_bits()
            && self.scissor == other.scissor
    }
}

impl Eq for RasterizerStateDesc {}

impl Hash for RasterizerStateDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cull.hash(state);
        self.depth_bias.to_bits().hash(state);
        self.slope_bias.to_bits().hash(state);
        self.scissor.hash(state);
    }
}

/// Any GPU state object descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateDesc {
    Blend(BlendStateDesc),
    DepthStencil(DepthStencilStateDesc),
    Rasterizer(RasterizerStateDesc),
}

/// Handle to a driver-created state object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateHandle(pub u64);

/// The three state objects bound for one draw
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineStates {
    pub blend: Option<StateHandle>,
    pub depth_stencil: Option<StateHandle>,
    pub rasterizer: Option<StateHandle>,
}
