//! Render driver contract
//!
//! The lighting pipeline never talks to a graphics API directly. Everything
//! it needs from the GPU goes through [`RenderDriver`]:
//!
//! - surface creation and destruction
//! - GPU state object creation
//! - draw submission
//! - constant buffer upload
//!
//! # Example
//!
//! ```ignore
//! use umbra_driver::*;
//!
//! let mut driver = RecordingDriver::new();
//! let surface = driver.create_surface(&SurfaceDesc::square(
//!     1024,
//!     SurfaceFormat::Depth32Float,
//!     SurfaceUsage::DepthMap,
//! ))?;
//! driver.submit(&DrawSubmission::new(PassKind::ShadowFill).with_target(surface))?;
//! ```

use serde::{Deserialize, Serialize};
use umbra_core::{DriverResult, SurfaceHandle};

use crate::format::{SurfaceDesc, SurfaceFormat};
use crate::state::{PipelineStates, StateDesc, StateHandle};

/// Kind of GPU pass being submitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassKind {
    /// Render casters into a shadow face / cascade
    ShadowFill,
    /// Render casters into a reflective shadow map face
    ReflectiveFill,
    /// Pack depth + normal into a single target
    PackDepthNormal,
    /// Filter pass over a statistics shadow map
    ShadowFilter,
    /// Screen-space post-process stage
    PostProcess,
    /// Plain copy
    Copy,
}

/// One draw submission
#[derive(Clone, Debug, PartialEq)]
pub struct DrawSubmission {
    pub pass: PassKind,
    /// Free-form label, useful in captures
    pub label: String,
    /// Surfaces written by the draw
    pub targets: Vec<SurfaceHandle>,
    /// Surfaces sampled by the draw
    pub sources: Vec<SurfaceHandle>,
    /// Array layer written (cube face, cascade index)
    pub layer: u32,
    /// View-projection used by the pass (column-major)
    pub view_projection: [[f32; 4]; 4],
    /// Near / far clip range
    pub clip_range: [f32; 2],
    pub states: PipelineStates,
}

impl DrawSubmission {
    pub fn new(pass: PassKind) -> Self {
        Self {
            pass,
            label: String::new(),
            targets: Vec::new(),
            sources: Vec::new(),
            layer: 0,
            view_projection: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            clip_range: [0.0, 1.0],
            states: PipelineStates::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_target(mut self, target: SurfaceHandle) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_source(mut self, source: SurfaceHandle) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_view_projection(mut self, matrix: [[f32; 4]; 4], clip_range: [f32; 2]) -> Self {
        self.view_projection = matrix;
        self.clip_range = clip_range;
        self
    }

    pub fn with_states(mut self, states: PipelineStates) -> Self {
        self.states = states;
        self
    }
}

/// Constant buffer slots consumed by shading passes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstantSlot {
    /// Global lighting system terms
    LightingSystem,
    /// Per-light terms (array)
    Lights,
    /// Shadow sampling terms (array)
    Shadow,
    /// Radiance grid terms
    Grid,
    /// Image processing terms
    ImageProcessing,
}

/// Render driver abstraction supplied by the host renderer.
///
/// Implementations must be usable from the thread that owns the pipeline;
/// the lighting code issues every call serially.
pub trait RenderDriver {
    /// Create a surface
    fn create_surface(&mut self, desc: &SurfaceDesc) -> DriverResult<SurfaceHandle>;

    /// Destroy a surface. Destroying an unknown handle is an error.
    fn destroy_surface(&mut self, surface: SurfaceHandle) -> DriverResult<()>;

    /// Check whether a format can be rendered to and sampled
    fn supports_format(&self, format: SurfaceFormat) -> bool;

    /// Create a state object
    fn create_state(&mut self, desc: &StateDesc) -> DriverResult<StateHandle>;

    /// Submit a draw
    fn submit(&mut self, submission: &DrawSubmission) -> DriverResult<()>;

    /// Upload constant data to a slot
    fn upload_constants(&mut self, slot: ConstantSlot, data: &[u8]) -> DriverResult<()>;
}
