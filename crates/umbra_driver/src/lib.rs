//! # umbra_driver - Render Driver Contract
//!
//! Backend-agnostic description of what the lighting and post-process code
//! needs from a GPU, plus [`RecordingDriver`], an in-memory backend that
//! records every request.
//!
//! # Architecture
//!
//! - **Format**: surface formats, usages and descriptors with byte sizes
//! - **State**: blend / depth-stencil / rasterizer descriptors hashed by content
//! - **Cache**: content-keyed memoization of driver state objects
//! - **Driver**: the [`RenderDriver`] trait and draw submission type
//! - **Recording**: headless implementation used for tooling and tests

pub mod cache;
pub mod driver;
pub mod format;
pub mod recording;
pub mod state;

pub use cache::{StateCache, StateCacheStats};
pub use driver::{ConstantSlot, DrawSubmission, PassKind, RenderDriver};
pub use format::{SurfaceDesc, SurfaceFormat, SurfaceUsage};
pub use recording::{RecordingDriver, RecordingStats};
pub use state::{
    BlendFactor, BlendStateDesc, CompareFunc, CullMode, DepthStencilStateDesc, PipelineStates,
    RasterizerStateDesc, StateDesc, StateHandle,
};

pub use umbra_core::{DriverError, DriverResult, SurfaceHandle};
