//! # umbra_post - Image Processing Chain
//!
//! Screen-space post-process stages that run after the lighting pipeline
//! and turn the lit HDR scene into the final composite.
//!
//! # Architecture
//!
//! - **Stage**: the [`PostStage`] trait; a stage declares its frame inputs
//!   and writes exactly one output
//! - **Chain**: [`PostChain`] runs enabled stages in order, alternating
//!   between two ping-pong targets
//! - **State cache**: full-screen passes resolve their blend, depth-stencil
//!   and rasterizer objects through the shared [`StateCache`]
//! - **Built-in**: blur, tone-map, motion blur, ambient occlusion,
//!   antialiasing, depth of field, glare
//!
//! # Usage
//!
//! ```ignore
//! use umbra_post::prelude::*;
//!
//! let mut chain = PostChain::with_default_stages();
//! let frame = FrameSurfaces::new(scene_color)
//!     .with_depth(depth)
//!     .with_normal(normals)
//!     .with_velocity(velocity);
//!
//! let report = chain.execute(&mut driver, lighting.state_cache(), &frame, (1920, 1080), dt)?;
//! present(report.output);
//! ```

pub mod builtin;
pub mod chain;
pub mod error;
pub mod stage;
pub mod state_cache;

pub use chain::{ChainReport, ChainStats, PostChain, WORK_DIVISOR};
pub use error::{PostError, PostResult};
pub use stage::{FrameSurfaces, PostConstants, PostStage, StageConfigData, StageContext, StageInput};
pub use state_cache::{screen_pipeline, StateCache, StateCacheStats};

/// Prelude for common imports
pub mod prelude {
    pub use crate::builtin::*;
    pub use crate::chain::{ChainReport, PostChain};
    pub use crate::error::{PostError, PostResult};
    pub use crate::stage::{FrameSurfaces, PostStage, StageContext, StageInput};
    pub use crate::state_cache::StateCache;
}
