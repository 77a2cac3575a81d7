//! # umbra_core - Lighting Pipeline Core
//!
//! Small shared vocabulary used by every other Umbra crate:
//! - **Ids**: generational light identifiers and surface handles
//! - **Errors**: the lighting error taxonomy and its recovery classes
//! - **Frames**: a monotonic frame clock driven by `update(frame_time)`

pub mod error;
pub mod frame;
pub mod id;

pub use error::*;
pub use frame::*;
pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{DriverError, DriverResult, ErrorClass, LightingError, LightingResult};
    pub use crate::frame::{FrameClock, FrameId};
    pub use crate::id::{LightId, LightIdAllocator, SurfaceHandle};
}
