//! # umbra_lighting - Dynamic Lighting & Shadow Pipeline
//!
//! Per-frame light visibility, shadow map generation under a GPU memory
//! budget, and time-sliced indirect lighting through a spherical harmonic
//! radiance grid.
//!
//! # Architecture
//!
//! - **Pool**: budgeted leasing of shadow-capable surfaces
//! - **Settings**: three-tier shadow settings (system, light, LOD)
//! - **Light**: light shapes, LOD and visibility, shadow frustums
//! - **Generator**: per-light state machine that fills shadow or reflective maps
//! - **Grid**: radiance grid and its resumable task queue
//! - **Manager**: [`LightingContext`], which drives everything once per frame
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | LOD / visibility | `light` | [`LightLod`], face masks |
//! | Shadows | `generator` | [`GeneratorOutput`] leases |
//! | Indirect | `grid` | SH radiance per cell |
//! | Constants | `constants` | GPU-ready buffers |
//!
//! # Usage
//!
//! ```ignore
//! use umbra_lighting::prelude::*;
//!
//! let mut lighting = LightingContext::new(LightingConfig::default());
//! let spot = lighting.add_light(Light::spot("key", pos, dir, 20.0, 0.6));
//!
//! // Each frame
//! let report = lighting.update(dt, &FrameInputs::new(&camera, &scene), &mut driver);
//! ```

pub mod cascade;
pub mod config;
pub mod constants;
pub mod events;
pub mod generator;
pub mod grid;
pub mod light;
pub mod manager;
pub mod math;
pub mod pool;
pub mod scene;
pub mod scratch;
pub mod settings;
pub mod sh;
pub mod states;
pub mod tasks;

pub use config::LightingConfig;
pub use constants::{GridConstants, LightConstants, LightingSystemConstants, ShadowConstants};
pub use events::{EventQueue, EventSender, LightingEvent};
pub use generator::{
    GeneratorContext, GeneratorOutput, GeneratorState, GeneratorVariant, RsmSample, ShadowGenerator,
    ShadowGeneratorOperation,
};
pub use grid::{DrainReport, GridBudget, RadianceGrid, RadianceGridConfig, RsmSource};
pub use light::{
    Attenuation, FrustumContext, Light, LightColor, LightKind, LightLod, LightShape, LodDistances, LodThresholds,
    ShadowFrustum,
};
pub use manager::{FrameReport, LightRuntime, LightingContext, ShadowStatus};
pub use pool::{PoolConfig, PoolHandle, PoolRequest, PoolStats, ResourcePool};
pub use scene::{CameraView, EmptyScene, FrameInputs, GroundPlane, SceneQuery, SurfaceHit};
pub use scratch::{ScratchBuffers, ScratchLease};
pub use settings::{
    generate_shadow_settings, validate_shadow_settings, FilterQuality, LodOverride, LodTier, ShadowMethod,
    ShadowMethodFlags, ShadowSettings, ShadowSettingsLight, ShadowSettingsLod, ShadowSettingsSystem,
    ShadowSettingsTable, UpdateRate,
};
pub use sh::Sh9;
pub use states::LightingSystemStates;
pub use tasks::{IndirectLightingTask, IndirectTaskKind, IndirectTaskQueue};

pub use umbra_core::{LightId, LightingError, LightingResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::LightingConfig;
    pub use crate::events::LightingEvent;
    pub use crate::light::{Light, LightColor, LightKind};
    pub use crate::manager::{FrameReport, LightingContext, ShadowStatus};
    pub use crate::scene::{CameraView, FrameInputs, SceneQuery};
    pub use crate::settings::{LodTier, ShadowMethodFlags, UpdateRate};
    pub use umbra_core::prelude::*;
}
