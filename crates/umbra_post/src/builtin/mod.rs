//! Built-in post-process stages
//!
//! | Stage | Name | Inputs | Work surface |
//! |-------|------|--------|--------------|
//! | [`AmbientOcclusionStage`] | `ao` | depth, normal | yes |
//! | [`DepthOfFieldStage`] | `dof` | depth | yes |
//! | [`MotionBlurStage`] | `motion_blur` | velocity | no |
//! | [`GlareStage`] | `glare` | | yes |
//! | [`ToneMapStage`] | `tonemap` | | no |
//! | [`AntialiasStage`] | `aa` | previous color, velocity (temporal) | no |
//! | [`GaussianBlurStage`] | `blur` | | yes |

mod aa;
mod ao;
mod blur;
mod dof;
mod glare;
mod motion_blur;
mod tonemap;

pub use aa::{AntialiasConfig, AntialiasMode, AntialiasStage};
pub use ao::{hemisphere_kernel, AmbientOcclusionConfig, AmbientOcclusionStage};
pub use blur::{gaussian_weights, BlurConfig, GaussianBlurStage};
pub use dof::{DepthOfFieldConfig, DepthOfFieldStage};
pub use glare::{GlareConfig, GlareStage};
pub use motion_blur::{MotionBlurConfig, MotionBlurStage};
pub use tonemap::{ToneMapConfig, ToneMapOperator, ToneMapStage};
