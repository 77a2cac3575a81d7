//! Shared state objects for full-screen passes
//!
//! Every post-process pass draws a screen triangle with depth testing off,
//! so stages only differ in blend state. The [`StateCache`] is shared with
//! the lighting pipeline and hands back the same handles for identical
//! descriptors.

pub use umbra_driver::{StateCache, StateCacheStats};

use umbra_driver::{
    BlendStateDesc, DepthStencilStateDesc, DriverResult, PipelineStates, RasterizerStateDesc, RenderDriver,
};

/// Resolve the pipeline states for a screen-space pass
pub fn screen_pipeline(
    cache: &StateCache,
    driver: &mut dyn RenderDriver,
    blend: BlendStateDesc,
    depth_stencil: DepthStencilStateDesc,
) -> DriverResult<PipelineStates> {
    cache.pipeline(driver, blend, depth_stencil, RasterizerStateDesc::screen())
}
