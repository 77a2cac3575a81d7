//! GPU state object cache
//!
//! State objects are memoized by descriptor content. Two passes asking for
//! an identical blend, depth-stencil or rasterizer descriptor receive the
//! same [`StateHandle`] and the driver is only called once.
//!
//! The cache sits behind a `parking_lot::Mutex` so it can be shared by
//! reference between the lighting generators and the post-process stages.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use umbra_core::DriverResult;

use crate::driver::RenderDriver;
use crate::state::{
    BlendStateDesc, DepthStencilStateDesc, PipelineStates, RasterizerStateDesc, StateDesc, StateHandle,
};

/// Cache statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl StateCacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<StateDesc, StateHandle>,
    hits: u64,
    misses: u64,
}

/// Content-keyed state object cache
#[derive(Debug, Default)]
pub struct StateCache {
    inner: Mutex<Inner>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for `desc`, creating it on first use
    pub fn get_or_create(&self, driver: &mut dyn RenderDriver, desc: &StateDesc) -> DriverResult<StateHandle> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.states.get(desc).copied() {
            inner.hits += 1;
            return Ok(handle);
        }

        let handle = driver.create_state(desc)?;
        inner.misses += 1;
        inner.states.insert(*desc, handle);
        log::trace!("state cache miss: {:?} -> {:?}", desc, handle);
        Ok(handle)
    }

    /// Resolve the three state objects for one draw
    pub fn pipeline(
        &self,
        driver: &mut dyn RenderDriver,
        blend: BlendStateDesc,
        depth_stencil: DepthStencilStateDesc,
        rasterizer: RasterizerStateDesc,
    ) -> DriverResult<PipelineStates> {
        Ok(PipelineStates {
            blend: Some(self.get_or_create(driver, &StateDesc::Blend(blend))?),
            depth_stencil: Some(self.get_or_create(driver, &StateDesc::DepthStencil(depth_stencil))?),
            rasterizer: Some(self.get_or_create(driver, &StateDesc::Rasterizer(rasterizer))?),
        })
    }

    pub fn contains(&self, desc: &StateDesc) -> bool {
        self.inner.lock().states.contains_key(desc)
    }

    pub fn stats(&self) -> StateCacheStats {
        let inner = self.inner.lock();
        StateCacheStats {
            entries: inner.states.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// Forget every handle (device reset)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.states.clear();
        inner.hits = 0;
        inner.misses = 0;
    }
}
