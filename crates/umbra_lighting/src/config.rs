//! Lighting context configuration
//!
//! Everything a scene needs to build a [`LightingContext`](crate::LightingContext),
//! loadable from JSON. Missing fields take their defaults.

use serde::{Deserialize, Serialize};
use umbra_core::{LightingError, LightingResult};

use crate::grid::RadianceGridConfig;
use crate::light::LodThresholds;
use crate::pool::PoolConfig;
use crate::settings::{LodTier, ShadowSettingsTable};

/// Top-level lighting configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub pool: PoolConfig,
    pub grid: RadianceGridConfig,
    pub shadow_settings: ShadowSettingsTable,
    pub lod_thresholds: LodThresholds,
    /// Lights below this tier are not shadowed
    pub min_visible_tier: LodTier,
    pub shadow_detail_level: i32,
    pub indirect_detail_level: i32,
    pub dynamics_enabled: bool,
    pub indirect_enabled: bool,
    /// Bounded event queue size
    pub event_capacity: usize,
    /// Worker threads for LOD scoring (0 = available parallelism)
    pub worker_threads: usize,
    /// Scene ambient term (linear RGB)
    pub ambient: [f32; 3],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            grid: RadianceGridConfig::default(),
            shadow_settings: ShadowSettingsTable::default(),
            lod_thresholds: LodThresholds::default(),
            min_visible_tier: LodTier::Low,
            shadow_detail_level: 0,
            indirect_detail_level: 0,
            dynamics_enabled: true,
            indirect_enabled: false,
            event_capacity: 256,
            worker_threads: 0,
            ambient: [0.03, 0.03, 0.03],
        }
    }
}

impl LightingConfig {
    pub fn from_json(json: &str) -> LightingResult<Self> {
        let mut config: Self = serde_json::from_str(json)
            .map_err(|e| LightingError::invalid_settings("lighting config", e.to_string()))?;
        config.validate();
        Ok(config)
    }

    pub fn to_json(&self) -> LightingResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LightingError::invalid_settings("lighting config", e.to_string()))
    }

    /// Clamp to valid ranges
    pub fn validate(&mut self) {
        self.pool.validate();
        self.grid.validate();
        self.shadow_settings.normalize_range();
        self.event_capacity = self.event_capacity.clamp(1, 65536);
        self.worker_threads = self.worker_threads.min(64);
        if self.lod_thresholds.medium > self.lod_thresholds.high {
            std::mem::swap(&mut self.lod_thresholds.medium, &mut self.lod_thresholds.high);
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_grid(mut self, grid: RadianceGridConfig) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_shadow_settings(mut self, table: ShadowSettingsTable) -> Self {
        self.shadow_settings = table;
        self
    }

    pub fn with_min_visible_tier(mut self, tier: LodTier) -> Self {
        self.min_visible_tier = tier;
        self
    }

    pub fn with_indirect(mut self, enabled: bool) -> Self {
        self.indirect_enabled = enabled;
        self
    }

    /// Number of LOD scoring threads to use for `lights` lights
    pub fn worker_count(&self, lights: usize) -> usize {
        let available = if self.worker_threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            self.worker_threads
        };
        available.clamp(1, lights.max(1))
    }
}
