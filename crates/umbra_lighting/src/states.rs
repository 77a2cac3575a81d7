//! Per-frame lighting system flags

use serde::{Deserialize, Serialize};
use umbra_core::FrameId;

use crate::settings::LodTier;

/// Aggregate flags refreshed at the start of every update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightingSystemStates {
    /// Dynamic shadows are generated
    pub dynamics_enabled: bool,
    /// The radiance grid is updated and sampled
    pub indirect_active: bool,
    pub shadow_detail_level: i32,
    pub indirect_detail_level: i32,
    /// Lights below this tier never reach a generator
    pub min_visible_tier: LodTier,
    pub frame: FrameId,
    /// A detail level changed during the current frame
    #[serde(skip)]
    pub detail_changed: bool,
}

impl Default for LightingSystemStates {
    fn default() -> Self {
        Self {
            dynamics_enabled: true,
            indirect_active: false,
            shadow_detail_level: 0,
            indirect_detail_level: 0,
            min_visible_tier: LodTier::Low,
            frame: 0,
            detail_changed: false,
        }
    }
}

impl LightingSystemStates {
    /// Start a new frame
    pub fn reset(&mut self, frame: FrameId) {
        self.frame = frame;
        self.detail_changed = false;
    }

    /// Apply new detail levels. Returns true when either changed.
    pub fn set_detail_levels(&mut self, shadow: i32, indirect: i32) -> bool {
        let changed = shadow != self.shadow_detail_level || indirect != self.indirect_detail_level;
        self.shadow_detail_level = shadow;
        self.indirect_detail_level = indirect;
        self.detail_changed |= changed;
        changed
    }

    /// Whether a light at `tier` is detailed enough to be shadowed.
    /// The dynamics switch is checked separately.
    pub fn admits(&self, tier: LodTier) -> bool {
        tier != LodTier::Off && tier >= self.min_visible_tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_change_flag() {
        let mut states = LightingSystemStates::default();
        assert!(states.set_detail_levels(2, 0));
        assert!(!states.set_detail_levels(2, 0));
        assert!(states.detail_changed);
        states.reset(5);
        assert!(!states.detail_changed);
        assert_eq!(states.frame, 5);
    }

    #[test]
    fn test_admits_by_tier() {
        let mut states = LightingSystemStates {
            min_visible_tier: LodTier::Medium,
            ..Default::default()
        };
        assert!(states.admits(LodTier::High));
        assert!(!states.admits(LodTier::Low));
        assert!(!states.admits(LodTier::Off));
        // Tier admission does not depend on the dynamics switch
        states.dynamics_enabled = false;
        assert!(states.admits(LodTier::High));
    }
}
