//! Scratch render targets
//!
//! Temporary surfaces used in the middle of the pipeline (filter
//! intermediates, resolve targets). A lease is only valid inside the update
//! that checked it out:
//!
//! - [`ScratchBuffers::begin_update`] opens an epoch
//! - [`ScratchBuffers::end_update`] forcibly reclaims anything still out and
//!   reports it as a leak
//! - leases from an older epoch are rejected
//!
//! Surfaces themselves are kept between updates and reused by descriptor.

use umbra_core::{LightingResult, SurfaceHandle};
use umbra_driver::{RenderDriver, SurfaceDesc};

/// A checked-out scratch surface. Not `Clone`: it must be handed back.
#[derive(Debug, PartialEq, Eq)]
pub struct ScratchLease {
    slot: usize,
    epoch: u64,
    surface: SurfaceHandle,
}

impl ScratchLease {
    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug)]
struct ScratchSlot {
    desc: SurfaceDesc,
    surface: SurfaceHandle,
    in_use: bool,
}

/// Scratch statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScratchStats {
    pub surfaces: usize,
    pub checkouts: u64,
    pub returns: u64,
    /// Leases reclaimed by `end_update`
    pub leaks: u64,
    /// Returns rejected for belonging to an older update
    pub rejected: u64,
}

/// Per-update scratch allocator
#[derive(Debug, Default)]
pub struct ScratchBuffers {
    slots: Vec<ScratchSlot>,
    epoch: u64,
    in_update: bool,
    stats: ScratchStats,
}

impl ScratchBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new update epoch
    pub fn begin_update(&mut self) {
        if self.in_update {
            self.end_update();
        }
        self.epoch += 1;
        self.in_update = true;
    }

    /// Close the epoch. Outstanding leases are reclaimed; returns how many.
    pub fn end_update(&mut self) -> usize {
        let mut leaked = 0;
        for slot in self.slots.iter_mut().filter(|s| s.in_use) {
            log::error!("scratch {} {:?} still checked out at end of update", slot.surface, slot.desc);
            slot.in_use = false;
            leaked += 1;
        }
        self.stats.leaks += leaked as u64;
        // Anything still held now belongs to a dead epoch
        self.epoch += 1;
        self.in_update = false;
        leaked
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Check out a surface matching `desc`
    pub fn checkout(&mut self, driver: &mut dyn RenderDriver, desc: SurfaceDesc) -> LightingResult<ScratchLease> {
        let slot = match self.slots.iter().position(|s| !s.in_use && s.desc == desc) {
            Some(slot) => slot,
            None => {
                let surface = driver.create_surface(&desc)?;
                self.slots.push(ScratchSlot {
                    desc,
                    surface,
                    in_use: false,
                });
                self.slots.len() - 1
            }
        };

        let entry = &mut self.slots[slot];
        entry.in_use = true;
        self.stats.checkouts += 1;
        Ok(ScratchLease {
            slot,
            epoch: self.epoch,
            surface: entry.surface,
        })
    }

    /// Hand a lease back. Leases from an older update are rejected.
    pub fn give_back(&mut self, lease: ScratchLease) -> bool {
        if lease.epoch != self.epoch {
            log::warn!("rejecting scratch {} from update epoch {} (now {})", lease.surface, lease.epoch, self.epoch);
            self.stats.rejected += 1;
            return false;
        }
        match self.slots.get_mut(lease.slot) {
            Some(slot) if slot.in_use && slot.surface == lease.surface => {
                slot.in_use = false;
                self.stats.returns += 1;
                true
            }
            _ => {
                self.stats.rejected += 1;
                false
            }
        }
    }

    /// Surface behind a lease, if the lease is still current
    pub fn surface(&self, lease: &ScratchLease) -> Option<SurfaceHandle> {
        (lease.epoch == self.epoch)
            .then(|| self.slots.get(lease.slot))
            .flatten()
            .filter(|slot| slot.in_use)
            .map(|slot| slot.surface)
    }

    /// Number of leases currently out
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    pub fn stats(&self) -> ScratchStats {
        ScratchStats {
            surfaces: self.slots.len(),
            ..self.stats
        }
    }

    /// Destroy every scratch surface
    pub fn clear(&mut self, driver: &mut dyn RenderDriver) -> LightingResult<()> {
        for slot in self.slots.drain(..) {
            driver.destroy_surface(slot.surface)?;
        }
        Ok(())
    }
}
