//! Shadow Map Resource Pool
//!
//! Leases and recycles shadow-capable surfaces by resolution, format, usage
//! and layer count under a hard byte budget. The pool has no knowledge of
//! lighting semantics: owners are opaque [`LightId`]s.
//!
//! # Acquisition order
//!
//! 1. Free entry with the exact description
//! 2. Smallest larger free entry within `max_upsize_steps` doublings
//!    (off by default, so leases match the requested resolution)
//! 3. New surface if it fits the budget
//! 4. Reclaim (LRU free entries, then stale leases) and retry
//! 5. [`LightingError::PoolExhausted`]
//!
//! Entries stamped in the current frame are never reclaimed. Releasing or
//! revoking a lease bumps the entry generation so old handles stop resolving.

use std::fmt;

use serde::{Deserialize, Serialize};
use umbra_core::{FrameId, LightId, LightingError, LightingResult, SurfaceHandle};
use umbra_driver::{RenderDriver, SurfaceDesc, SurfaceFormat, SurfaceUsage};

/// Handle to a leased pool entry
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolHandle({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}v{}", self.index, self.generation)
    }
}

/// Pool configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard GPU memory budget in bytes
    pub budget_bytes: u64,
    /// Smallest resolution handed out
    pub min_resolution: u32,
    /// Largest resolution handed out
    pub max_resolution: u32,
    /// How many doublings above the request a free entry may be
    pub max_upsize_steps: u32,
    /// Leases untouched for this many frames may be revoked under pressure
    pub stale_frames: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 64 * 1024 * 1024,
            min_resolution: 64,
            max_resolution: 4096,
            max_upsize_steps: 0,
            stale_frames: 2,
        }
    }
}

impl PoolConfig {
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.budget_bytes = bytes;
        self
    }

    pub fn with_resolution_range(mut self, min: u32, max: u32) -> Self {
        self.min_resolution = min;
        self.max_resolution = max;
        self
    }

    pub fn with_upsize_steps(mut self, steps: u32) -> Self {
        self.max_upsize_steps = steps;
        self
    }

    /// Clamp to valid ranges
    pub fn validate(&mut self) {
        if self.min_resolution > self.max_resolution {
            std::mem::swap(&mut self.min_resolution, &mut self.max_resolution);
        }
        self.min_resolution = self.min_resolution.clamp(1, 16384).next_power_of_two();
        self.max_resolution = self
            .max_resolution
            .clamp(self.min_resolution, 16384)
            .next_power_of_two();
        self.max_upsize_steps = self.max_upsize_steps.min(4);
        self.stale_frames = self.stale_frames.max(1);
    }

    /// Clamp a requested resolution and round it up to a power of two
    pub fn clamp_resolution(&self, resolution: u32) -> u32 {
        let min = self.min_resolution.min(self.max_resolution);
        let max = self.max_resolution.max(self.min_resolution);
        resolution.clamp(min, max).next_power_of_two().min(max)
    }
}

/// What an owner asks the pool for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolRequest {
    pub owner: LightId,
    pub resolution: u32,
    pub format: SurfaceFormat,
    pub usage: SurfaceUsage,
    pub layers: u32,
}

impl PoolRequest {
    pub fn new(owner: LightId, resolution: u32, format: SurfaceFormat, usage: SurfaceUsage) -> Self {
        Self {
            owner,
            resolution,
            format,
            usage,
            layers: 1,
        }
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }
}

/// One pooled surface
#[derive(Clone, Debug, PartialEq)]
pub struct PoolEntry {
    pub desc: SurfaceDesc,
    pub surface: SurfaceHandle,
    /// Current lease holder
    pub owner: Option<LightId>,
    /// Last frame the entry was acquired or touched
    pub last_used: FrameId,
}

impl PoolEntry {
    #[inline]
    pub fn resolution(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.desc.byte_size()
    }

    fn matches(&self, request: &PoolRequest, resolution: u32) -> bool {
        self.desc.width == resolution
            && self.desc.format == request.format
            && self.desc.usage == request.usage
            && self.desc.layers == request.layers
    }
}

/// Pool statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub entries: usize,
    pub leased: usize,
    pub used_bytes: u64,
    /// Surfaces created through the driver
    pub created: u64,
    /// Surfaces destroyed through the driver
    pub destroyed: u64,
    /// Leases revoked from stale owners
    pub revoked: u64,
    /// Acquisitions served by an existing entry
    pub reused: u64,
    /// Acquisitions that failed with `PoolExhausted`
    pub exhausted: u64,
}

/// The shadow map resource pool
#[derive(Debug, Default)]
pub struct ResourcePool {
    config: PoolConfig,
    slots: Vec<Option<PoolEntry>>,
    /// Generations survive slot reuse so handles never alias
    generations: Vec<u32>,
    free_slots: Vec<u32>,
    pending_destroy: Vec<SurfaceHandle>,
    used_bytes: u64,
    frame: FrameId,
    stats: PoolStats,
}

impl ResourcePool {
    pub fn new(mut config: PoolConfig) -> Self {
        config.validate();
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Replace the configuration. Existing entries stay; the budget applies
    /// to future creations.
    pub fn reconfigure(&mut self, mut config: PoolConfig) {
        config.validate();
        self.config = config;
    }

    pub fn budget(&self) -> u64 {
        self.config.budget_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn available_bytes(&self) -> u64 {
        self.config.budget_bytes.saturating_sub(self.used_bytes)
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Begin a new frame
    pub fn begin_frame(&mut self, frame: FrameId) {
        self.frame = frame;
    }

    /// Lease a surface for `request.owner`
    pub fn acquire(
        &mut self,
        driver: &mut dyn RenderDriver,
        request: &PoolRequest,
    ) -> LightingResult<PoolHandle> {
        let resolution = self.config.clamp_resolution(request.resolution);
        let desc = SurfaceDesc {
            width: resolution,
            height: resolution,
            layers: request.layers.max(1),
            format: request.format,
            usage: request.usage,
        };
        let request = PoolRequest {
            layers: desc.layers,
            ..*request
        };
        let size = desc.byte_size();

        if let Some(index) = self.find_free(&request, resolution) {
            self.stats.reused += 1;
            return Ok(self.lease(index, request.owner));
        }

        if self.used_bytes + size > self.config.budget_bytes {
            self.reclaim_free(size);
        }
        if self.used_bytes + size > self.config.budget_bytes && self.revoke_stale() > 0 {
            if let Some(index) = self.find_free(&request, resolution) {
                self.stats.reused += 1;
                return Ok(self.lease(index, request.owner));
            }
            self.reclaim_free(size);
        }
        // Destruction is deferred to here so reclaim stays infallible
        self.flush_destroyed(driver)?;

        if self.used_bytes + size > self.config.budget_bytes {
            self.stats.exhausted += 1;
            log::debug!(
                "pool exhausted for {}: {} bytes requested, {} of {} available",
                request.owner,
                size,
                self.available_bytes(),
                self.config.budget_bytes
            );
            return Err(LightingError::PoolExhausted {
                requested: size,
                available: self.available_bytes(),
                budget: self.config.budget_bytes,
            });
        }

        let index = self.create(driver, desc)?;
        Ok(self.lease(index, request.owner))
    }

    /// Return a lease to the free list. Stale handles are ignored.
    pub fn release(&mut self, handle: PoolHandle) -> bool {
        let frame = self.frame;
        match self.entry_mut(handle) {
            Some(entry) => {
                entry.owner = None;
                entry.last_used = frame;
                self.bump_generation(handle.index);
                true
            }
            None => false,
        }
    }

    /// Release every lease held by `owner`
    pub fn release_owner(&mut self, owner: LightId) -> usize {
        let handles: Vec<PoolHandle> = self.leases_of(owner).collect();
        handles.into_iter().filter(|h| self.release(*h)).count()
    }

    /// Stamp a lease as used this frame
    pub fn touch(&mut self, handle: PoolHandle) -> bool {
        let frame = self.frame;
        match self.entry_mut(handle) {
            Some(entry) => {
                entry.last_used = frame;
                true
            }
            None => false,
        }
    }

    /// Resolve a live lease
    pub fn get(&self, handle: PoolHandle) -> Option<&PoolEntry> {
        let generation = *self.generations.get(handle.index as usize)?;
        if generation != handle.generation {
            return None;
        }
        self.slots
            .get(handle.index as usize)?
            .as_ref()
            .filter(|entry| entry.owner.is_some())
    }

    /// Driver surface behind a live lease
    pub fn surface(&self, handle: PoolHandle) -> Option<SurfaceHandle> {
        self.get(handle).map(|entry| entry.surface)
    }

    pub fn is_valid(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live leases held by `owner`
    pub fn leases_of(&self, owner: LightId) -> impl Iterator<Item = PoolHandle> + '_ {
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            let entry = slot.as_ref()?;
            (entry.owner == Some(owner)).then(|| PoolHandle {
                index: index as u32,
                generation: self.generations[index],
            })
        })
    }

    /// All entries, free and leased
    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.slots.iter().flatten()
    }

    /// Destroy free entries and revoke leases not used within `stale_frames`
    /// of `frame`. Returns how many entries were affected.
    pub fn evict_stale(&mut self, driver: &mut dyn RenderDriver, frame: FrameId) -> LightingResult<usize> {
        let stale = self.config.stale_frames;
        let mut affected = 0;

        for index in 0..self.slots.len() {
            let Some(entry) = self.slots[index].as_mut() else {
                continue;
            };
            if entry.last_used + stale >= frame {
                continue;
            }
            if entry.owner.is_some() {
                log::debug!("revoking stale lease {} from {:?}", index, entry.owner);
                entry.owner = None;
                self.stats.revoked += 1;
                self.bump_generation(index as u32);
            }
            self.mark_destroyed(index);
            affected += 1;
        }

        self.flush_destroyed(driver)?;
        Ok(affected)
    }

    /// Pre-create free entries (cached maps). Stops at the budget and
    /// returns how many were created.
    pub fn reserve(
        &mut self,
        driver: &mut dyn RenderDriver,
        desc: SurfaceDesc,
        count: u32,
    ) -> LightingResult<u32> {
        let resolution = self.config.clamp_resolution(desc.width);
        let desc = SurfaceDesc {
            width: resolution,
            height: resolution,
            layers: desc.layers.max(1),
            ..desc
        };
        let mut created = 0;
        for _ in 0..count {
            if self.used_bytes + desc.byte_size() > self.config.budget_bytes {
                log::warn!("cached map reservation stopped at {} of {}: budget reached", created, count);
                break;
            }
            self.create(driver, desc)?;
            created += 1;
        }
        Ok(created)
    }

    /// Destroy every entry (scene teardown)
    pub fn clear(&mut self, driver: &mut dyn RenderDriver) -> LightingResult<()> {
        for index in 0..self.slots.len() {
            if let Some(entry) = self.slots[index].as_ref() {
                if entry.owner.is_some() {
                    self.bump_generation(index as u32);
                }
                self.mark_destroyed(index);
            }
        }
        self.flush_destroyed(driver)
    }

    /// Current statistics
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.stats.clone();
        stats.entries = self.entries().count();
        stats.leased = self.entries().filter(|e| !e.is_free()).count();
        stats.used_bytes = self.used_bytes;
        stats
    }

    fn entry_mut(&mut self, handle: PoolHandle) -> Option<&mut PoolEntry> {
        let generation = *self.generations.get(handle.index as usize)?;
        if generation != handle.generation {
            return None;
        }
        self.slots
            .get_mut(handle.index as usize)?
            .as_mut()
            .filter(|entry| entry.owner.is_some())
    }

    fn bump_generation(&mut self, index: u32) {
        if let Some(generation) = self.generations.get_mut(index as usize) {
            *generation = generation.wrapping_add(1);
        }
    }

    fn find_free(&self, request: &PoolRequest, resolution: u32) -> Option<usize> {
        let free = || {
            self.slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| slot.as_ref().map(|entry| (index, entry)))
                .filter(|(_, entry)| entry.is_free())
        };

        if let Some((index, _)) = free().find(|(_, entry)| entry.matches(request, resolution)) {
            return Some(index);
        }

        (1..=self.config.max_upsize_steps)
            .filter_map(|step| resolution.checked_shl(step))
            .filter(|res| *res <= self.config.max_resolution)
            .find_map(|res| free().find(|(_, entry)| entry.matches(request, res)))
            .map(|(index, _)| index)
    }

    /// Destroy free entries in least-recently-used order until `needed`
    /// bytes fit. Entries stamped this frame are kept.
    fn reclaim_free(&mut self, needed: u64) {
        let mut candidates: Vec<(FrameId, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.as_ref()?;
                (entry.is_free() && entry.last_used < self.frame).then_some((entry.last_used, index))
            })
            .collect();
        candidates.sort_unstable();

        for (_, index) in candidates {
            if self.used_bytes + needed <= self.config.budget_bytes {
                break;
            }
            self.mark_destroyed(index);
        }
    }

    /// Revoke leases older than `stale_frames`. Returns how many were revoked.
    fn revoke_stale(&mut self) -> usize {
        let frame = self.frame;
        let stale = self.config.stale_frames;
        let mut revoked = 0;
        for index in 0..self.slots.len() {
            let Some(entry) = self.slots[index].as_mut() else {
                continue;
            };
            if entry.owner.is_some() && entry.last_used + stale < frame {
                log::debug!("revoking stale lease {} from {:?}", index, entry.owner);
                entry.owner = None;
                revoked += 1;
                self.bump_generation(index as u32);
            }
        }
        self.stats.revoked += revoked as u64;
        revoked
    }

    /// Unlink an entry; its surface is destroyed on the next flush
    fn mark_destroyed(&mut self, index: usize) {
        if let Some(entry) = self.slots[index].take() {
            self.used_bytes = self.used_bytes.saturating_sub(entry.byte_size());
            self.pending_destroy.push(entry.surface);
            self.free_slots.push(index as u32);
        }
    }

    fn flush_destroyed(&mut self, driver: &mut dyn RenderDriver) -> LightingResult<()> {
        let mut result = Ok(());
        for surface in self.pending_destroy.drain(..) {
            match driver.destroy_surface(surface) {
                Ok(()) => self.stats.destroyed += 1,
                Err(err) => {
                    log::warn!("failed to destroy pooled {}: {}", surface, err);
                    if result.is_ok() {
                        result = Err(err.into());
                    }
                }
            }
        }
        result
    }

    fn lease(&mut self, index: usize, owner: LightId) -> PoolHandle {
        let frame = self.frame;
        if let Some(entry) = self.slots[index].as_mut() {
            entry.owner = Some(owner);
            entry.last_used = frame;
        }
        PoolHandle {
            index: index as u32,
            generation: self.generations[index],
        }
    }

    fn create(&mut self, driver: &mut dyn RenderDriver, desc: SurfaceDesc) -> LightingResult<usize> {
        let surface = driver.create_surface(&desc)?;
        let entry = PoolEntry {
            desc,
            surface,
            owner: None,
            last_used: self.frame,
        };
        self.used_bytes += desc.byte_size();
        self.stats.created += 1;

        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(entry);
                index as usize
            }
            None => {
                self.slots.push(Some(entry));
                self.generations.push(0);
                self.slots.len() - 1
            }
        };
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_driver::RecordingDriver;

    const MIB: u64 = 1024 * 1024;

    fn depth(owner: u32, resolution: u32) -> PoolRequest {
        PoolRequest::new(
            LightId::new(owner, 0),
            resolution,
            SurfaceFormat::Depth32Float,
            SurfaceUsage::DepthMap,
        )
    }

    #[test]
    fn test_acquire_creates_exact_size() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default());
        let handle = pool.acquire(&mut driver, &depth(1, 1024)).unwrap();

        let entry = pool.get(handle).unwrap();
        assert_eq!(entry.resolution(), 1024);
        assert_eq!(entry.desc.format, SurfaceFormat::Depth32Float);
        assert_eq!(entry.owner, Some(LightId::new(1, 0)));
        assert_eq!(pool.used_bytes(), 4 * MIB);
        assert_eq!(driver.live_surface_count(), 1);
    }

    #[test]
    fn test_resolution_clamped_and_rounded() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_resolution_range(128, 1024));
        let a = pool.acquire(&mut driver, &depth(1, 300)).unwrap();
        let b = pool.acquire(&mut driver, &depth(2, 8)).unwrap();
        let c = pool.acquire(&mut driver, &depth(3, 5000)).unwrap();
        assert_eq!(pool.get(a).unwrap().resolution(), 512);
        assert_eq!(pool.get(b).unwrap().resolution(), 128);
        assert_eq!(pool.get(c).unwrap().resolution(), 1024);
    }

    #[test]
    fn test_release_reuses_entry() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default());
        let first = pool.acquire(&mut driver, &depth(1, 512)).unwrap();
        assert!(pool.release(first));
        assert!(pool.get(first).is_none());
        assert!(!pool.release(first));

        let second = pool.acquire(&mut driver, &depth(2, 512)).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_exact_match_by_default() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default());
        let big = pool.acquire(&mut driver, &depth(1, 1024)).unwrap();
        pool.release(big);

        let h = pool.acquire(&mut driver, &depth(2, 512)).unwrap();
        assert_eq!(pool.get(h).unwrap().resolution(), 512);
        assert_eq!(pool.stats().created, 2);
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn test_reversed_resolution_range_swapped() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_resolution_range(2048, 256));
        let h = pool.acquire(&mut driver, &depth(1, 4096)).unwrap();
        assert_eq!(pool.get(h).unwrap().resolution(), 2048);
        let h = pool.acquire(&mut driver, &depth(2, 16)).unwrap();
        assert_eq!(pool.get(h).unwrap().resolution(), 256);
    }

    #[test]
    fn test_upsize_within_steps() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_upsize_steps(1));
        let big = pool.acquire(&mut driver, &depth(1, 1024)).unwrap();
        pool.release(big);

        // One doubling away: reused
        let h = pool.acquire(&mut driver, &depth(2, 512)).unwrap();
        assert_eq!(pool.get(h).unwrap().resolution(), 1024);
        pool.release(h);

        // Two doublings away: new surface
        let h = pool.acquire(&mut driver, &depth(3, 256)).unwrap();
        assert_eq!(pool.get(h).unwrap().resolution(), 256);
        assert_eq!(pool.stats().created, 2);
    }

    #[test]
    fn test_leases_are_exclusive() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default());
        let handles: Vec<_> = (0..6).map(|i| pool.acquire(&mut driver, &depth(i, 256)).unwrap()).collect();
        let mut surfaces: Vec<_> = handles.iter().map(|h| pool.surface(*h).unwrap()).collect();
        surfaces.sort();
        surfaces.dedup();
        assert_eq!(surfaces.len(), 6);
    }

    #[test]
    fn test_exhausted_when_budget_full() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_budget(2 * MIB));
        pool.acquire(&mut driver, &depth(1, 512)).unwrap();
        pool.acquire(&mut driver, &depth(2, 512)).unwrap();

        let err = pool.acquire(&mut driver, &depth(3, 512)).unwrap_err();
        assert_eq!(
            err,
            LightingError::PoolExhausted {
                requested: MIB,
                available: 0,
                budget: 2 * MIB,
            }
        );
        assert_eq!(pool.stats().exhausted, 1);
    }

    #[test]
    fn test_reclaims_lru_free_entries() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_budget(2 * MIB));
        pool.begin_frame(1);
        let a = pool.acquire(&mut driver, &depth(1, 512)).unwrap();
        let b = pool.acquire(&mut driver, &depth(2, 512)).unwrap();
        pool.release(a);
        pool.release(b);

        // Different format cannot reuse; free entries from an older frame are destroyed
        pool.begin_frame(2);
        let request = PoolRequest::new(LightId::new(3, 0), 512, SurfaceFormat::R32Float, SurfaceUsage::StatisticsMap);
        pool.acquire(&mut driver, &request).unwrap();
        assert_eq!(pool.stats().destroyed, 1);
        assert_eq!(driver.live_surface_count(), 2);
    }

    #[test]
    fn test_entries_touched_this_frame_survive() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_budget(MIB));
        pool.begin_frame(5);
        let a = pool.acquire(&mut driver, &depth(1, 512)).unwrap();
        pool.release(a);

        let request = PoolRequest::new(LightId::new(2, 0), 512, SurfaceFormat::R32Float, SurfaceUsage::StatisticsMap);
        assert!(matches!(
            pool.acquire(&mut driver, &request),
            Err(LightingError::PoolExhausted { .. })
        ));
        assert_eq!(pool.stats().destroyed, 0);
    }

    #[test]
    fn test_stale_leases_revoked_under_pressure() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig {
            budget_bytes: MIB,
            stale_frames: 2,
            ..Default::default()
        });
        pool.begin_frame(1);
        let old = pool.acquire(&mut driver, &depth(1, 512)).unwrap();

        pool.begin_frame(10);
        let new = pool.acquire(&mut driver, &depth(2, 512)).unwrap();
        assert!(pool.get(old).is_none());
        assert_eq!(pool.get(new).unwrap().owner, Some(LightId::new(2, 0)));
        assert_eq!(pool.stats().revoked, 1);
    }

    #[test]
    fn test_touch_keeps_lease_fresh() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_budget(MIB));
        pool.begin_frame(1);
        let held = pool.acquire(&mut driver, &depth(1, 512)).unwrap();
        pool.begin_frame(10);
        assert!(pool.touch(held));
        assert!(pool.acquire(&mut driver, &depth(2, 512)).is_err());
        assert!(pool.get(held).is_some());
    }

    #[test]
    fn test_evict_stale() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default());
        pool.begin_frame(1);
        let a = pool.acquire(&mut driver, &depth(1, 256)).unwrap();
        let b = pool.acquire(&mut driver, &depth(2, 256)).unwrap();
        pool.release(b);
        pool.begin_frame(3);
        let c = pool.acquire(&mut driver, &depth(3, 64)).unwrap();

        let evicted = pool.evict_stale(&mut driver, 4).unwrap();
        assert_eq!(evicted, 2);
        assert!(pool.get(a).is_none());
        assert!(pool.get(c).is_some());
        assert_eq!(driver.live_surface_count(), 1);
    }

    #[test]
    fn test_reserve_and_release_owner() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default().with_budget(3 * MIB));
        let desc = SurfaceDesc::square(512, SurfaceFormat::Depth32Float, SurfaceUsage::DepthMap);
        assert_eq!(pool.reserve(&mut driver, desc, 5).unwrap(), 3);
        assert_eq!(pool.stats().entries, 3);

        let owner = LightId::new(7, 0);
        pool.acquire(&mut driver, &depth(7, 512)).unwrap();
        pool.acquire(&mut driver, &depth(7, 512)).unwrap();
        assert_eq!(pool.stats().created, 3);
        assert_eq!(pool.leases_of(owner).count(), 2);
        assert_eq!(pool.release_owner(owner), 2);
        assert_eq!(pool.stats().leased, 0);
    }

    #[test]
    fn test_clear_destroys_everything() {
        let mut driver = RecordingDriver::new();
        let mut pool = ResourcePool::new(PoolConfig::default());
        let h = pool.acquire(&mut driver, &depth(1, 256).with_layers(6)).unwrap();
        assert_eq!(pool.get(h).unwrap().desc.layers, 6);
        pool.clear(&mut driver).unwrap();
        assert!(pool.get(h).is_none());
        assert_eq!(pool.used_bytes(), 0);
        assert_eq!(driver.live_surface_count(), 0);
    }
}
