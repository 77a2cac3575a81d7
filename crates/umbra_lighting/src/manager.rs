//! Lighting Manager
//!
//! [`LightingContext`] owns every piece of per-scene lighting state: the
//! registered lights, the shadow settings table, the resource pool, scratch
//! buffers, the state cache and the radiance grid. It is built at scene load
//! and dropped at unload; there is no global state.
//!
//! # Frame
//!
//! [`LightingContext::update`] runs one frame:
//!
//! 1. Reset [`LightingSystemStates`] and drain the event queue
//! 2. Score LOD and visibility for all lights on scoped worker threads
//! 3. Generate shadows for due lights in priority order (tier, then distance)
//! 4. Schedule and drain the indirect cycle under the grid budget
//! 5. Upload lighting constants
//!
//! No error leaves `update`. Per-light failures demote that light for the
//! frame; a driver failure drops the frame and the next one starts clean.
//! Everything is reported through `log` and the returned [`FrameReport`].

use umbra_core::{ErrorClass, FrameClock, FrameId, LightId, LightIdAllocator, LightingError, LightingResult};
use umbra_driver::{ConstantSlot, RenderDriver, StateCache, SurfaceDesc, SurfaceUsage};

use crate::config::LightingConfig;
use crate::constants::{GridConstants, LightConstants, LightingSystemConstants, ShadowConstants};
use crate::events::{EventQueue, EventSender, LightingEvent};
use crate::generator::{GeneratorContext, GeneratorOutput, GeneratorVariant, RsmSample, ShadowGenerator};
use crate::grid::{DrainReport, RadianceGrid, RsmSource};
use crate::light::{face_visibility_mask, FrustumContext, Light, LightLod, LightShape, LodThresholds, RefreshTimer, ShadowFrustum};
use crate::math::Frustum;
use crate::pool::{PoolConfig, ResourcePool};
use crate::scene::{CameraView, FrameInputs, SceneQuery};
use crate::scratch::ScratchBuffers;
use crate::settings::{
    generate_shadow_settings, validate_shadow_settings, LodTier, ResolvedFormats, ShadowMethodFlags, ShadowSettings,
    ShadowSettingsSystem, ShadowSettingsTable,
};
use crate::states::LightingSystemStates;
use crate::tasks::IndirectTaskQueue;

/// What happened to a light's shadow this frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShadowStatus {
    /// Disabled or not a shadow caster
    #[default]
    Unshadowed,
    /// Outside the camera view; any cached map is kept
    NotVisible,
    /// Tier below the minimum; cached maps released
    BelowTier,
    /// Dynamic shadows switched off; cached maps released
    DynamicsDisabled,
    /// Rendered this frame
    Generated,
    /// Cached map reused
    Cached,
    /// Pool out of budget
    Exhausted,
    /// Generator aborted; retried next frame
    Aborted,
}

impl ShadowStatus {
    /// Whether the light has a usable shadow map this frame
    pub fn is_shadowed(self) -> bool {
        matches!(self, Self::Generated | Self::Cached)
    }
}

/// Derived per-frame state for one light
#[derive(Debug, Default)]
pub struct LightRuntime {
    pub lod: Option<LightLod>,
    pub visible: bool,
    pub face_mask: u32,
    pub frustums: Vec<ShadowFrustum>,
    /// Merged settings for the current tier
    pub settings: Option<ShadowSettings>,
    pub status: ShadowStatus,
    /// Cached or freshly generated shadow surfaces
    pub shadow: Option<GeneratorOutput>,
    /// Reflective shadow map while the light owns one
    pub rsm: Option<GeneratorOutput>,
    timer: RefreshTimer,
}

impl LightRuntime {
    pub fn tier(&self) -> LodTier {
        self.lod.map_or(LodTier::Off, |lod| lod.tier)
    }

    fn distance(&self) -> f32 {
        self.lod.map_or(f32::MAX, |lod| lod.distance)
    }

    fn release_all(&mut self, pool: &mut ResourcePool) {
        for output in [self.shadow.take(), self.rsm.take()].into_iter().flatten() {
            output.release(pool);
        }
    }
}

#[derive(Debug)]
struct LightSlot {
    id: LightId,
    light: Light,
    runtime: LightRuntime,
}

/// Summary of one `update`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame: FrameId,
    /// The frame was dropped after a driver failure
    pub dropped: bool,
    /// Lights whose shadow was rendered this frame, in priority order
    pub generated: Vec<LightId>,
    pub cached: Vec<LightId>,
    pub exhausted: Vec<LightId>,
    pub aborted: Vec<LightId>,
    pub skipped_below_tier: Vec<LightId>,
    /// Shadow casters skipped because dynamic shadows are off
    pub skipped_dynamics_disabled: Vec<LightId>,
    /// Indirect drain result when the grid ran
    pub indirect: Option<DrainReport>,
    /// Scratch leases reclaimed by force at the end of the update
    pub scratch_leaks: usize,
    /// Every error resolved during the frame
    pub errors: Vec<LightingError>,
}

/// LOD and visibility computed on a worker
struct LightScore {
    lod: LightLod,
    visible: bool,
    frustums: Vec<ShadowFrustum>,
    face_mask: u32,
}

fn score_light(
    light: &Light,
    resolution: u32,
    camera: &CameraView,
    camera_frustum: &Frustum,
    scene: &dyn SceneQuery,
    thresholds: &LodThresholds,
) -> LightScore {
    let lod = light.compute_level_of_detail(light.distance_to(camera.position), thresholds);
    let visible = light.compute_visibility(scene, camera_frustum);
    let frustums = if visible && light.casts_shadows && lod.tier != LodTier::Off {
        light.kind.shadow_frustums(&FrustumContext { camera, resolution })
    } else {
        Vec::new()
    };
    let face_mask = face_visibility_mask(&light.kind, &frustums, camera);
    LightScore {
        lod,
        visible,
        frustums,
        face_mask,
    }
}

/// Priority order: higher tier first, then nearer first
fn by_priority(a: &LightRuntime, b: &LightRuntime) -> std::cmp::Ordering {
    b.tier().cmp(&a.tier()).then(a.distance().total_cmp(&b.distance()))
}

/// The lighting context for one scene
pub struct LightingContext {
    config: LightingConfig,
    ids: LightIdAllocator,
    lights: Vec<LightSlot>,
    table: ShadowSettingsTable,
    table_validated: bool,
    pool: ResourcePool,
    scratch: ScratchBuffers,
    state_cache: StateCache,
    grid: RadianceGrid,
    tasks: IndirectTaskQueue,
    events: EventQueue,
    states: LightingSystemStates,
    clock: FrameClock,
    rsm_owners: Vec<LightId>,
    rsm_samples: Vec<RsmSample>,
}

impl LightingContext {
    pub fn new(mut config: LightingConfig) -> Self {
        config.validate();
        let states = LightingSystemStates {
            dynamics_enabled: config.dynamics_enabled,
            indirect_active: config.indirect_enabled,
            shadow_detail_level: config.shadow_detail_level,
            indirect_detail_level: config.indirect_detail_level,
            min_visible_tier: config.min_visible_tier,
            ..Default::default()
        };
        log::info!(
            "lighting context: pool budget {} bytes, grid {:?}, indirect {}",
            config.pool.budget_bytes,
            config.grid.dimensions,
            config.indirect_enabled
        );
        Self {
            ids: LightIdAllocator::new(),
            lights: Vec::new(),
            table: config.shadow_settings.clone(),
            table_validated: false,
            pool: ResourcePool::new(config.pool.clone()),
            scratch: ScratchBuffers::new(),
            state_cache: StateCache::new(),
            grid: RadianceGrid::new(config.grid.clone()),
            tasks: IndirectTaskQueue::with_capacity(config.grid.task_capacity),
            events: EventQueue::new(config.event_capacity),
            states,
            clock: FrameClock::new(),
            rsm_owners: Vec::new(),
            rsm_samples: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    pub fn states(&self) -> &LightingSystemStates {
        &self.states
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn scratch(&self) -> &ScratchBuffers {
        &self.scratch
    }

    pub fn state_cache(&self) -> &StateCache {
        &self.state_cache
    }

    pub fn grid(&self) -> &RadianceGrid {
        &self.grid
    }

    pub fn tasks(&self) -> &IndirectTaskQueue {
        &self.tasks
    }

    pub fn settings_table(&self) -> &ShadowSettingsTable {
        &self.table
    }

    pub fn frame(&self) -> FrameId {
        self.clock.frame()
    }

    /// Producer handle for posting events from other systems
    pub fn events(&self) -> EventSender {
        self.events.sender()
    }

    // ------------------------------------------------------------------
    // Lights
    // ------------------------------------------------------------------

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = self.ids.allocate();
        log::debug!("add light '{}' as {}", light.name, id);
        self.lights.push(LightSlot {
            id,
            light,
            runtime: LightRuntime::default(),
        });
        id
    }

    /// Remove a light and release its pool entries immediately
    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        let index = self.lights.iter().position(|s| s.id == id)?;
        let mut slot = self.lights.remove(index);
        slot.runtime.release_all(&mut self.pool);
        let stray = self.pool.release_owner(id);
        if stray > 0 {
            log::warn!("light {} still owned {} untracked leases", id, stray);
        }
        self.ids.free(id);
        log::debug!("removed light '{}' ({})", slot.light.name, id);
        Some(slot.light)
    }

    /// Replace a light's description; its cached shadow is invalidated
    pub fn update_light(&mut self, id: LightId, light: Light) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.light = light;
                slot.runtime.settings = None;
                slot.runtime.timer.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.slot(id).map(|s| &s.light)
    }

    pub fn runtime(&self, id: LightId) -> Option<&LightRuntime> {
        self.slot(id).map(|s| &s.runtime)
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter().map(|s| (s.id, &s.light))
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    fn slot(&self, id: LightId) -> Option<&LightSlot> {
        self.lights.iter().find(|s| s.id == id)
    }

    fn slot_mut(&mut self, id: LightId) -> Option<&mut LightSlot> {
        self.lights.iter_mut().find(|s| s.id == id)
    }

    // ------------------------------------------------------------------
    // Shadow settings
    // ------------------------------------------------------------------

    /// Check a system settings record against driver format support
    pub fn validate_shadow_settings(
        &self,
        settings: &ShadowSettingsSystem,
        driver: &dyn RenderDriver,
    ) -> LightingResult<ResolvedFormats> {
        validate_shadow_settings(settings, |format| driver.supports_format(format))
    }

    /// Build a system settings record from method flags
    pub fn generate_shadow_settings(&self, flags: ShadowMethodFlags) -> ShadowSettingsSystem {
        generate_shadow_settings(flags)
    }

    /// Add a named system entry. Existing names are kept.
    pub fn add_shadow_settings(
        &mut self,
        name: impl Into<String>,
        settings: ShadowSettingsSystem,
        driver: &dyn RenderDriver,
    ) -> LightingResult<()> {
        self.table.add(name, settings, |format| driver.supports_format(format))
    }

    /// Merged settings a light uses at its current tier
    pub fn shadow_settings_for(&self, id: LightId) -> Option<ShadowSettings> {
        let slot = self.slot(id)?;
        if let Some(settings) = &slot.runtime.settings {
            return Some(settings.clone());
        }
        Some(self.table.resolve(
            &slot.light.shadow_lods,
            self.states.shadow_detail_level,
            &slot.light.shadow,
            slot.runtime.tier(),
        ))
    }

    /// Validate the whole table, regenerating invalid entries
    pub fn validate_settings_table(&mut self, driver: &dyn RenderDriver) -> Vec<LightingError> {
        let repaired = self.table.validate(|format| driver.supports_format(format));
        for err in &repaired {
            log::warn!("{}", err);
        }
        self.table_validated = true;
        for slot in self.lights.iter_mut() {
            slot.runtime.settings = None;
        }
        repaired
    }

    // ------------------------------------------------------------------
    // Pool
    // ------------------------------------------------------------------

    /// Change the pool budget and resolution range
    pub fn configure_pool(&mut self, budget_bytes: u64, min_resolution: u32, max_resolution: u32) {
        let config = PoolConfig {
            budget_bytes,
            ..self.pool.config().clone()
        }
        .with_resolution_range(min_resolution, max_resolution);
        self.pool.reconfigure(config);
        self.config.pool = self.pool.config().clone();
    }

    /// Pre-create free depth maps for a shadow method
    pub fn reserve_cached_maps(
        &mut self,
        flags: ShadowMethodFlags,
        resolution: u32,
        count: u32,
        driver: &mut dyn RenderDriver,
    ) -> LightingResult<u32> {
        let settings = generate_shadow_settings(flags);
        let formats = validate_shadow_settings(&settings, |format| driver.supports_format(format))?;
        let desc = SurfaceDesc::square(resolution, formats.depth, SurfaceUsage::DepthMap);
        self.pool.reserve(driver, desc, count)
    }

    /// Destroy stale pool entries
    pub fn evict_stale(&mut self, driver: &mut dyn RenderDriver) -> LightingResult<usize> {
        self.pool.evict_stale(driver, self.clock.frame())
    }

    /// Release every surface (scene unload)
    pub fn shutdown(&mut self, driver: &mut dyn RenderDriver) -> LightingResult<()> {
        for slot in self.lights.iter_mut() {
            slot.runtime.shadow = None;
            slot.runtime.rsm = None;
        }
        self.tasks.clear();
        self.rsm_owners.clear();
        self.rsm_samples.clear();
        self.pool.clear(driver)?;
        self.scratch.clear(driver)
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Run one frame
    pub fn update(&mut self, frame_time: f32, inputs: &FrameInputs<'_>, driver: &mut dyn RenderDriver) -> FrameReport {
        let frame = self.clock.advance(frame_time);
        self.states.reset(frame);
        self.pool.begin_frame(frame);
        self.scratch.begin_update();

        let mut report = FrameReport {
            frame,
            ..Default::default()
        };

        if !self.table_validated {
            report.errors.extend(self.validate_settings_table(&*driver));
        }

        if let Err(err) = self.run_frame(frame, frame_time, inputs, driver, &mut report) {
            log::error!("frame {} dropped: {}", frame, err);
            report.dropped = true;
            report.errors.push(err);
        }

        report.scratch_leaks = self.scratch.end_update();
        report
    }

    fn run_frame(
        &mut self,
        frame: FrameId,
        frame_time: f32,
        inputs: &FrameInputs<'_>,
        driver: &mut dyn RenderDriver,
        report: &mut FrameReport,
    ) -> LightingResult<()> {
        self.process_events();

        let scores = self.score_lights(inputs);
        for (slot, score) in self.lights.iter_mut().zip(scores) {
            let runtime = &mut slot.runtime;
            runtime.lod = Some(score.lod);
            runtime.visible = score.visible;
            runtime.frustums = score.frustums;
            runtime.face_mask = score.face_mask;
        }

        self.update_shadows(frame_time, inputs, driver, report)?;
        self.update_indirect(frame, inputs, driver, report)?;
        self.upload_constants(frame_time, driver)
    }

    fn process_events(&mut self) {
        for event in self.events.drain() {
            log::trace!("lighting event {:?}", event);
            match event {
                LightingEvent::LightModified(id) => {
                    if let Some(slot) = self.slot_mut(id) {
                        slot.runtime.settings = None;
                        slot.runtime.timer.invalidate();
                    }
                }
                LightingEvent::InvalidateShadows(Some(id)) => {
                    if let Some(slot) = self.slot_mut(id) {
                        slot.runtime.timer.invalidate();
                    }
                }
                LightingEvent::InvalidateShadows(None) => {
                    for slot in self.lights.iter_mut() {
                        slot.runtime.timer.invalidate();
                    }
                }
                LightingEvent::SetDetailLevels { shadow, indirect } => {
                    self.states.set_detail_levels(shadow, indirect);
                }
                LightingEvent::SetDynamics(enabled) => self.states.dynamics_enabled = enabled,
                LightingEvent::SetIndirect(enabled) => {
                    if self.states.indirect_active && !enabled {
                        self.stop_indirect();
                    }
                    self.states.indirect_active = enabled;
                }
            }
        }

        if self.states.detail_changed {
            log::debug!(
                "detail levels now shadow {} / indirect {}, regenerating settings",
                self.states.shadow_detail_level,
                self.states.indirect_detail_level
            );
            for slot in self.lights.iter_mut() {
                slot.runtime.settings = None;
                slot.runtime.timer.invalidate();
            }
        }
    }

    fn stop_indirect(&mut self) {
        self.tasks.clear();
        self.rsm_owners.clear();
        self.rsm_samples.clear();
        for slot in self.lights.iter_mut() {
            if let Some(rsm) = slot.runtime.rsm.take() {
                rsm.release(&mut self.pool);
            }
        }
    }

    /// LOD and visibility for every light, fanned out over scoped threads
    fn score_lights(&self, inputs: &FrameInputs<'_>) -> Vec<LightScore> {
        let camera = inputs.camera;
        let scene = inputs.scene;
        let camera_frustum = camera.frustum();
        let thresholds = self.config.lod_thresholds;
        let max_resolution = self.table.max_resolution;

        let jobs: Vec<(&Light, u32)> = self
            .lights
            .iter()
            .map(|s| {
                let resolution = s.runtime.settings.as_ref().map_or(max_resolution, |x| x.resolution);
                (&s.light, resolution)
            })
            .collect();
        let score = |light: &Light, resolution: u32| {
            score_light(light, resolution, camera, &camera_frustum, scene, &thresholds)
        };
        let score = &score;

        let workers = self.config.worker_count(jobs.len());
        if workers <= 1 {
            return jobs.iter().map(|&(light, res)| score(light, res)).collect();
        }

        let chunk = (jobs.len() + workers - 1) / workers;
        let scored = crossbeam_utils::thread::scope(|s| {
            let handles: Vec<_> = jobs
                .chunks(chunk)
                .map(|part| s.spawn(move |_| part.iter().map(|&(light, res)| score(light, res)).collect::<Vec<_>>()))
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Result<Vec<_>, _>>()
        });

        match scored {
            Ok(Ok(parts)) => parts.into_iter().flatten().collect(),
            _ => {
                log::error!("LOD scoring worker panicked, rescoring on the update thread");
                jobs.iter().map(|&(light, res)| score(light, res)).collect()
            }
        }
    }

    fn update_shadows(
        &mut self,
        frame_time: f32,
        inputs: &FrameInputs<'_>,
        driver: &mut dyn RenderDriver,
        report: &mut FrameReport,
    ) -> LightingResult<()> {
        let mut order = Vec::new();
        for (index, slot) in self.lights.iter_mut().enumerate() {
            let runtime = &mut slot.runtime;
            if !slot.light.enabled || !slot.light.casts_shadows {
                if let Some(shadow) = runtime.shadow.take() {
                    shadow.release(&mut self.pool);
                }
                runtime.status = ShadowStatus::Unshadowed;
            } else if !self.states.dynamics_enabled {
                if let Some(shadow) = runtime.shadow.take() {
                    shadow.release(&mut self.pool);
                }
                runtime.status = ShadowStatus::DynamicsDisabled;
                report.skipped_dynamics_disabled.push(slot.id);
            } else if !self.states.admits(runtime.tier()) {
                if let Some(shadow) = runtime.shadow.take() {
                    shadow.release(&mut self.pool);
                }
                log::trace!("{} at tier {:?} below minimum, not shadowed", slot.id, runtime.tier());
                runtime.status = ShadowStatus::BelowTier;
                report.skipped_below_tier.push(slot.id);
            } else if !runtime.visible {
                runtime.status = ShadowStatus::NotVisible;
            } else {
                order.push(index);
            }
        }
        order.sort_by(|a, b| by_priority(&self.lights[*a].runtime, &self.lights[*b].runtime));

        for index in order {
            let slot = &mut self.lights[index];
            let id = slot.id;
            let runtime = &mut slot.runtime;
            let tier = runtime.tier();

            let settings = match &runtime.settings {
                Some(settings) if settings.tier == tier => settings.clone(),
                _ => {
                    let settings = self.table.resolve(
                        &slot.light.shadow_lods,
                        self.states.shadow_detail_level,
                        &slot.light.shadow,
                        tier,
                    );
                    runtime.settings = Some(settings.clone());
                    settings
                }
            };

            let cache_fits = runtime.shadow.as_ref().is_some_and(|shadow| {
                shadow.requested == settings.resolution
                    && shadow.method == settings.method()
                    && shadow.is_valid(&self.pool)
            });
            if !cache_fits {
                if let Some(stale) = runtime.shadow.take() {
                    stale.release(&mut self.pool);
                }
            }

            if !runtime.timer.advance(settings.update_rate, frame_time, cache_fits) {
                if let Some(shadow) = &runtime.shadow {
                    shadow.touch(&mut self.pool);
                }
                runtime.status = ShadowStatus::Cached;
                report.cached.push(id);
                continue;
            }

            // Returned first so the new generator can take the same entries
            if let Some(previous) = runtime.shadow.take() {
                previous.release(&mut self.pool);
            }

            let mut generator = ShadowGenerator::new(
                id,
                GeneratorVariant::Shadow,
                settings,
                std::mem::take(&mut runtime.frustums),
                runtime.face_mask,
                slot.light.color.flux(),
            );
            let mut ctx = GeneratorContext {
                pool: &mut self.pool,
                driver: &mut *driver,
                scratch: &mut self.scratch,
                states: &self.state_cache,
                scene: inputs.scene,
            };

            match generator.run(&mut ctx) {
                Ok(output) => {
                    log::trace!("{} shadowed at {}^2", id, output.resolution);
                    runtime.shadow = Some(output);
                    runtime.timer.mark_refreshed();
                    runtime.status = ShadowStatus::Generated;
                    report.generated.push(id);
                }
                Err(err) => match err.class() {
                    ErrorClass::DropFrame => return Err(err),
                    ErrorClass::DegradeLight => {
                        log::warn!("'{}' ({}) unshadowed this frame: {}", slot.light.name, id, err);
                        runtime.status = ShadowStatus::Exhausted;
                        report.exhausted.push(id);
                        report.errors.push(err);
                    }
                    ErrorClass::RetryNextFrame => {
                        log::debug!("'{}' ({}) retried next frame: {}", slot.light.name, id, err);
                        runtime.status = ShadowStatus::Aborted;
                        report.aborted.push(id);
                        report.errors.push(err);
                    }
                    ErrorClass::RegenerateSettings => {
                        log::warn!("'{}' ({}) settings regenerated: {}", slot.light.name, id, err);
                        runtime.settings = None;
                        runtime.status = ShadowStatus::Aborted;
                        report.aborted.push(id);
                        report.errors.push(err);
                    }
                },
            }
        }
        Ok(())
    }

    fn update_indirect(
        &mut self,
        frame: FrameId,
        inputs: &FrameInputs<'_>,
        driver: &mut dyn RenderDriver,
        report: &mut FrameReport,
    ) -> LightingResult<()> {
        if !self.states.indirect_active {
            return Ok(());
        }

        for slot in &self.lights {
            if let Some(rsm) = &slot.runtime.rsm {
                rsm.touch(&mut self.pool);
            }
        }

        if self.grid.cycle_due(frame) {
            // Recentring mid-cycle would move cells under a half-finished cycle
            if self.tasks.is_empty() {
                self.grid.recenter(inputs.camera.position);
            }
            self.grid.schedule_cycle(&mut self.tasks, frame);
        }
        self.grid.tick();

        let grid_config = self.grid.config();
        let budget = grid_config.budget;
        let max_lights = grid_config.max_rsm_lights as usize;
        let sample_grid = grid_config.rsm_sample_grid;

        let mut filler = RsmFiller {
            lights: &mut self.lights,
            owners: &mut self.rsm_owners,
            samples: &mut self.rsm_samples,
            table: &self.table,
            states: &self.states,
            detail_level: self.states.indirect_detail_level,
            max_lights,
            sample_grid,
            camera: inputs.camera,
            ctx: GeneratorContext {
                pool: &mut self.pool,
                driver,
                scratch: &mut self.scratch,
                states: &self.state_cache,
                scene: inputs.scene,
            },
        };
        let drain = self.grid.run_tasks(&mut self.tasks, &budget, frame, &mut filler)?;
        if drain.budget_exhausted {
            log::trace!("indirect cycle paused after {} units", drain.units);
        }
        report.indirect = Some(drain);
        Ok(())
    }

    fn upload_constants(&self, frame_time: f32, driver: &mut dyn RenderDriver) -> LightingResult<()> {
        let mut lights = Vec::with_capacity(self.lights.len());
        let mut shadows = Vec::new();

        for slot in self.lights.iter().filter(|s| s.light.enabled) {
            let lod = slot
                .runtime
                .lod
                .unwrap_or_else(|| slot.light.compute_level_of_detail(f32::MAX, &self.config.lod_thresholds));
            let mut constants = LightConstants::new(&slot.light, &lod);

            if let (true, Some(shadow), Some(settings)) = (
                slot.runtime.status.is_shadowed(),
                &slot.runtime.shadow,
                &slot.runtime.settings,
            ) {
                constants = constants.with_shadow(shadows.len(), shadow.frustums.len() as u32);
                for frustum in &shadow.frustums {
                    let mut entry = ShadowConstants::new(settings, frustum, lights.len());
                    // Texel size follows the leased surface
                    entry.resolution = shadow.resolution;
                    shadows.push(entry);
                }
            }
            lights.push(constants);
        }

        let system = LightingSystemConstants {
            ambient: self.config.ambient,
            frame_time,
            light_count: lights.len() as u32,
            shadow_count: shadows.len() as u32,
            indirect_active: self.states.indirect_active as u32,
            dynamics_enabled: self.states.dynamics_enabled as u32,
            shadow_detail_level: self.states.shadow_detail_level,
            indirect_detail_level: self.states.indirect_detail_level,
            frame: self.states.frame as u32,
            _pad: 0,
        };
        let grid = GridConstants::new(&self.grid, self.states.indirect_active);

        driver.upload_constants(ConstantSlot::LightingSystem, bytemuck::bytes_of(&system))?;
        driver.upload_constants(ConstantSlot::Lights, bytemuck::cast_slice(&lights))?;
        driver.upload_constants(ConstantSlot::Shadow, bytemuck::cast_slice(&shadows))?;
        driver.upload_constants(ConstantSlot::Grid, bytemuck::bytes_of(&grid))?;
        Ok(())
    }
}

/// Runs reflective generators for the grid's RSM tasks
struct RsmFiller<'a> {
    lights: &'a mut [LightSlot],
    owners: &'a mut Vec<LightId>,
    samples: &'a mut Vec<RsmSample>,
    table: &'a ShadowSettingsTable,
    states: &'a LightingSystemStates,
    detail_level: i32,
    max_lights: usize,
    sample_grid: u32,
    camera: &'a CameraView,
    ctx: GeneratorContext<'a>,
}

impl RsmSource for RsmFiller<'_> {
    fn reassign(&mut self) -> LightingResult<u32> {
        let mut candidates: Vec<&LightSlot> = self
            .lights
            .iter()
            .filter(|s| {
                s.light.enabled && s.light.is_indirect() && s.runtime.visible && self.states.admits(s.runtime.tier())
            })
            .collect();
        candidates.sort_by(|a, b| by_priority(&a.runtime, &b.runtime));
        let chosen: Vec<LightId> = candidates.iter().take(self.max_lights).map(|s| s.id).collect();

        for slot in self.lights.iter_mut() {
            if !chosen.contains(&slot.id) {
                if let Some(rsm) = slot.runtime.rsm.take() {
                    log::trace!("{} lost its reflective shadow map", slot.id);
                    rsm.release(self.ctx.pool);
                }
            }
        }

        *self.owners = chosen;
        self.samples.clear();
        Ok(self.owners.len() as u32)
    }

    fn fill(&mut self, index: u32) -> LightingResult<()> {
        let id = self
            .owners
            .get(index as usize)
            .copied()
            .ok_or_else(|| LightingError::aborted(LightId::null(), format!("no RSM owner {}", index)))?;
        let slot = self
            .lights
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| LightingError::aborted(id, "light removed"))?;

        if let Some(previous) = slot.runtime.rsm.take() {
            previous.release(self.ctx.pool);
        }

        let settings = self.table.resolve(
            &slot.light.indirect_lods,
            self.detail_level,
            &slot.light.shadow,
            slot.runtime.tier(),
        );
        let frustums = slot.light.kind.shadow_frustums(&FrustumContext {
            camera: self.camera,
            resolution: settings.resolution,
        });
        let mut generator = ShadowGenerator::new(
            id,
            GeneratorVariant::Reflectance,
            settings,
            frustums,
            u32::MAX,
            slot.light.color.flux(),
        )
        .with_sample_grid(self.sample_grid);

        let output = generator.run(&mut self.ctx)?;
        self.samples.extend_from_slice(&output.samples);
        slot.runtime.rsm = Some(output);
        Ok(())
    }

    fn samples(&self) -> &[RsmSample] {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::EmptyScene;
    use crate::settings::{LodOverride, ShadowSettingsLight, ShadowSettingsLod, UpdateRate};
    use glam::Vec3;
    use umbra_driver::RecordingDriver;

    fn camera() -> CameraView {
        CameraView::look_at(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), 1.2, 1.0, 0.1, 200.0)
    }

    fn spot_at(z: f32) -> Light {
        Light::spot(format!("spot{}", z), Vec3::new(0.0, 0.0, -z), Vec3::NEG_Y, 5.0, 0.6)
    }

    #[test]
    fn test_update_generates_and_uploads() {
        let mut ctx = LightingContext::new(LightingConfig::default());
        let mut driver = RecordingDriver::new();
        let id = ctx.add_light(spot_at(3.0));
        let camera = camera();

        let report = ctx.update(0.016, &FrameInputs::new(&camera, &EmptyScene), &mut driver);
        assert!(!report.dropped);
        assert_eq!(report.generated, vec![id]);
        assert_eq!(ctx.runtime(id).unwrap().status, ShadowStatus::Generated);

        let lights = driver.constants(ConstantSlot::Lights).unwrap();
        assert_eq!(lights.len(), LightConstants::SIZE);
        let shadows = driver.constants(ConstantSlot::Shadow).unwrap();
        assert_eq!(shadows.len(), ShadowConstants::SIZE);
        let system: &[LightingSystemConstants] =
            bytemuck::cast_slice(driver.constants(ConstantSlot::LightingSystem).unwrap());
        assert_eq!(system[0].light_count, 1);
        assert_eq!(system[0].frame, 1);
    }

    #[test]
    fn test_never_rate_reuses_cache_until_invalidated() {
        let mut ctx = LightingContext::new(LightingConfig::default());
        let mut driver = RecordingDriver::new();
        let light = spot_at(3.0).with_shadow_settings(ShadowSettingsLight::default().with_update_rate(UpdateRate::Never));
        let id = ctx.add_light(light);
        let camera = camera();
        let inputs = FrameInputs::new(&camera, &EmptyScene);

        assert_eq!(ctx.update(0.016, &inputs, &mut driver).generated, vec![id]);
        assert_eq!(ctx.update(0.016, &inputs, &mut driver).cached, vec![id]);

        ctx.events().send(LightingEvent::InvalidateShadows(Some(id)));
        assert_eq!(ctx.update(0.016, &inputs, &mut driver).generated, vec![id]);
    }

    #[test]
    fn test_fps_rate_accumulates_time() {
        let mut ctx = LightingContext::new(LightingConfig::default());
        let mut driver = RecordingDriver::new();
        let light = spot_at(3.0).with_shadow_settings(ShadowSettingsLight::default().with_update_rate(UpdateRate::Fps(10)));
        let id = ctx.add_light(light);
        let camera = camera();
        let inputs = FrameInputs::new(&camera, &EmptyScene);

        assert_eq!(ctx.update(0.04, &inputs, &mut driver).generated, vec![id]);
        assert_eq!(ctx.update(0.04, &inputs, &mut driver).cached, vec![id]);
        assert_eq!(ctx.update(0.04, &inputs, &mut driver).cached, vec![id]);
        // 0.12s since the refresh
        assert_eq!(ctx.update(0.04, &inputs, &mut driver).generated, vec![id]);
    }

    #[test]
    fn test_priority_orders_by_tier_then_distance() {
        let table = ShadowSettingsTable::new().with_tier(LodTier::Medium, LodOverride::resolution(256));
        let mut ctx = LightingContext::new(LightingConfig::default().with_shadow_settings(table));
        let mut driver = RecordingDriver::new();
        let medium = ctx.add_light(spot_at(35.0));
        let near = ctx.add_light(spot_at(2.0));
        let mid = ctx.add_light(spot_at(6.0));
        let camera = camera();

        let report = ctx.update(0.016, &FrameInputs::new(&camera, &EmptyScene), &mut driver);
        assert_eq!(ctx.runtime(medium).unwrap().tier(), LodTier::Medium);
        assert_eq!(report.generated, vec![near, mid, medium]);
    }

    #[test]
    fn test_detail_change_regenerates_settings() {
        let mut config = LightingConfig::default();
        config.shadow_settings.entries.insert(
            "soft".to_string(),
            generate_shadow_settings(ShadowMethodFlags::VSM | ShadowMethodFlags::BITS_32),
        );
        let mut ctx = LightingContext::new(config);
        let mut driver = RecordingDriver::new();
        let light = spot_at(3.0).with_shadow_lods(vec![
            ShadowSettingsLod::new(0, "default"),
            ShadowSettingsLod::new(2, "soft"),
        ]);
        let id = ctx.add_light(light);
        let camera = camera();
        let inputs = FrameInputs::new(&camera, &EmptyScene);

        ctx.update(0.016, &inputs, &mut driver);
        assert_eq!(ctx.shadow_settings_for(id).unwrap().name, "default");

        ctx.events().send(LightingEvent::SetDetailLevels { shadow: 2, indirect: 0 });
        ctx.update(0.016, &inputs, &mut driver);
        let settings = ctx.shadow_settings_for(id).unwrap();
        assert_eq!(settings.name, "soft");
        let shadow = ctx.runtime(id).unwrap().shadow.as_ref().unwrap();
        assert!(shadow.statistics.is_some());
    }

    #[test]
    fn test_reserve_cached_maps_and_configure_pool() {
        let mut ctx = LightingContext::new(LightingConfig::default());
        let mut driver = RecordingDriver::new();
        ctx.configure_pool(4 << 20, 128, 1024);
        assert_eq!(ctx.pool().budget(), 4 << 20);

        let created = ctx
            .reserve_cached_maps(ShadowMethodFlags::PCF | ShadowMethodFlags::BITS_32, 512, 8, &mut driver)
            .unwrap();
        // 1 MiB each
        assert_eq!(created, 4);
        assert_eq!(ctx.pool().stats().leased, 0);
        assert_eq!(driver.live_surface_count(), 4);
    }

    #[test]
    fn test_add_shadow_settings_rejects_unsupported() {
        let mut ctx = LightingContext::new(LightingConfig::default());
        let driver = RecordingDriver::new();

        let mut settings = ctx.generate_shadow_settings(ShadowMethodFlags::PCF | ShadowMethodFlags::BITS_32);
        settings.precision = 12;
        assert!(ctx.validate_shadow_settings(&settings, &driver).is_err());
        assert!(ctx.add_shadow_settings("odd", settings, &driver).is_err());
        assert!(!ctx.settings_table().entries.contains_key("odd"));
    }

    #[test]
    fn test_disabled_light_is_unshadowed() {
        let mut ctx = LightingContext::new(LightingConfig::default());
        let mut driver = RecordingDriver::new();
        let mut light = spot_at(3.0);
        light.enabled = false;
        let id = ctx.add_light(light);
        let camera = camera();

        let report = ctx.update(0.016, &FrameInputs::new(&camera, &EmptyScene), &mut driver);
        assert!(report.generated.is_empty());
        assert_eq!(ctx.runtime(id).unwrap().status, ShadowStatus::Unshadowed);
        assert!(driver.submissions().is_empty());
    }
}
