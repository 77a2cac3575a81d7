//! Shadow and reflectance generator
//!
//! Per-light, per-frame state machine that turns a light's shadow frustums
//! into leased shadow surfaces.
//!
//! ```text
//! Idle -> BeginWrite -> FillPass(0..N) -> EndWrite -> PostOperation -> Ready
//!              \______________ any error ______________/
//!                               Aborted
//! ```
//!
//! # Channels
//!
//! | Method              | BeginWrite                     | EndWrite                      |
//! |---------------------|--------------------------------|-------------------------------|
//! | PCF / PCSS          | depth                          | -                             |
//! | VSM / ESM / EVSM    | depth, statistics, depth-stencil | release depth-stencil       |
//! | Reflective variant  | depth, normal, color           | pack depth+normal, release both |
//!
//! Every lease acquired is either handed out in the [`GeneratorOutput`] or
//! released before the machine stops. A generator never carries partially
//! filled surfaces into the next frame.

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use umbra_core::{LightId, LightingError, LightingResult, SurfaceHandle};
use umbra_driver::{
    BlendStateDesc, DepthStencilStateDesc, DrawSubmission, PassKind, PipelineStates, RasterizerStateDesc,
    RenderDriver, StateCache, SurfaceDesc, SurfaceFormat, SurfaceUsage,
};

use crate::light::ShadowFrustum;
use crate::pool::{PoolHandle, PoolRequest, ResourcePool};
use crate::scene::SceneQuery;
use crate::scratch::ScratchBuffers;
use crate::settings::{ShadowMethod, ShadowSettings};

/// Reflective channel formats used when the settings carry none
const FALLBACK_NORMAL_FORMAT: SurfaceFormat = SurfaceFormat::Rgba8Unorm;
const FALLBACK_COLOR_FORMAT: SurfaceFormat = SurfaceFormat::Rgba8Unorm;
const FALLBACK_PACKED_FORMAT: SurfaceFormat = SurfaceFormat::Rgba16Float;

/// Default rays per face edge for reflective sampling
pub const DEFAULT_SAMPLE_GRID: u32 = 8;

/// A virtual point light produced by a reflective shadow map
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RsmSample {
    pub position: Vec3,
    pub normal: Vec3,
    pub flux: Vec3,
}

/// Which surfaces a generator produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratorVariant {
    /// Depth or statistics shadow map
    Shadow,
    /// Reflective shadow map (packed depth/normal + flux) for indirect lighting
    Reflectance,
}

/// Generator state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeneratorState {
    Idle,
    BeginWrite,
    /// Next face to fill
    FillPass(u32),
    EndWrite,
    PostOperation,
    Ready,
    Aborted,
}

impl GeneratorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Aborted)
    }
}

/// Leases held while the machine runs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratorChannels {
    pub depth: Option<PoolHandle>,
    pub depth_stencil: Option<PoolHandle>,
    pub statistics: Option<PoolHandle>,
    pub normal: Option<PoolHandle>,
    pub color: Option<PoolHandle>,
    pub packed: Option<PoolHandle>,
}

impl GeneratorChannels {
    /// Every lease currently held
    pub fn handles(&self) -> impl Iterator<Item = PoolHandle> + '_ {
        [
            self.depth,
            self.depth_stencil,
            self.statistics,
            self.normal,
            self.color,
            self.packed,
        ]
        .into_iter()
        .flatten()
    }

    /// Release everything and forget the handles
    pub fn release_all(&mut self, pool: &mut ResourcePool) -> usize {
        let released = self.handles().filter(|h| pool.release(*h)).count();
        *self = Self::default();
        released
    }
}

/// One fill pass: the surfaces it writes and the frustum it renders
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowGeneratorOperation {
    pub pass: PassKind,
    /// Depth first, then statistics / normal / color
    pub targets: Vec<SurfaceHandle>,
    pub view_projection: Mat4,
    pub clip_range: [f32; 2],
    /// Face or cascade index
    pub face: u32,
}

impl ShadowGeneratorOperation {
    pub fn submission(&self, light: LightId, states: PipelineStates) -> DrawSubmission {
        let mut submission = DrawSubmission::new(self.pass)
            .with_label(format!("{} face {}", light, self.face))
            .with_layer(self.face)
            .with_view_projection(self.view_projection.to_cols_array_2d(), self.clip_range)
            .with_states(states);
        for target in &self.targets {
            submission = submission.with_target(*target);
        }
        submission
    }
}

/// Collaborators a generator needs to advance
pub struct GeneratorContext<'a> {
    pub pool: &'a mut ResourcePool,
    pub driver: &'a mut dyn RenderDriver,
    pub scratch: &'a mut ScratchBuffers,
    pub states: &'a StateCache,
    pub scene: &'a dyn SceneQuery,
}

/// Surfaces produced by a finished generator. The leases stay with the
/// light until released or revoked.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorOutput {
    pub light: LightId,
    pub variant: GeneratorVariant,
    pub method: ShadowMethod,
    pub depth: Option<PoolHandle>,
    pub statistics: Option<PoolHandle>,
    pub packed: Option<PoolHandle>,
    pub color: Option<PoolHandle>,
    /// Resolution of the leased surfaces the faces were rendered at
    pub resolution: u32,
    /// Resolution the settings asked for
    pub requested: u32,
    pub layers: u32,
    pub face_mask: u32,
    pub frustums: Vec<ShadowFrustum>,
    pub samples: Vec<RsmSample>,
}

impl GeneratorOutput {
    pub fn handles(&self) -> impl Iterator<Item = PoolHandle> + '_ {
        [self.depth, self.statistics, self.packed, self.color].into_iter().flatten()
    }

    /// Surface sampled when shading
    pub fn primary(&self) -> Option<PoolHandle> {
        self.statistics.or(self.packed).or(self.depth)
    }

    /// Whether every lease is still live
    pub fn is_valid(&self, pool: &ResourcePool) -> bool {
        self.handles().all(|h| pool.is_valid(h))
    }

    /// Stamp every lease as used this frame
    pub fn touch(&self, pool: &mut ResourcePool) -> bool {
        self.handles().fold(true, |ok, h| pool.touch(h) && ok)
    }

    pub fn release(&self, pool: &mut ResourcePool) -> usize {
        self.handles().filter(|h| pool.release(*h)).count()
    }
}

/// Generator statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub fill_passes: u32,
    pub faces_skipped: u32,
    pub filter_passes: u32,
    pub samples: u32,
}

/// The per-light generator
#[derive(Debug)]
pub struct ShadowGenerator {
    light: LightId,
    variant: GeneratorVariant,
    settings: ShadowSettings,
    /// Resolution of the leased surfaces, which the pool may round
    resolution: u32,
    frustums: Vec<ShadowFrustum>,
    face_mask: u32,
    flux: Vec3,
    sample_grid: u32,
    state: GeneratorState,
    channels: GeneratorChannels,
    samples: Vec<RsmSample>,
    stats: GeneratorStats,
}

impl ShadowGenerator {
    pub fn new(
        light: LightId,
        variant: GeneratorVariant,
        settings: ShadowSettings,
        frustums: Vec<ShadowFrustum>,
        face_mask: u32,
        flux: Vec3,
    ) -> Self {
        Self {
            light,
            variant,
            resolution: settings.resolution,
            settings,
            frustums,
            face_mask,
            flux,
            sample_grid: DEFAULT_SAMPLE_GRID,
            state: GeneratorState::Idle,
            channels: GeneratorChannels::default(),
            samples: Vec::new(),
            stats: GeneratorStats::default(),
        }
    }

    /// Rays per face edge for reflective sampling
    pub fn with_sample_grid(mut self, n: u32) -> Self {
        self.sample_grid = n.clamp(1, 64);
        self
    }

    pub fn light(&self) -> LightId {
        self.light
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn channels(&self) -> &GeneratorChannels {
        &self.channels
    }

    pub fn stats(&self) -> GeneratorStats {
        self.stats
    }

    /// Run to `Ready`. On error the machine is aborted and every lease
    /// released before the error is returned.
    pub fn run(&mut self, ctx: &mut GeneratorContext<'_>) -> LightingResult<GeneratorOutput> {
        while !self.state.is_terminal() {
            self.step(ctx)?;
        }
        self.take_output()
            .ok_or_else(|| LightingError::aborted(self.light, "generator was aborted"))
    }

    /// Advance one state
    pub fn step(&mut self, ctx: &mut GeneratorContext<'_>) -> LightingResult<GeneratorState> {
        let result = match self.state {
            GeneratorState::Idle => {
                if self.frustums.is_empty() {
                    Err(LightingError::aborted(self.light, "no shadow frustums"))
                } else {
                    Ok(GeneratorState::BeginWrite)
                }
            }
            GeneratorState::BeginWrite => self.begin_write(ctx).map(|_| GeneratorState::FillPass(0)),
            GeneratorState::FillPass(face) => self.fill_pass(ctx, face).map(|_| {
                if face + 1 < self.frustums.len() as u32 {
                    GeneratorState::FillPass(face + 1)
                } else {
                    GeneratorState::EndWrite
                }
            }),
            GeneratorState::EndWrite => self.end_write(ctx).map(|_| GeneratorState::PostOperation),
            GeneratorState::PostOperation => self.post_operation(ctx).map(|_| GeneratorState::Ready),
            terminal => Ok(terminal),
        };

        match result {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(err) => {
                log::debug!("generator for {} aborted in {:?}: {}", self.light, self.state, err);
                self.abort(ctx.pool);
                Err(err)
            }
        }
    }

    /// Release every lease and stop
    pub fn abort(&mut self, pool: &mut ResourcePool) {
        self.channels.release_all(pool);
        self.samples.clear();
        self.state = GeneratorState::Aborted;
    }

    fn take_output(&mut self) -> Option<GeneratorOutput> {
        if self.state != GeneratorState::Ready {
            return None;
        }
        let channels = std::mem::take(&mut self.channels);
        Some(GeneratorOutput {
            light: self.light,
            variant: self.variant,
            method: self.settings.method(),
            depth: channels.depth,
            statistics: channels.statistics,
            packed: channels.packed,
            color: channels.color,
            resolution: self.resolution,
            requested: self.settings.resolution,
            layers: self.frustums.len() as u32,
            face_mask: self.face_mask,
            frustums: self.frustums.clone(),
            samples: std::mem::take(&mut self.samples),
        })
    }

    fn request(&self, format: SurfaceFormat, usage: SurfaceUsage) -> PoolRequest {
        PoolRequest::new(self.light, self.resolution, format, usage).with_layers(self.frustums.len() as u32)
    }

    fn surface(&self, pool: &ResourcePool, handle: Option<PoolHandle>) -> LightingResult<Option<SurfaceHandle>> {
        match handle {
            None => Ok(None),
            Some(h) => pool
                .surface(h)
                .map(Some)
                .ok_or_else(|| LightingError::aborted(self.light, format!("lease {} revoked", h))),
        }
    }

    fn begin_write(&mut self, ctx: &mut GeneratorContext<'_>) -> LightingResult<()> {
        let formats = self.settings.formats;
        let method = self.settings.method();

        let depth = self.request(formats.depth, SurfaceUsage::DepthMap);
        let handle = ctx.pool.acquire(ctx.driver, &depth)?;
        self.channels.depth = Some(handle);
        // Remaining channels follow the depth entry
        if let Some(entry) = ctx.pool.get(handle) {
            self.resolution = entry.resolution();
        }

        match self.variant {
            GeneratorVariant::Shadow if method.is_statistics() => {
                let statistics = formats
                    .statistics
                    .ok_or_else(|| LightingError::aborted(self.light, "no statistics format resolved"))?;
                let request = self.request(statistics, SurfaceUsage::StatisticsMap);
                self.channels.statistics = Some(ctx.pool.acquire(ctx.driver, &request)?);

                if let Some(depth_stencil) = formats.depth_stencil {
                    let request = self.request(depth_stencil, SurfaceUsage::DepthStencil);
                    self.channels.depth_stencil = Some(ctx.pool.acquire(ctx.driver, &request)?);
                }
            }
            GeneratorVariant::Shadow => {}
            GeneratorVariant::Reflectance => {
                let normal = self.request(
                    formats.normal.unwrap_or(FALLBACK_NORMAL_FORMAT),
                    SurfaceUsage::NormalMap,
                );
                self.channels.normal = Some(ctx.pool.acquire(ctx.driver, &normal)?);
                let color = self.request(formats.color.unwrap_or(FALLBACK_COLOR_FORMAT), SurfaceUsage::ColorMap);
                self.channels.color = Some(ctx.pool.acquire(ctx.driver, &color)?);
            }
        }
        Ok(())
    }

    /// Build the operation for `face`
    pub fn operation(&self, pool: &ResourcePool, face: u32) -> LightingResult<ShadowGeneratorOperation> {
        let frustum = self
            .frustums
            .get(face as usize)
            .ok_or_else(|| LightingError::aborted(self.light, format!("face {} out of range", face)))?;

        let (pass, channels) = match self.variant {
            GeneratorVariant::Shadow => (
                PassKind::ShadowFill,
                [self.channels.depth, self.channels.statistics, self.channels.depth_stencil],
            ),
            GeneratorVariant::Reflectance => (
                PassKind::ReflectiveFill,
                [self.channels.depth, self.channels.normal, self.channels.color],
            ),
        };
        let mut targets = Vec::with_capacity(3);
        for handle in channels {
            if let Some(surface) = self.surface(pool, handle)? {
                targets.push(surface);
            }
        }

        Ok(ShadowGeneratorOperation {
            pass,
            targets,
            view_projection: frustum.view_projection,
            clip_range: frustum.clip_range,
            face: frustum.layer,
        })
    }

    fn fill_pass(&mut self, ctx: &mut GeneratorContext<'_>, face: u32) -> LightingResult<()> {
        if face < 32 && self.face_mask & (1 << face) == 0 {
            self.stats.faces_skipped += 1;
            log::trace!("{} face {} masked", self.light, face);
            return Ok(());
        }

        let operation = self.operation(ctx.pool, face)?;
        let light = &self.settings.light;
        let states = ctx.states.pipeline(
            ctx.driver,
            BlendStateDesc::opaque(),
            DepthStencilStateDesc::default(),
            RasterizerStateDesc::shadow(light.cull_mode, light.depth_bias, light.slope_bias),
        )?;
        ctx.driver.submit(&operation.submission(self.light, states))?;
        self.stats.fill_passes += 1;

        if self.variant == GeneratorVariant::Reflectance {
            let before = self.samples.len();
            self.gather_samples(ctx.scene, &operation.view_projection);
            self.stats.samples += (self.samples.len() - before) as u32;
        }
        Ok(())
    }

    /// Cast an NxN ray grid through the face and keep the surfaces it hits
    fn gather_samples(&mut self, scene: &dyn SceneQuery, view_projection: &Mat4) {
        let n = self.sample_grid;
        let inverse = view_projection.inverse();
        let unproject = |ndc: Vec2, depth: f32| {
            let p = inverse * Vec4::new(ndc.x, ndc.y, depth, 1.0);
            p.truncate() / p.w
        };
        // Spread over every face so a point light carries the same total as a spot
        let total = n * n * self.frustums.len().max(1) as u32;
        let flux = self.flux / total as f32;

        for y in 0..n {
            for x in 0..n {
                let ndc = (Vec2::new(x as f32, y as f32) + Vec2::splat(0.5)) / n as f32 * 2.0 - Vec2::ONE;
                let near = unproject(ndc, 0.0);
                let far = unproject(ndc, 1.0);
                let ray = far - near;
                let length = ray.length();
                if !length.is_finite() || length <= f32::EPSILON {
                    continue;
                }
                if let Some(hit) = scene.surface_hit(near, ray / length, length) {
                    self.samples.push(RsmSample {
                        position: hit.position,
                        normal: hit.normal,
                        flux: flux * hit.albedo,
                    });
                }
            }
        }
    }

    fn end_write(&mut self, ctx: &mut GeneratorContext<'_>) -> LightingResult<()> {
        if let Some(depth_stencil) = self.channels.depth_stencil.take() {
            ctx.pool.release(depth_stencil);
        }
        if self.variant != GeneratorVariant::Reflectance {
            return Ok(());
        }

        let format = self.settings.formats.packed.unwrap_or(FALLBACK_PACKED_FORMAT);
        let request = self.request(format, SurfaceUsage::DepthNormalMap);
        self.channels.packed = Some(ctx.pool.acquire(ctx.driver, &request)?);

        let depth = self.surface(ctx.pool, self.channels.depth)?;
        let normal = self.surface(ctx.pool, self.channels.normal)?;
        let packed = self.surface(ctx.pool, self.channels.packed)?;

        let states = ctx.states.pipeline(
            ctx.driver,
            BlendStateDesc::opaque(),
            DepthStencilStateDesc::disabled(),
            RasterizerStateDesc::screen(),
        )?;
        let mut submission = DrawSubmission::new(PassKind::PackDepthNormal)
            .with_label(format!("{} pack depth/normal", self.light))
            .with_states(states);
        for source in [depth, normal].into_iter().flatten() {
            submission = submission.with_source(source);
        }
        if let Some(packed) = packed {
            submission = submission.with_target(packed);
        }
        ctx.driver.submit(&submission)?;

        for handle in [self.channels.depth.take(), self.channels.normal.take()].into_iter().flatten() {
            ctx.pool.release(handle);
        }
        Ok(())
    }

    fn post_operation(&mut self, ctx: &mut GeneratorContext<'_>) -> LightingResult<()> {
        let passes = self.settings.system.filter_passes;
        if !self.settings.method().is_statistics() || passes == 0 {
            return Ok(());
        }
        let Some(statistics) = self.surface(ctx.pool, self.channels.statistics)? else {
            return Ok(());
        };
        let format = self.settings.formats.statistics.unwrap_or(SurfaceFormat::Rg32Float);
        let desc = SurfaceDesc::square(self.resolution, format, SurfaceUsage::RenderTarget)
            .with_layers(self.frustums.len() as u32);

        let lease = ctx.scratch.checkout(ctx.driver, desc)?;
        let temp = lease.surface();
        let result = (|| -> LightingResult<()> {
            let states = ctx.states.pipeline(
                ctx.driver,
                BlendStateDesc::opaque(),
                DepthStencilStateDesc::disabled(),
                RasterizerStateDesc::screen(),
            )?;
            for pass in 0..passes {
                let horizontal = DrawSubmission::new(PassKind::ShadowFilter)
                    .with_label(format!("{} filter {} horizontal", self.light, pass))
                    .with_source(statistics)
                    .with_target(temp)
                    .with_states(states);
                ctx.driver.submit(&horizontal)?;
                let vertical = DrawSubmission::new(PassKind::ShadowFilter)
                    .with_label(format!("{} filter {} vertical", self.light, pass))
                    .with_source(temp)
                    .with_target(statistics)
                    .with_states(states);
                ctx.driver.submit(&vertical)?;
                self.stats.filter_passes += 1;
            }
            Ok(())
        })();
        ctx.scratch.give_back(lease);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{FrustumContext, Light, LightShape};
    use crate::pool::PoolConfig;
    use crate::scene::{CameraView, EmptyScene, GroundPlane};
    use crate::settings::{
        generate_shadow_settings, LodTier, ResolvedFormats, ShadowMethodFlags, ShadowSettingsLight,
        ShadowSettingsTable,
    };
    use umbra_driver::RecordingDriver;

    fn settings(flags: ShadowMethodFlags, resolution: u32) -> ShadowSettings {
        let system = generate_shadow_settings(flags);
        ShadowSettings {
            name: "test".to_string(),
            formats: ResolvedFormats::assume_supported(&system),
            system,
            light: ShadowSettingsLight::default(),
            tier: LodTier::High,
            resolution,
            filter_quality: Default::default(),
            update_rate: Default::default(),
        }
    }

    fn frustums(light: &Light) -> Vec<ShadowFrustum> {
        let camera = CameraView::default();
        light.kind.shadow_frustums(&FrustumContext {
            camera: &camera,
            resolution: 512,
        })
    }

    struct Harness {
        pool: ResourcePool,
        driver: RecordingDriver,
        scratch: ScratchBuffers,
        states: StateCache,
    }

    impl Harness {
        fn new(budget: u64) -> Self {
            Self {
                pool: ResourcePool::new(PoolConfig::default().with_budget(budget)),
                driver: RecordingDriver::new(),
                scratch: ScratchBuffers::new(),
                states: StateCache::new(),
            }
        }

        fn run(&mut self, generator: &mut ShadowGenerator, scene: &dyn SceneQuery) -> LightingResult<GeneratorOutput> {
            self.scratch.begin_update();
            let mut ctx = GeneratorContext {
                pool: &mut self.pool,
                driver: &mut self.driver,
                scratch: &mut self.scratch,
                states: &self.states,
                scene,
            };
            let output = generator.run(&mut ctx);
            assert_eq!(self.scratch.end_update(), 0);
            output
        }
    }

    #[test]
    fn test_pcf_point_light_fills_unmasked_faces() {
        let light = Light::point("bulb", Vec3::ZERO, 10.0);
        let id = LightId::new(0, 0);
        let mut harness = Harness::new(64 << 20);
        let mut generator = ShadowGenerator::new(
            id,
            GeneratorVariant::Shadow,
            settings(ShadowMethodFlags::PCF | ShadowMethodFlags::BITS_32, 256),
            frustums(&light),
            0b101101,
            Vec3::ONE,
        );

        let output = harness.run(&mut generator, &EmptyScene).unwrap();
        assert_eq!(generator.state(), GeneratorState::Ready);
        assert_eq!(output.layers, 6);
        assert!(output.statistics.is_none());
        let depth = harness.pool.get(output.depth.unwrap()).unwrap();
        assert_eq!(depth.desc.width, 256);
        assert_eq!(depth.desc.layers, 6);
        assert_eq!(depth.owner, Some(id));

        let fills: Vec<u32> = harness
            .driver
            .submissions()
            .iter()
            .filter(|s| s.pass == PassKind::ShadowFill)
            .map(|s| s.layer)
            .collect();
        assert_eq!(fills, vec![0, 2, 3, 5]);
        assert_eq!(generator.stats().faces_skipped, 2);
    }

    #[test]
    fn test_statistics_method_filters_through_scratch() {
        let light = Light::spot("spot", Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 20.0, 0.6);
        let mut harness = Harness::new(64 << 20);
        let mut generator = ShadowGenerator::new(
            LightId::new(1, 0),
            GeneratorVariant::Shadow,
            settings(ShadowMethodFlags::VSM | ShadowMethodFlags::BITS_32, 128),
            frustums(&light),
            1,
            Vec3::ONE,
        );

        let output = harness.run(&mut generator, &EmptyScene).unwrap();
        assert!(output.statistics.is_some());
        assert_eq!(output.primary(), output.statistics);
        // depth-stencil released at EndWrite
        assert_eq!(harness.pool.stats().leased, 2);
        let filters = harness
            .driver
            .submissions()
            .iter()
            .filter(|s| s.pass == PassKind::ShadowFilter)
            .count();
        assert_eq!(filters, 2);
        assert_eq!(harness.scratch.outstanding(), 0);
        assert_eq!(harness.scratch.stats().returns, 1);
    }

    #[test]
    fn test_reflective_packs_and_samples() {
        let light = Light::spot("sun-spot", Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 30.0, 0.5);
        let mut harness = Harness::new(64 << 20);
        let mut generator = ShadowGenerator::new(
            LightId::new(2, 0),
            GeneratorVariant::Reflectance,
            settings(ShadowMethodFlags::RSM, 64),
            frustums(&light),
            1,
            Vec3::splat(16.0),
        )
        .with_sample_grid(4);

        let output = harness.run(&mut generator, &GroundPlane::default()).unwrap();
        assert!(output.depth.is_none());
        assert!(output.packed.is_some());
        assert!(output.color.is_some());
        assert_eq!(output.samples.len(), 16);
        for sample in &output.samples {
            assert!(sample.position.y.abs() < 1e-3);
            assert_eq!(sample.normal, Vec3::Y);
            assert!((sample.flux - Vec3::splat(0.5)).length() < 1e-5);
        }
        // packed + color remain
        assert_eq!(harness.pool.stats().leased, 2);
        assert!(harness
            .driver
            .submissions()
            .iter()
            .any(|s| s.pass == PassKind::PackDepthNormal && s.sources.len() == 2));
    }

    #[test]
    fn test_reflective_flux_spread_over_all_faces() {
        let light = Light::point("bulb", Vec3::new(0.0, 2.0, 0.0), 10.0);
        let mut harness = Harness::new(64 << 20);
        let mut generator = ShadowGenerator::new(
            LightId::new(5, 0),
            GeneratorVariant::Reflectance,
            settings(ShadowMethodFlags::RSM, 64),
            frustums(&light),
            u32::MAX,
            Vec3::splat(96.0),
        )
        .with_sample_grid(4);

        let output = harness.run(&mut generator, &GroundPlane::default()).unwrap();
        assert_eq!(output.layers, 6);
        assert!(!output.samples.is_empty());
        // 96 rays in total across six faces, ground albedo 0.5
        for sample in &output.samples {
            assert!((sample.flux - Vec3::splat(0.5)).length() < 1e-5);
        }
        let total: Vec3 = output.samples.iter().map(|s| s.flux).sum();
        assert!(total.x <= 96.0 * 0.5 + 1e-3);
    }

    #[test]
    fn test_begin_write_failure_releases_everything() {
        let light = Light::spot("spot", Vec3::ZERO, Vec3::NEG_Y, 10.0, 0.5);
        // Room for the depth map only
        let mut harness = Harness::new(256 * 256 * 4);
        let mut generator = ShadowGenerator::new(
            LightId::new(3, 0),
            GeneratorVariant::Shadow,
            settings(ShadowMethodFlags::EVSM | ShadowMethodFlags::BITS_32, 256),
            frustums(&light),
            1,
            Vec3::ONE,
        );

        let err = harness.run(&mut generator, &EmptyScene).unwrap_err();
        assert!(matches!(err, LightingError::PoolExhausted { .. }));
        assert_eq!(generator.state(), GeneratorState::Aborted);
        assert_eq!(harness.pool.stats().leased, 0);
        assert!(harness.driver.submissions().is_empty());
    }

    #[test]
    fn test_driver_failure_aborts() {
        let light = Light::point("bulb", Vec3::ZERO, 5.0);
        let mut harness = Harness::new(64 << 20);
        harness.driver.fail_next_submissions(1);
        let mut generator = ShadowGenerator::new(
            LightId::new(4, 0),
            GeneratorVariant::Shadow,
            settings(ShadowMethodFlags::PCF, 128),
            frustums(&light),
            u32::MAX,
            Vec3::ONE,
        );

        let err = harness.run(&mut generator, &EmptyScene).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(generator.state(), GeneratorState::Aborted);
        assert_eq!(harness.pool.stats().leased, 0);
    }

    #[test]
    fn test_abort_mid_fill_releases_leases() {
        let light = Light::point("bulb", Vec3::ZERO, 5.0);
        let mut harness = Harness::new(64 << 20);
        let mut generator = ShadowGenerator::new(
            LightId::new(5, 0),
            GeneratorVariant::Shadow,
            settings(ShadowMethodFlags::PCF, 128),
            frustums(&light),
            u32::MAX,
            Vec3::ONE,
        );

        let mut ctx = GeneratorContext {
            pool: &mut harness.pool,
            driver: &mut harness.driver,
            scratch: &mut harness.scratch,
            states: &harness.states,
            scene: &EmptyScene,
        };
        generator.step(&mut ctx).unwrap();
        generator.step(&mut ctx).unwrap();
        assert_eq!(generator.step(&mut ctx).unwrap(), GeneratorState::FillPass(1));
        assert_eq!(ctx.pool.stats().leased, 1);

        generator.abort(ctx.pool);
        assert_eq!(ctx.pool.stats().leased, 0);
        assert!(generator.channels().handles().next().is_none());
    }

    #[test]
    fn test_fill_states_are_cached() {
        let light = Light::point("bulb", Vec3::ZERO, 5.0);
        let mut harness = Harness::new(64 << 20);
        let mut generator = ShadowGenerator::new(
            LightId::new(6, 0),
            GeneratorVariant::Shadow,
            settings(ShadowMethodFlags::PCF, 128),
            frustums(&light),
            u32::MAX,
            Vec3::ONE,
        );
        harness.run(&mut generator, &EmptyScene).unwrap();
        // blend, depth-stencil, rasterizer created once for six faces
        assert_eq!(harness.driver.created_states().len(), 3);
        assert_eq!(harness.states.stats().hits, 15);
    }

    #[test]
    fn test_table_resolution_reaches_surface() {
        let table = ShadowSettingsTable::new();
        let resolved = table.resolve(&[], 0, &ShadowSettingsLight::default(), LodTier::Medium);
        let light = Light::spot("spot", Vec3::ZERO, Vec3::NEG_Y, 10.0, 0.5);
        let mut harness = Harness::new(64 << 20);
        let expected = resolved.resolution;
        let mut generator = ShadowGenerator::new(
            LightId::new(7, 0),
            GeneratorVariant::Shadow,
            resolved,
            frustums(&light),
            1,
            Vec3::ONE,
        );
        let output = harness.run(&mut generator, &EmptyScene).unwrap();
        let entry = harness.pool.get(output.depth.unwrap()).unwrap();
        assert_eq!(entry.resolution(), expected);
    }
}
