//! Ordered post-process chain
//!
//! Stages run in insertion order. The first enabled stage reads the scene
//! color and every later stage reads the previous stage's output. Outputs
//! alternate between two ping-pong surfaces, so N stages cost two render
//! targets rather than N.
//!
//! | Surface | Size | Created |
//! |---------|------|---------|
//! | ping-pong A/B | viewport | first execute, recreated on resize |
//! | work | viewport / 2 | first execute with a stage that asks for it |
//!
//! A stage whose declared inputs are missing this frame is skipped and the
//! chain carries on. Driver failures abort the chain and are returned.

use serde::{Deserialize, Serialize};
use umbra_driver::{RenderDriver, StateCache, SurfaceDesc, SurfaceFormat, SurfaceHandle, SurfaceUsage};

use crate::builtin::{
    AmbientOcclusionStage, AntialiasStage, DepthOfFieldStage, GaussianBlurStage, GlareStage, MotionBlurStage,
    ToneMapStage,
};
use crate::error::{PostError, PostResult};
use crate::stage::{FrameSurfaces, PostStage, StageConfigData, StageContext};

/// Work surface resolution divisor
pub const WORK_DIVISOR: u32 = 2;

/// Chain statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStats {
    pub frames: u64,
    /// Draw passes submitted by all stages
    pub passes: u64,
    /// Surfaces created for ping-pong and work targets
    pub targets_created: u64,
    pub stages_executed: u64,
    pub stages_skipped: u64,
}

/// Outcome of one chain execution
#[derive(Clone, Debug, PartialEq)]
pub struct ChainReport {
    /// Surface holding the final composite
    pub output: SurfaceHandle,
    /// Stages that wrote an output, in order
    pub executed: Vec<String>,
    /// Stages that were skipped, with the reason
    pub skipped: Vec<(String, PostError)>,
    pub passes: u32,
}

#[derive(Clone, Copy, Debug)]
struct PingPong {
    surfaces: [SurfaceHandle; 2],
    size: (u32, u32),
}

/// Ordered list of post-process stages with shared render targets
pub struct PostChain {
    stages: Vec<Box<dyn PostStage>>,
    format: SurfaceFormat,
    targets: Option<PingPong>,
    work: Option<(SurfaceHandle, (u32, u32))>,
    viewport: Option<(u32, u32)>,
    stats: ChainStats,
}

impl Default for PostChain {
    fn default() -> Self {
        Self::new(SurfaceFormat::Rgba16Float)
    }
}

impl PostChain {
    /// Empty chain rendering into `format` (or the closest supported one)
    pub fn new(format: SurfaceFormat) -> Self {
        Self {
            stages: Vec::new(),
            format,
            targets: None,
            work: None,
            viewport: None,
            stats: ChainStats::default(),
        }
    }

    /// HDR chain with every built-in stage, blur disabled
    pub fn with_default_stages() -> Self {
        let mut blur = GaussianBlurStage::new();
        blur.set_enabled(false);

        let stages: Vec<Box<dyn PostStage>> = vec![
            Box::new(AmbientOcclusionStage::new()),
            Box::new(DepthOfFieldStage::new()),
            Box::new(MotionBlurStage::new()),
            Box::new(GlareStage::new()),
            Box::new(ToneMapStage::new()),
            Box::new(AntialiasStage::new()),
            Box::new(blur),
        ];
        Self {
            stages,
            ..Self::default()
        }
    }

    /// Append a stage. Names must be unique.
    pub fn push(&mut self, stage: Box<dyn PostStage>) -> PostResult<()> {
        if self.index_of(stage.name()).is_some() {
            return Err(PostError::DuplicateStage(stage.name().to_string()));
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Builder form of [`push`](Self::push)
    pub fn with_stage(mut self, stage: Box<dyn PostStage>) -> PostResult<Self> {
        self.push(stage)?;
        Ok(self)
    }

    /// Remove a stage by name
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn PostStage>> {
        let index = self.index_of(name)?;
        Some(self.stages.remove(index))
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name() == name)
    }

    pub fn stage(&self, name: &str) -> Option<&dyn PostStage> {
        self.stages.iter().find(|s| s.name() == name).map(|s| s.as_ref())
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut Box<dyn PostStage>> {
        self.stages.iter_mut().find(|s| s.name() == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> PostResult<()> {
        let stage = self
            .stage_mut(name)
            .ok_or_else(|| PostError::UnknownStage(name.to_string()))?;
        stage.set_enabled(enabled);
        Ok(())
    }

    /// Configuration of every configurable stage
    pub fn configs(&self) -> Vec<StageConfigData> {
        self.stages.iter().filter_map(|s| s.config()).collect()
    }

    /// Apply stage configurations. Fails on the first unknown stage.
    pub fn apply_configs(&mut self, configs: &[StageConfigData]) -> PostResult<()> {
        for config in configs {
            let stage = self
                .stage_mut(&config.name)
                .ok_or_else(|| PostError::UnknownStage(config.name.clone()))?;
            stage.set_enabled(config.enabled);
            stage.apply_config(config)?;
        }
        Ok(())
    }

    /// Serialize every stage configuration to JSON
    pub fn configs_to_json(&self) -> PostResult<String> {
        serde_json::to_string_pretty(&self.configs()).map_err(|e| PostError::invalid_config("chain", e.to_string()))
    }

    /// Apply stage configurations from JSON
    pub fn load_configs_json(&mut self, json: &str) -> PostResult<()> {
        let configs: Vec<StageConfigData> =
            serde_json::from_str(json).map_err(|e| PostError::invalid_config("chain", e.to_string()))?;
        self.apply_configs(&configs)
    }

    pub fn stats(&self) -> ChainStats {
        self.stats
    }

    /// Current ping-pong surfaces
    pub fn targets(&self) -> Option<[SurfaceHandle; 2]> {
        self.targets.map(|t| t.surfaces)
    }

    pub fn work_surface(&self) -> Option<SurfaceHandle> {
        self.work.map(|(surface, _)| surface)
    }

    /// Notify stages of a new viewport. Targets follow on the next execute.
    pub fn resize(&mut self, viewport: (u32, u32)) {
        if self.viewport == Some(viewport) {
            return;
        }
        log::debug!("post chain resized to {}x{}", viewport.0, viewport.1);
        self.viewport = Some(viewport);
        for stage in &mut self.stages {
            stage.on_resize(viewport);
        }
    }

    /// Run every enabled stage.
    ///
    /// Returns the surface holding the result: the last stage's target, or
    /// the scene color when no stage ran.
    pub fn execute(
        &mut self,
        driver: &mut dyn RenderDriver,
        states: &StateCache,
        frame: &FrameSurfaces,
        viewport: (u32, u32),
        delta_time: f32,
    ) -> PostResult<ChainReport> {
        if viewport.0 == 0 || viewport.1 == 0 {
            return Err(PostError::EmptyViewport(viewport.0, viewport.1));
        }
        self.stats.frames += 1;
        self.resize(viewport);

        let mut report = ChainReport {
            output: frame.color,
            executed: Vec::new(),
            skipped: Vec::new(),
            passes: 0,
        };
        if !self.stages.iter().any(|s| s.is_enabled()) {
            return Ok(report);
        }

        let targets = self.ensure_targets(driver, viewport)?;
        let work = if self.stages.iter().any(|s| s.is_enabled() && s.uses_work_surface()) {
            Some(self.ensure_work(driver, viewport)?)
        } else {
            None
        };

        let mut source = frame.color;
        let mut next = 0;
        for stage in self.stages.iter_mut().filter(|s| s.is_enabled()) {
            let name = stage.name().to_string();
            if let Some(input) = frame.missing(stage.inputs()) {
                log::warn!("post stage '{}' skipped: {:?} not provided", name, input);
                self.stats.stages_skipped += 1;
                report.skipped.push((name.clone(), PostError::MissingInput { stage: name, input }));
                continue;
            }

            let target = targets[next];
            let mut ctx = StageContext::new(&name, driver, states, frame, source, target, viewport, delta_time);
            if stage.uses_work_surface() {
                if let Some((surface, size)) = work {
                    ctx = ctx.with_work(surface, size);
                }
            }

            let result = stage.execute(&mut ctx);
            let passes = ctx.passes();
            report.passes += passes;
            self.stats.passes += passes as u64;

            match result {
                Ok(()) => {
                    log::trace!("post stage '{}' wrote {:?} in {} passes", name, target, passes);
                    self.stats.stages_executed += 1;
                    report.executed.push(name);
                    source = target;
                    next = 1 - next;
                }
                Err(PostError::Driver(err)) => {
                    log::error!("post stage '{}' failed: {}", name, err);
                    return Err(PostError::Driver(err));
                }
                Err(err) => {
                    log::warn!("post stage '{}' skipped: {}", name, err);
                    self.stats.stages_skipped += 1;
                    report.skipped.push((name, err));
                }
            }
        }

        report.output = source;
        Ok(report)
    }

    /// Destroy every surface owned by the chain
    pub fn release(&mut self, driver: &mut dyn RenderDriver) -> PostResult<()> {
        self.release_targets(driver)?;
        if let Some((surface, _)) = self.work.take() {
            driver.destroy_surface(surface)?;
        }
        Ok(())
    }

    fn release_targets(&mut self, driver: &mut dyn RenderDriver) -> PostResult<()> {
        if let Some(targets) = self.targets.take() {
            for surface in targets.surfaces {
                driver.destroy_surface(surface)?;
            }
        }
        Ok(())
    }

    fn target_format(&self, driver: &dyn RenderDriver) -> PostResult<SurfaceFormat> {
        if driver.supports_format(self.format) {
            return Ok(self.format);
        }
        let fallback = SurfaceFormat::best_render_target(self.format.precision(), self.format.channels(), |f| {
            driver.supports_format(f)
        })
        .ok_or(PostError::NoTargetFormat)?;
        log::debug!("post chain format {:?} unsupported, using {:?}", self.format, fallback);
        Ok(fallback)
    }

    fn ensure_targets(&mut self, driver: &mut dyn RenderDriver, size: (u32, u32)) -> PostResult<[SurfaceHandle; 2]> {
        if let Some(targets) = self.targets {
            if targets.size == size {
                return Ok(targets.surfaces);
            }
        }
        self.release_targets(driver)?;

        let desc = self.color_desc(driver, size)?;
        let first = driver.create_surface(&desc)?;
        let second = match driver.create_surface(&desc) {
            Ok(surface) => surface,
            Err(err) => {
                if let Err(cleanup) = driver.destroy_surface(first) {
                    log::warn!("failed to release half-built ping-pong pair: {}", cleanup);
                }
                return Err(err.into());
            }
        };
        self.stats.targets_created += 2;
        log::debug!("post chain ping-pong {}x{} {:?}", size.0, size.1, desc.format);

        let surfaces = [first, second];
        self.targets = Some(PingPong { surfaces, size });
        Ok(surfaces)
    }

    fn ensure_work(
        &mut self,
        driver: &mut dyn RenderDriver,
        viewport: (u32, u32),
    ) -> PostResult<(SurfaceHandle, (u32, u32))> {
        let size = ((viewport.0 / WORK_DIVISOR).max(1), (viewport.1 / WORK_DIVISOR).max(1));
        if let Some(work) = self.work {
            if work.1 == size {
                return Ok(work);
            }
        }
        if let Some((surface, _)) = self.work.take() {
            driver.destroy_surface(surface)?;
        }

        let desc = self.color_desc(driver, size)?;
        let work = (driver.create_surface(&desc)?, size);
        self.stats.targets_created += 1;
        self.work = Some(work);
        Ok(work)
    }

    fn color_desc(&self, driver: &dyn RenderDriver, size: (u32, u32)) -> PostResult<SurfaceDesc> {
        Ok(SurfaceDesc {
            width: size.0,
            height: size.1,
            layers: 1,
            format: self.target_format(driver)?,
            usage: SurfaceUsage::RenderTarget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageInput;
    use umbra_driver::{BlendStateDesc, RecordingDriver};

    struct Passthrough {
        name: &'static str,
        inputs: &'static [StageInput],
        enabled: bool,
    }

    impl Passthrough {
        fn named(name: &'static str) -> Box<Self> {
            Box::new(Self {
                name,
                inputs: &[],
                enabled: true,
            })
        }
    }

    impl PostStage for Passthrough {
        fn name(&self) -> &str {
            self.name
        }

        fn inputs(&self) -> &[StageInput] {
            self.inputs
        }

        fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
            let (source, target) = (ctx.source(), ctx.target());
            ctx.draw("copy", &[source], target, BlendStateDesc::opaque())
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
    }

    #[test]
    fn test_empty_chain_passes_color_through() {
        let mut driver = RecordingDriver::new();
        let mut chain = PostChain::default();
        let frame = FrameSurfaces::new(SurfaceHandle(77));

        let report = chain
            .execute(&mut driver, &StateCache::new(), &frame, (64, 64), 0.016)
            .unwrap();
        assert_eq!(report.output, SurfaceHandle(77));
        assert!(chain.targets().is_none());
        assert_eq!(driver.live_surface_count(), 0);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut chain = PostChain::default();
        chain.push(Passthrough::named("a")).unwrap();
        assert!(matches!(chain.push(Passthrough::named("a")), Err(PostError::DuplicateStage(_))));
        assert!(matches!(chain.set_enabled("b", false), Err(PostError::UnknownStage(_))));
    }

    #[test]
    fn test_empty_viewport_rejected() {
        let mut driver = RecordingDriver::new();
        let mut chain = PostChain::default().with_stage(Passthrough::named("a")).unwrap();
        let frame = FrameSurfaces::new(SurfaceHandle(1));
        assert_eq!(
            chain.execute(&mut driver, &StateCache::new(), &frame, (0, 32), 0.016),
            Err(PostError::EmptyViewport(0, 32))
        );
    }

    #[test]
    fn test_format_fallback() {
        let mut driver = RecordingDriver::new().without_format(SurfaceFormat::Rgba16Float);
        let mut chain = PostChain::default().with_stage(Passthrough::named("a")).unwrap();
        let frame = FrameSurfaces::new(SurfaceHandle(1));
        chain
            .execute(&mut driver, &StateCache::new(), &frame, (32, 32), 0.016)
            .unwrap();

        let target = chain.targets().unwrap()[0];
        let format = driver.surface_desc(target).unwrap().format;
        assert_ne!(format, SurfaceFormat::Rgba16Float);
        assert!(format.precision() >= 16 && format.channels() == 4);
    }
}
