//! Post-process stage contract
//!
//! A stage reads the previous stage's output (plus whatever frame inputs it
//! declares) and writes exactly one output surface. Multi-pass stages may
//! route intermediate results through the chain's shared work surface.
//!
//! # Example
//!
//! ```ignore
//! use umbra_post::stage::*;
//!
//! struct Invert;
//!
//! impl PostStage for Invert {
//!     fn name(&self) -> &str { "invert" }
//!
//!     fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
//!         let (source, target) = (ctx.source(), ctx.target());
//!         ctx.draw("invert", &[source], target, BlendStateDesc::opaque())
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use umbra_driver::{
    BlendStateDesc, ConstantSlot, DepthStencilStateDesc, DrawSubmission, PassKind, RenderDriver, StateCache,
    SurfaceHandle,
};

use crate::error::{PostError, PostResult};
use crate::state_cache::screen_pipeline;

/// Frame surfaces a stage may sample besides the chain input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageInput {
    /// Scene color entering the chain
    Color,
    Depth,
    /// Screen-space motion vectors
    Velocity,
    Normal,
    /// Final output of the previous frame
    PreviousColor,
}

/// Surfaces the renderer hands to the chain each frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSurfaces {
    pub color: SurfaceHandle,
    pub depth: Option<SurfaceHandle>,
    pub velocity: Option<SurfaceHandle>,
    pub normal: Option<SurfaceHandle>,
    pub previous_color: Option<SurfaceHandle>,
}

impl FrameSurfaces {
    pub fn new(color: SurfaceHandle) -> Self {
        Self {
            color,
            depth: None,
            velocity: None,
            normal: None,
            previous_color: None,
        }
    }

    pub fn with_depth(mut self, depth: SurfaceHandle) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_velocity(mut self, velocity: SurfaceHandle) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_normal(mut self, normal: SurfaceHandle) -> Self {
        self.normal = Some(normal);
        self
    }

    pub fn with_previous_color(mut self, previous: SurfaceHandle) -> Self {
        self.previous_color = Some(previous);
        self
    }

    pub fn get(&self, input: StageInput) -> Option<SurfaceHandle> {
        match input {
            StageInput::Color => Some(self.color),
            StageInput::Depth => self.depth,
            StageInput::Velocity => self.velocity,
            StageInput::Normal => self.normal,
            StageInput::PreviousColor => self.previous_color,
        }
    }

    /// First of `inputs` that is not available
    pub fn missing(&self, inputs: &[StageInput]) -> Option<StageInput> {
        inputs.iter().copied().find(|input| self.get(*input).is_none())
    }
}

/// Constants uploaded to [`ConstantSlot::ImageProcessing`] before a pass
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PostConstants {
    /// 1 / viewport size of the pass target
    pub texel_size: [f32; 2],
    /// Sampling direction for separable passes
    pub direction: [f32; 2],
    /// Stage parameters, meaning set by the stage
    pub params: [f32; 4],
    pub extra: [f32; 4],
}

impl PostConstants {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(size: (u32, u32)) -> Self {
        Self {
            texel_size: [1.0 / size.0.max(1) as f32, 1.0 / size.1.max(1) as f32],
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, x: f32, y: f32) -> Self {
        self.direction = [x, y];
        self
    }

    pub fn with_params(mut self, params: [f32; 4]) -> Self {
        self.params = params;
        self
    }

    pub fn with_extra(mut self, extra: [f32; 4]) -> Self {
        self.extra = extra;
        self
    }
}

/// Serializable stage configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageConfigData {
    pub name: String,
    pub enabled: bool,
    /// Stage-specific configuration as JSON
    pub config: serde_json::Value,
}

/// Everything a stage needs while it executes
pub struct StageContext<'a> {
    pub(crate) stage: &'a str,
    pub(crate) driver: &'a mut dyn RenderDriver,
    pub(crate) states: &'a StateCache,
    pub(crate) frame: &'a FrameSurfaces,
    pub(crate) source: SurfaceHandle,
    pub(crate) target: SurfaceHandle,
    pub(crate) work: Option<(SurfaceHandle, (u32, u32))>,
    pub(crate) viewport: (u32, u32),
    pub(crate) delta_time: f32,
    pub(crate) passes: u32,
}

impl<'a> StageContext<'a> {
    /// Build a context outside the chain (tools, tests)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: &'a str,
        driver: &'a mut dyn RenderDriver,
        states: &'a StateCache,
        frame: &'a FrameSurfaces,
        source: SurfaceHandle,
        target: SurfaceHandle,
        viewport: (u32, u32),
        delta_time: f32,
    ) -> Self {
        Self {
            stage,
            driver,
            states,
            frame,
            source,
            target,
            work: None,
            viewport,
            delta_time,
            passes: 0,
        }
    }

    pub fn with_work(mut self, work: SurfaceHandle, size: (u32, u32)) -> Self {
        self.work = Some((work, size));
        self
    }

    /// Output of the previous stage (scene color for the first stage)
    pub fn source(&self) -> SurfaceHandle {
        self.source
    }

    /// Surface this stage must leave its output in
    pub fn target(&self) -> SurfaceHandle {
        self.target
    }

    /// Shared reduced-resolution work surface
    pub fn work(&self) -> PostResult<SurfaceHandle> {
        self.work.map(|(surface, _)| surface).ok_or_else(|| PostError::NoWorkSurface {
            stage: self.stage.to_string(),
        })
    }

    pub fn work_size(&self) -> (u32, u32) {
        self.work.map_or(self.viewport, |(_, size)| size)
    }

    /// A declared frame input
    pub fn input(&self, input: StageInput) -> PostResult<SurfaceHandle> {
        self.frame.get(input).ok_or_else(|| PostError::MissingInput {
            stage: self.stage.to_string(),
            input,
        })
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Passes submitted so far by this stage
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Upload pass constants
    pub fn upload(&mut self, constants: &PostConstants) -> PostResult<()> {
        self.driver
            .upload_constants(ConstantSlot::ImageProcessing, bytemuck::bytes_of(constants))?;
        Ok(())
    }

    /// Submit one full-screen pass
    pub fn draw(
        &mut self,
        label: &str,
        sources: &[SurfaceHandle],
        target: SurfaceHandle,
        blend: BlendStateDesc,
    ) -> PostResult<()> {
        let states = screen_pipeline(self.states, self.driver, blend, DepthStencilStateDesc::disabled())?;
        let mut submission = DrawSubmission::new(PassKind::PostProcess)
            .with_label(format!("{} {}", self.stage, label))
            .with_target(target)
            .with_states(states);
        for source in sources {
            submission = submission.with_source(*source);
        }
        self.driver.submit(&submission)?;
        self.passes += 1;
        Ok(())
    }
}

/// A screen-space post-process stage
pub trait PostStage: Send {
    /// Unique name within a chain
    fn name(&self) -> &str;

    /// Frame inputs read besides the chain input
    fn inputs(&self) -> &[StageInput] {
        &[]
    }

    /// Whether the stage routes passes through the chain's work surface
    fn uses_work_surface(&self) -> bool {
        false
    }

    /// Render into `ctx.target()`
    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()>;

    fn is_enabled(&self) -> bool {
        true
    }

    fn set_enabled(&mut self, _enabled: bool) {}

    /// Called when the viewport changes size
    fn on_resize(&mut self, _viewport: (u32, u32)) {}

    fn config(&self) -> Option<StageConfigData> {
        None
    }

    fn apply_config(&mut self, _config: &StageConfigData) -> PostResult<()> {
        Ok(())
    }
}

/// Serialize a stage config into [`StageConfigData`]
pub(crate) fn config_data<T: Serialize>(name: &str, enabled: bool, config: &T) -> Option<StageConfigData> {
    match serde_json::to_value(config) {
        Ok(config) => Some(StageConfigData {
            name: name.to_string(),
            enabled,
            config,
        }),
        Err(err) => {
            log::warn!("stage '{}' config not serializable: {}", name, err);
            None
        }
    }
}

/// Parse the stage-specific part of [`StageConfigData`]
pub(crate) fn parse_config<T: for<'de> Deserialize<'de>>(data: &StageConfigData) -> PostResult<T> {
    serde_json::from_value(data.config.clone()).map_err(|e| PostError::invalid_config(&data.name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_driver::{RecordingDriver, SurfaceDesc, SurfaceFormat, SurfaceUsage};

    #[test]
    fn test_missing_inputs() {
        let frame = FrameSurfaces::new(SurfaceHandle(1)).with_depth(SurfaceHandle(2));
        assert_eq!(frame.missing(&[StageInput::Color, StageInput::Depth]), None);
        assert_eq!(
            frame.missing(&[StageInput::Depth, StageInput::Velocity, StageInput::Normal]),
            Some(StageInput::Velocity)
        );
    }

    #[test]
    fn test_context_draw_and_upload() {
        let mut driver = RecordingDriver::new();
        let target = driver
            .create_surface(&SurfaceDesc::square(64, SurfaceFormat::Rgba16Float, SurfaceUsage::RenderTarget))
            .unwrap();
        let states = StateCache::new();
        let frame = FrameSurfaces::new(SurfaceHandle(100));
        let mut ctx = StageContext::new(
            "sharpen",
            &mut driver,
            &states,
            &frame,
            SurfaceHandle(100),
            target,
            (640, 480),
            0.016,
        );

        assert!(matches!(ctx.work(), Err(PostError::NoWorkSurface { .. })));
        assert!(matches!(
            ctx.input(StageInput::Depth),
            Err(PostError::MissingInput { input: StageInput::Depth, .. })
        ));

        ctx.upload(&PostConstants::new((640, 480)).with_params([1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        ctx.draw("copy", &[SurfaceHandle(100)], target, BlendStateDesc::opaque())
            .unwrap();
        assert_eq!(ctx.passes(), 1);

        let sub = &driver.submissions()[0];
        assert_eq!(sub.pass, PassKind::PostProcess);
        assert_eq!(sub.label, "sharpen copy");
        assert_eq!(sub.targets, vec![target]);
        assert_eq!(sub.sources, vec![SurfaceHandle(100)]);
        let uploaded: &[PostConstants] =
            bytemuck::cast_slice(driver.constants(ConstantSlot::ImageProcessing).unwrap());
        assert_eq!(uploaded[0].params, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(PostConstants::SIZE, 48);
    }
}
