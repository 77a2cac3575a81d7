//! Radiance Grid
//!
//! A coarse volume of order-2 SH radiance used for indirect lighting. The
//! grid is split into Z slices; every slice holds per-cell buffers for each
//! stage of an update cycle:
//!
//! ```text
//! injected --Gather--> gathered --Reproject(history)--> current --Bounce--> bounce
//!                                                          ^                  |
//!                                                          +----Propagate-----+
//! ```
//!
//! # Time slicing
//!
//! [`RadianceGrid::run_tasks`] drains an [`IndirectTaskQueue`] under a
//! [`GridBudget`]. One unit is one RSM fill or one slice of one task; at
//! least one unit runs per call. Each stage only reads buffers completed by
//! an earlier stage, so interrupting a cycle at any unit and resuming next
//! frame yields bit-identical coefficients.

use std::time::Instant;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use umbra_core::{FrameId, LightingResult};

use crate::generator::RsmSample;
use crate::math::Aabb;
use crate::sh::Sh9;
use crate::tasks::{IndirectLightingTask, IndirectTaskKind, IndirectTaskQueue};

/// Per-frame work budget for the indirect cycle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridBudget {
    /// Maximum work units per frame
    pub max_units: Option<u32>,
    /// Maximum wall time per frame in milliseconds
    pub max_time_ms: Option<f32>,
}

impl Default for GridBudget {
    fn default() -> Self {
        Self {
            max_units: None,
            max_time_ms: Some(2.0),
        }
    }
}

impl GridBudget {
    /// No limit: a whole cycle runs in one frame
    pub fn unlimited() -> Self {
        Self {
            max_units: None,
            max_time_ms: None,
        }
    }

    pub fn units(max_units: u32) -> Self {
        Self {
            max_units: Some(max_units.max(1)),
            max_time_ms: None,
        }
    }

    fn exhausted(&self, units: u32, started: Instant) -> bool {
        if self.max_units.is_some_and(|max| units >= max) {
            return true;
        }
        match self.max_time_ms {
            Some(ms) => started.elapsed().as_secs_f32() * 1000.0 >= ms,
            None => false,
        }
    }
}

/// Radiance grid configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadianceGridConfig {
    /// Cells along X, Y, Z (Z is the slice axis)
    pub dimensions: [u32; 3],
    /// World size of one cell
    pub cell_size: f32,
    /// Weight of the new gather when blending with history (0..1)
    pub temporal_weight: f32,
    /// Coefficients are clamped to `[-sh_clamp, sh_clamp]`
    pub sh_clamp: f32,
    pub bounce_reflectivity: f32,
    pub propagation_factor: f32,
    /// Scale applied when gathering injected flux
    pub light_strength: f32,
    /// Lights that may own a reflective shadow map at once
    pub max_rsm_lights: u32,
    /// Ray samples per RSM face edge
    pub rsm_sample_grid: u32,
    /// Camera movement in cells tolerated before the grid recentres
    pub padding_cells: u32,
    /// Frames after creation that schedule a cycle every frame
    pub warmup_frames: u32,
    /// Frames between cycles after warmup
    pub update_interval_frames: u32,
    pub task_capacity: usize,
    pub budget: GridBudget,
}

impl Default for RadianceGridConfig {
    fn default() -> Self {
        Self {
            dimensions: [16, 8, 16],
            cell_size: 2.0,
            temporal_weight: 0.25,
            sh_clamp: 16.0,
            bounce_reflectivity: 0.5,
            propagation_factor: 1.0,
            light_strength: 1.0,
            max_rsm_lights: 4,
            rsm_sample_grid: 8,
            padding_cells: 1,
            warmup_frames: 4,
            update_interval_frames: 2,
            task_capacity: 32,
            budget: GridBudget::default(),
        }
    }
}

impl RadianceGridConfig {
    /// Clamp to valid ranges
    pub fn validate(&mut self) {
        for d in self.dimensions.iter_mut() {
            *d = (*d).clamp(1, 128);
        }
        self.cell_size = self.cell_size.max(0.01);
        self.temporal_weight = self.temporal_weight.clamp(0.0, 1.0);
        self.sh_clamp = self.sh_clamp.abs().max(1e-3);
        self.bounce_reflectivity = self.bounce_reflectivity.clamp(0.0, 1.0);
        self.propagation_factor = self.propagation_factor.max(0.0);
        self.light_strength = self.light_strength.max(0.0);
        self.rsm_sample_grid = self.rsm_sample_grid.clamp(1, 64);
        self.update_interval_frames = self.update_interval_frames.max(1);
        self.task_capacity = self.task_capacity.max(IndirectTaskKind::ALL.len());
    }

    pub fn with_dimensions(mut self, dimensions: [u32; 3]) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_budget(mut self, budget: GridBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn cells_per_slice(&self) -> usize {
        (self.dimensions[0] * self.dimensions[1]) as usize
    }

    pub fn extent(&self) -> Vec3 {
        Vec3::new(
            self.dimensions[0] as f32,
            self.dimensions[1] as f32,
            self.dimensions[2] as f32,
        ) * self.cell_size
    }
}

/// Reflective shadow map provider driven by the grid tasks
pub trait RsmSource {
    /// Choose RSM owners for this cycle; returns how many fills follow
    fn reassign(&mut self) -> LightingResult<u32>;

    /// Fill the RSM of owner `index`
    fn fill(&mut self, index: u32) -> LightingResult<()>;

    /// Samples of every filled RSM, in a stable order
    fn samples(&self) -> &[RsmSample];
}

/// One Z slice of the grid
#[derive(Clone, Debug)]
pub struct GridSlice {
    pub bounds: Aabb,
    injected: Vec<Sh9>,
    gathered: Vec<Sh9>,
    current: Vec<Sh9>,
    history: Vec<Sh9>,
    bounce: Vec<Sh9>,
}

impl GridSlice {
    fn new(bounds: Aabb, cells: usize) -> Self {
        Self {
            bounds,
            injected: vec![Sh9::ZERO; cells],
            gathered: vec![Sh9::ZERO; cells],
            current: vec![Sh9::ZERO; cells],
            history: vec![Sh9::ZERO; cells],
            bounce: vec![Sh9::ZERO; cells],
        }
    }

    /// Blended radiance per cell
    pub fn current(&self) -> &[Sh9] {
        &self.current
    }
}

/// Outcome of one `run_tasks` call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainReport {
    pub units: u32,
    /// Tasks finished during this call, in order
    pub completed: Vec<(u64, IndirectTaskKind)>,
    pub cycle_completed: bool,
    /// Stopped because the budget ran out with work left
    pub budget_exhausted: bool,
    /// RSM fills skipped after recoverable errors
    pub skipped_fills: u32,
}

/// Grid statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridStats {
    pub cycles_scheduled: u64,
    pub cycles_completed: u64,
    pub recenters: u64,
    pub samples_injected: u64,
    pub units_last_frame: u32,
}

/// The radiance grid
#[derive(Clone, Debug)]
pub struct RadianceGrid {
    config: RadianceGridConfig,
    /// World position of the minimum corner
    origin: Vec3,
    slices: Vec<GridSlice>,
    next_cycle: u64,
    last_scheduled: Option<FrameId>,
    frames_seen: u32,
    stats: GridStats,
}

impl RadianceGrid {
    pub fn new(mut config: RadianceGridConfig) -> Self {
        config.validate();
        let origin = -config.extent() * 0.5;
        let mut grid = Self {
            config,
            origin,
            slices: Vec::new(),
            next_cycle: 0,
            last_scheduled: None,
            frames_seen: 0,
            stats: GridStats::default(),
        };
        grid.rebuild_slices();
        grid
    }

    fn rebuild_slices(&mut self) {
        let cells = self.config.cells_per_slice();
        let extent = self.config.extent();
        let size = self.config.cell_size;
        self.slices = (0..self.config.dimensions[2])
            .map(|z| {
                let min = self.origin + Vec3::new(0.0, 0.0, z as f32 * size);
                let max = min + Vec3::new(extent.x, extent.y, size);
                GridSlice::new(Aabb::new(min, max), cells)
            })
            .collect();
    }

    fn refresh_slice_bounds(&mut self) {
        let extent = self.config.extent();
        let size = self.config.cell_size;
        for (z, slice) in self.slices.iter_mut().enumerate() {
            let min = self.origin + Vec3::new(0.0, 0.0, z as f32 * size);
            slice.bounds = Aabb::new(min, min + Vec3::new(extent.x, extent.y, size));
        }
    }

    pub fn config(&self) -> &RadianceGridConfig {
        &self.config
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.origin, self.origin + self.config.extent())
    }

    pub fn slice_count(&self) -> u32 {
        self.slices.len() as u32
    }

    pub fn slices(&self) -> &[GridSlice] {
        &self.slices
    }

    pub fn stats(&self) -> GridStats {
        self.stats
    }

    /// Set the temporal blend weight and coefficient clamp
    pub fn set_temporal(&mut self, weight: f32, clamp: f32) {
        self.config.temporal_weight = weight.clamp(0.0, 1.0);
        self.config.sh_clamp = clamp.abs().max(1e-3);
    }

    /// Integer cell containing `position`
    pub fn cell_of(&self, position: Vec3) -> Option<[u32; 3]> {
        let local = (position - self.origin) / self.config.cell_size;
        let [dx, dy, dz] = self.config.dimensions;
        let cell = local.floor();
        if cell.min_element() < 0.0 || cell.x >= dx as f32 || cell.y >= dy as f32 || cell.z >= dz as f32 {
            return None;
        }
        Some([cell.x as u32, cell.y as u32, cell.z as u32])
    }

    pub fn cell_center(&self, cell: [u32; 3]) -> Vec3 {
        self.origin
            + (Vec3::new(cell[0] as f32, cell[1] as f32, cell[2] as f32) + Vec3::splat(0.5)) * self.config.cell_size
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.config.dimensions[0] + x) as usize
    }

    /// Move the grid so it stays centred on `focus`, snapped to whole cells.
    ///
    /// Movement within `padding_cells` is ignored. On a move, history and
    /// current radiance shift with the grid; cells entering the volume start
    /// at zero. Returns the applied cell offset.
    pub fn recenter(&mut self, focus: Vec3) -> IVec3 {
        let size = self.config.cell_size;
        let target = ((focus - self.config.extent() * 0.5) / size).round();
        let current = (self.origin / size).round();
        let offset = (target - current).as_ivec3();

        let padding = self.config.padding_cells as i32;
        if offset.abs().max_element() <= padding {
            return IVec3::ZERO;
        }

        self.shift(offset);
        self.origin = target * size;
        self.refresh_slice_bounds();
        self.stats.recenters += 1;
        log::debug!("radiance grid recentred by {:?}", offset);
        offset
    }

    fn shift(&mut self, offset: IVec3) {
        let [dx, dy, dz] = self.config.dimensions;
        let dims = IVec3::new(dx as i32, dy as i32, dz as i32);
        let old: Vec<(Vec<Sh9>, Vec<Sh9>)> = self
            .slices
            .iter()
            .map(|s| (s.history.clone(), s.current.clone()))
            .collect();

        for z in 0..dz {
            for y in 0..dy {
                for x in 0..dx {
                    let source = IVec3::new(x as i32, y as i32, z as i32) + offset;
                    let inside = source.cmpge(IVec3::ZERO).all() && source.cmplt(dims).all();
                    let i = self.index(x, y);
                    let slice = &mut self.slices[z as usize];
                    if inside {
                        let j = (source.y * dims.x + source.x) as usize;
                        let (history, current) = &old[source.z as usize];
                        slice.history[i] = history[j];
                        slice.current[i] = current[j];
                    } else {
                        slice.history[i] = Sh9::ZERO;
                        slice.current[i] = Sh9::ZERO;
                    }
                }
            }
        }
    }

    /// Whether a new cycle should be scheduled at `frame`
    pub fn cycle_due(&self, frame: FrameId) -> bool {
        match self.last_scheduled {
            None => true,
            Some(_) if self.frames_seen <= self.config.warmup_frames => true,
            Some(last) => frame.saturating_sub(last) >= self.config.update_interval_frames as u64,
        }
    }

    /// Count a frame towards warmup
    pub fn tick(&mut self) {
        self.frames_seen = self.frames_seen.saturating_add(1);
    }

    /// Queue the seven tasks of a new cycle. Returns the cycle number, or
    /// `None` when the queue has no room for a whole cycle.
    pub fn schedule_cycle(&mut self, queue: &mut IndirectTaskQueue, frame: FrameId) -> Option<u64> {
        if queue.capacity() - queue.len() < IndirectTaskKind::ALL.len() {
            log::warn!(
                "indirect task queue full ({} of {}), cycle not scheduled",
                queue.len(),
                queue.capacity()
            );
            return None;
        }

        let cycle = self.next_cycle;
        let slices = 0..self.slice_count();
        for kind in IndirectTaskKind::ALL {
            let range = if kind.is_sliced() {
                slices.clone()
            } else if kind == IndirectTaskKind::ReassignRsms {
                0..1
            } else {
                // Sized by ReassignRsms
                0..0
            };
            if let Err(task) = queue.push(IndirectLightingTask::new(kind, cycle, frame, range)) {
                log::warn!("indirect task {} of cycle {} rejected", task.kind, task.cycle);
            }
        }

        self.next_cycle += 1;
        self.last_scheduled = Some(frame);
        self.stats.cycles_scheduled += 1;
        Some(cycle)
    }

    /// Drain queued tasks until the queue is empty or the budget runs out.
    ///
    /// Recoverable fill errors skip that RSM. A frame-fatal error stops the
    /// drain with the failed unit still pending.
    pub fn run_tasks(
        &mut self,
        queue: &mut IndirectTaskQueue,
        budget: &GridBudget,
        frame: FrameId,
        source: &mut dyn RsmSource,
    ) -> LightingResult<DrainReport> {
        let started = Instant::now();
        let mut report = DrainReport::default();

        loop {
            let Some(task) = queue.front_mut() else {
                break;
            };
            if task.due_frame > frame {
                break;
            }

            if !task.is_complete() {
                if report.units > 0 && budget.exhausted(report.units, started) {
                    report.budget_exhausted = true;
                    break;
                }

                let (kind, cycle, unit) = (task.kind, task.cycle, task.cursor);
                match kind {
                    IndirectTaskKind::ReassignRsms => {
                        let fills = source.reassign()?;
                        if let Some(fill) = queue.get_mut(cycle, IndirectTaskKind::FillRsms) {
                            fill.range = 0..fills;
                            fill.cursor = 0;
                        }
                    }
                    IndirectTaskKind::FillRsms => {
                        if let Err(err) = source.fill(unit) {
                            if !err.is_recoverable() {
                                return Err(err);
                            }
                            log::warn!("RSM fill {} skipped: {}", unit, err);
                            report.skipped_fills += 1;
                        }
                    }
                    IndirectTaskKind::InjectRsms => self.inject(unit, source.samples()),
                    IndirectTaskKind::GatherRsms => self.gather(unit),
                    IndirectTaskKind::ReprojectGrid => self.reproject(unit),
                    IndirectTaskKind::Bounce => self.bounce(unit),
                    IndirectTaskKind::Propagate => self.propagate(unit),
                }

                report.units += 1;
                if let Some(task) = queue.get_mut(cycle, kind) {
                    task.cursor += 1;
                }
            }

            if queue.front().is_some_and(|t| t.is_complete()) {
                if let Some(done) = queue.pop_front() {
                    log::trace!("indirect task {} of cycle {} complete", done.kind, done.cycle);
                    report.completed.push((done.cycle, done.kind));
                    if done.kind == IndirectTaskKind::Propagate {
                        report.cycle_completed = true;
                        self.stats.cycles_completed += 1;
                    }
                }
            }
        }

        self.stats.units_last_frame = report.units;
        Ok(report)
    }

    /// Splat samples landing in slice `z` as cosine lobes around their normal
    pub fn inject(&mut self, z: u32, samples: &[RsmSample]) {
        let mut injected = 0;
        for sample in samples {
            let Some([x, y, cz]) = self.cell_of(sample.position) else {
                continue;
            };
            if cz != z {
                continue;
            }
            let i = self.index(x, y);
            self.slices[z as usize].injected[i] += Sh9::cosine_lobe(sample.normal, sample.flux);
            injected += 1;
        }
        self.stats.samples_injected += injected;
    }

    /// Scale injected totals into `gathered` and clear the injection buffer
    pub fn gather(&mut self, z: u32) {
        let strength = self.config.light_strength;
        let slice = &mut self.slices[z as usize];
        for (gathered, injected) in slice.gathered.iter_mut().zip(slice.injected.iter_mut()) {
            *gathered = *injected * strength;
            *injected = Sh9::ZERO;
        }
    }

    /// Blend gathered radiance with history, clamp, and store as history
    pub fn reproject(&mut self, z: u32) {
        let weight = self.config.temporal_weight;
        let limit = self.config.sh_clamp;
        let slice = &mut self.slices[z as usize];
        for i in 0..slice.current.len() {
            let mut blended = slice.history[i].lerp(&slice.gathered[i], weight);
            blended.clamp(limit);
            slice.current[i] = blended;
            slice.history[i] = blended;
        }
    }

    /// Collect one bounce from the six neighbours of every cell in slice `z`.
    /// Reads only `current`.
    pub fn bounce(&mut self, z: u32) {
        const NEIGHBOURS: [IVec3; 6] = [
            IVec3::new(1, 0, 0),
            IVec3::new(-1, 0, 0),
            IVec3::new(0, 1, 0),
            IVec3::new(0, -1, 0),
            IVec3::new(0, 0, 1),
            IVec3::new(0, 0, -1),
        ];
        let [dx, dy, dz] = self.config.dimensions;
        let dims = IVec3::new(dx as i32, dy as i32, dz as i32);
        let scale = self.config.bounce_reflectivity / 6.0;

        let mut results = vec![Sh9::ZERO; self.config.cells_per_slice()];
        for y in 0..dy {
            for x in 0..dx {
                let cell = IVec3::new(x as i32, y as i32, z as i32);
                let mut total = Sh9::ZERO;
                for offset in NEIGHBOURS {
                    let n = cell + offset;
                    if n.cmplt(IVec3::ZERO).any() || n.cmpge(dims).any() {
                        continue;
                    }
                    // Light leaving the neighbour towards this cell
                    let toward = -offset.as_vec3();
                    let j = (n.y * dims.x + n.x) as usize;
                    let radiance = self.slices[n.z as usize].current[j].evaluate(toward).max(Vec3::ZERO);
                    total += Sh9::cosine_lobe(toward, radiance * scale);
                }
                results[self.index(x, y)] = total;
            }
        }
        self.slices[z as usize].bounce = results;
    }

    /// Add the bounce into `current` and clamp
    pub fn propagate(&mut self, z: u32) {
        let factor = self.config.propagation_factor;
        let limit = self.config.sh_clamp;
        let slice = &mut self.slices[z as usize];
        for (current, bounce) in slice.current.iter_mut().zip(slice.bounce.iter_mut()) {
            *current += *bounce * factor;
            current.clamp(limit);
            *bounce = Sh9::ZERO;
        }
    }

    /// Trilinearly interpolated radiance at a world position
    pub fn sample(&self, position: Vec3) -> Sh9 {
        let [dx, dy, dz] = self.config.dimensions;
        let local = (position - self.origin) / self.config.cell_size - Vec3::splat(0.5);
        let max = Vec3::new(dx as f32 - 1.0, dy as f32 - 1.0, dz as f32 - 1.0);
        let local = local.clamp(Vec3::ZERO, max);
        let base = local.floor();
        let t = local - base;

        let mut result = Sh9::ZERO;
        for corner in 0..8u32 {
            let step = Vec3::new((corner & 1) as f32, ((corner >> 1) & 1) as f32, ((corner >> 2) & 1) as f32);
            let p = (base + step).min(max);
            let weight = Vec3::select(step.cmpgt(Vec3::ZERO), t, Vec3::ONE - t);
            let w = weight.x * weight.y * weight.z;
            if w == 0.0 {
                continue;
            }
            let i = self.index(p.x as u32, p.y as u32);
            result += self.slices[p.z as usize].current[i] * w;
        }
        result
    }

    /// Irradiance at a world position for a surface normal
    pub fn irradiance(&self, position: Vec3, normal: Vec3) -> Vec3 {
        self.sample(position).irradiance(normal)
    }

    /// Largest absolute coefficient in the grid
    pub fn max_coefficient(&self) -> f32 {
        self.slices
            .iter()
            .flat_map(|s| s.current.iter())
            .map(Sh9::max_abs)
            .fold(0.0, f32::max)
    }

    /// Zero every buffer (scene change)
    pub fn clear(&mut self) {
        self.rebuild_slices();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        fills: u32,
        filled: Vec<u32>,
        samples: Vec<RsmSample>,
    }

    impl FixedSource {
        fn new(fills: u32) -> Self {
            let samples = (0..24)
                .map(|i| {
                    let f = i as f32;
                    RsmSample {
                        position: Vec3::new(f * 0.3 - 3.5, (f * 0.7) % 3.0 - 1.5, f * 0.29 - 3.5),
                        normal: Vec3::new(0.2, 1.0, f * 0.05).normalize(),
                        flux: Vec3::new(1.0, 0.8, 0.6) * (1.0 + f * 0.1),
                    }
                })
                .collect();
            Self {
                fills,
                filled: Vec::new(),
                samples,
            }
        }
    }

    impl RsmSource for FixedSource {
        fn reassign(&mut self) -> LightingResult<u32> {
            self.filled.clear();
            Ok(self.fills)
        }

        fn fill(&mut self, index: u32) -> LightingResult<()> {
            self.filled.push(index);
            Ok(())
        }

        fn samples(&self) -> &[RsmSample] {
            &self.samples
        }
    }

    fn small_config() -> RadianceGridConfig {
        RadianceGridConfig {
            dimensions: [4, 4, 4],
            cell_size: 2.0,
            temporal_weight: 0.5,
            ..Default::default()
        }
    }

    fn coefficients(grid: &RadianceGrid) -> Vec<Sh9> {
        grid.slices().iter().flat_map(|s| s.current().iter().copied()).collect()
    }

    #[test]
    fn test_cell_lookup() {
        let grid = RadianceGrid::new(small_config());
        assert_eq!(grid.origin(), Vec3::splat(-4.0));
        assert_eq!(grid.cell_of(Vec3::splat(-3.9)), Some([0, 0, 0]));
        assert_eq!(grid.cell_of(Vec3::new(3.9, 0.1, -0.1)), Some([3, 2, 1]));
        assert_eq!(grid.cell_of(Vec3::splat(5.0)), None);
        assert_eq!(grid.cell_center([0, 0, 0]), Vec3::splat(-3.0));
    }

    #[test]
    fn test_full_cycle_runs_in_order() {
        let mut grid = RadianceGrid::new(small_config());
        let mut queue = IndirectTaskQueue::default();
        let mut source = FixedSource::new(2);

        grid.schedule_cycle(&mut queue, 0).unwrap();
        let report = grid
            .run_tasks(&mut queue, &GridBudget::unlimited(), 0, &mut source)
            .unwrap();

        let kinds: Vec<_> = report.completed.iter().map(|(_, k)| *k).collect();
        assert_eq!(kinds, IndirectTaskKind::ALL.to_vec());
        assert!(report.cycle_completed);
        assert_eq!(source.filled, vec![0, 1]);
        assert_eq!(report.units, 1 + 2 + 5 * 4);
        assert!(queue.is_empty());
        assert!(grid.max_coefficient() > 0.0);
    }

    #[test]
    fn test_time_sliced_matches_uncapped() {
        let mut reference = RadianceGrid::new(small_config());
        let mut queue = IndirectTaskQueue::default();
        let mut source = FixedSource::new(2);
        for cycle in 0..2 {
            reference.schedule_cycle(&mut queue, cycle).unwrap();
            reference
                .run_tasks(&mut queue, &GridBudget::unlimited(), cycle, &mut source)
                .unwrap();
        }

        let mut sliced = RadianceGrid::new(small_config());
        let mut queue = IndirectTaskQueue::default();
        let mut source = FixedSource::new(2);
        let budget = GridBudget::units(8);
        let mut frame = 0;
        for _ in 0..2 {
            sliced.schedule_cycle(&mut queue, frame).unwrap();
            let mut frames = 0;
            loop {
                let report = sliced.run_tasks(&mut queue, &budget, frame, &mut source).unwrap();
                frame += 1;
                frames += 1;
                assert!(report.units <= 8);
                if report.cycle_completed {
                    break;
                }
                assert!(report.budget_exhausted);
            }
            // 23 units at 8 per frame
            assert_eq!(frames, 3);
        }

        assert_eq!(coefficients(&sliced), coefficients(&reference));
    }

    #[test]
    fn test_budget_runs_at_least_one_unit() {
        let mut grid = RadianceGrid::new(small_config());
        let mut queue = IndirectTaskQueue::default();
        let mut source = FixedSource::new(0);
        grid.schedule_cycle(&mut queue, 0).unwrap();

        let zero_time = GridBudget {
            max_units: None,
            max_time_ms: Some(0.0),
        };
        let report = grid.run_tasks(&mut queue, &zero_time, 0, &mut source).unwrap();
        assert_eq!(report.units, 1);
        assert_eq!(queue.front().map(|t| t.kind), Some(IndirectTaskKind::InjectRsms));
    }

    #[test]
    fn test_reprojection_clamps() {
        let mut config = small_config();
        config.sh_clamp = 0.5;
        config.temporal_weight = 1.0;
        let mut grid = RadianceGrid::new(config);
        let hot = RsmSample {
            position: Vec3::new(0.5, 0.5, 0.5),
            normal: Vec3::Y,
            flux: Vec3::splat(1000.0),
        };
        grid.inject(2, &[hot]);
        grid.gather(2);
        grid.reproject(2);
        assert!(grid.max_coefficient() <= 0.5);
        assert!(grid.max_coefficient() > 0.0);
    }

    #[test]
    fn test_bounce_spreads_to_neighbours() {
        let mut config = small_config();
        config.temporal_weight = 1.0;
        let mut grid = RadianceGrid::new(config);
        let sample = RsmSample {
            position: Vec3::new(0.5, 0.5, 0.5),
            normal: Vec3::X,
            flux: Vec3::ONE,
        };
        grid.inject(2, &[sample]);
        for z in 0..4 {
            grid.gather(z);
            grid.reproject(z);
        }
        let neighbour = grid.index(3, 2);
        assert!(grid.slices()[2].current()[neighbour].is_zero());

        for z in 0..4 {
            grid.bounce(z);
        }
        for z in 0..4 {
            grid.propagate(z);
        }
        assert!(!grid.slices()[2].current()[neighbour].is_zero());
    }

    #[test]
    fn test_recenter_shifts_history() {
        let mut grid = RadianceGrid::new(small_config());
        let sample = RsmSample {
            position: Vec3::new(2.5, 0.5, 0.5),
            normal: Vec3::Y,
            flux: Vec3::ONE,
        };
        let cell = grid.cell_of(sample.position).unwrap();
        grid.inject(cell[2], &[sample]);
        grid.gather(cell[2]);
        grid.reproject(cell[2]);
        let before = grid.sample(grid.cell_center(cell));

        // Within padding: no move
        assert_eq!(grid.recenter(Vec3::new(1.0, 0.0, 0.0)), IVec3::ZERO);

        let offset = grid.recenter(Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(offset, IVec3::new(2, 0, 0));
        assert_eq!(grid.origin(), Vec3::new(0.0, -4.0, -4.0));
        // Same world position, same radiance
        let moved = grid.cell_of(sample.position).unwrap();
        assert_eq!(moved, [cell[0] - 2, cell[1], cell[2]]);
        assert_eq!(grid.sample(grid.cell_center(moved)), before);
        assert_eq!(grid.stats().recenters, 1);
    }

    #[test]
    fn test_cycle_schedule_cadence() {
        let mut config = small_config();
        config.warmup_frames = 1;
        config.update_interval_frames = 3;
        let mut grid = RadianceGrid::new(config);
        let mut queue = IndirectTaskQueue::default();

        assert!(grid.cycle_due(0));
        grid.tick();
        grid.schedule_cycle(&mut queue, 0);
        assert!(grid.cycle_due(1));
        grid.tick();
        grid.tick();
        grid.schedule_cycle(&mut queue, 1);
        assert!(!grid.cycle_due(2));
        assert!(grid.cycle_due(4));
        assert_eq!(queue.len(), 14);
    }

    #[test]
    fn test_schedule_rejected_when_queue_full() {
        let mut grid = RadianceGrid::new(small_config());
        let mut queue = IndirectTaskQueue::with_capacity(10);
        assert!(grid.schedule_cycle(&mut queue, 0).is_some());
        assert!(grid.schedule_cycle(&mut queue, 1).is_none());
        assert_eq!(queue.len(), 7);
    }

    #[test]
    fn test_config_json() {
        let config = small_config().with_budget(GridBudget::units(4));
        let json = serde_json::to_string(&config).unwrap();
        let restored: RadianceGridConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
