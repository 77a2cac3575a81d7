//! Recording driver
//!
//! A headless [`RenderDriver`] that tracks every surface, state object,
//! submission and constant upload in memory. Used to run the lighting
//! pipeline without a GPU and to inspect what it asked for.

use std::collections::{BTreeMap, HashMap, HashSet};

use umbra_core::{DriverError, DriverResult, SurfaceHandle};

use crate::driver::{ConstantSlot, DrawSubmission, RenderDriver};
use crate::format::{SurfaceDesc, SurfaceFormat};
use crate::state::{StateDesc, StateHandle};

/// Counters kept by the recording driver
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub surfaces_created: u64,
    pub surfaces_destroyed: u64,
    pub states_created: u64,
    pub submissions: u64,
    pub constant_uploads: u64,
    pub failed_submissions: u64,
}

/// In-memory render driver
#[derive(Debug, Default)]
pub struct RecordingDriver {
    next_handle: u64,
    surfaces: BTreeMap<SurfaceHandle, SurfaceDesc>,
    states: Vec<StateDesc>,
    submissions: Vec<DrawSubmission>,
    constants: HashMap<ConstantSlot, Vec<u8>>,
    unsupported: HashSet<SurfaceFormat>,
    pending_failures: u32,
    stats: RecordingStats,
}

impl RecordingDriver {
    /// Create a driver that supports every format
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a format as unsupported
    pub fn without_format(mut self, format: SurfaceFormat) -> Self {
        self.unsupported.insert(format);
        self
    }

    /// Make the next `count` submissions fail with [`DriverError::Submission`]
    pub fn fail_next_submissions(&mut self, count: u32) {
        self.pending_failures = count;
    }

    /// Currently live surfaces
    pub fn live_surfaces(&self) -> impl Iterator<Item = (&SurfaceHandle, &SurfaceDesc)> {
        self.surfaces.iter()
    }

    pub fn live_surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Total bytes of live surfaces
    pub fn live_bytes(&self) -> u64 {
        self.surfaces.values().map(SurfaceDesc::byte_size).sum()
    }

    pub fn surface_desc(&self, surface: SurfaceHandle) -> Option<&SurfaceDesc> {
        self.surfaces.get(&surface)
    }

    /// All successful submissions since the last [`Self::clear_submissions`]
    pub fn submissions(&self) -> &[DrawSubmission] {
        &self.submissions
    }

    pub fn clear_submissions(&mut self) {
        self.submissions.clear();
    }

    /// Last data uploaded to a constant slot
    pub fn constants(&self, slot: ConstantSlot) -> Option<&[u8]> {
        self.constants.get(&slot).map(Vec::as_slice)
    }

    /// Descriptors of every state object created, in creation order
    pub fn created_states(&self) -> &[StateDesc] {
        &self.states
    }

    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }
}

impl RenderDriver for RecordingDriver {
    fn create_surface(&mut self, desc: &SurfaceDesc) -> DriverResult<SurfaceHandle> {
        if self.unsupported.contains(&desc.format) {
            return Err(DriverError::UnsupportedFormat(format!("{:?}", desc.format)));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(DriverError::SurfaceCreation(format!(
                "zero sized surface {}x{}",
                desc.width, desc.height
            )));
        }
        self.next_handle += 1;
        let handle = SurfaceHandle(self.next_handle);
        self.surfaces.insert(handle, *desc);
        self.stats.surfaces_created += 1;
        log::trace!("create {} {:?}", handle, desc);
        Ok(handle)
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) -> DriverResult<()> {
        match self.surfaces.remove(&surface) {
            Some(_) => {
                self.stats.surfaces_destroyed += 1;
                Ok(())
            }
            None => Err(DriverError::UnknownSurface(surface.0)),
        }
    }

    fn supports_format(&self, format: SurfaceFormat) -> bool {
        !self.unsupported.contains(&format)
    }

    fn create_state(&mut self, desc: &StateDesc) -> DriverResult<StateHandle> {
        self.states.push(*desc);
        self.stats.states_created += 1;
        Ok(StateHandle(self.states.len() as u64))
    }

    fn submit(&mut self, submission: &DrawSubmission) -> DriverResult<()> {
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            self.stats.failed_submissions += 1;
            return Err(DriverError::Submission(format!(
                "injected failure on '{}'",
                submission.label
            )));
        }
        for target in &submission.targets {
            if !self.surfaces.contains_key(target) {
                return Err(DriverError::UnknownSurface(target.0));
            }
        }
        self.stats.submissions += 1;
        self.submissions.push(submission.clone());
        Ok(())
    }

    fn upload_constants(&mut self, slot: ConstantSlot, data: &[u8]) -> DriverResult<()> {
        self.constants.insert(slot, data.to_vec());
        self.stats.constant_uploads += 1;
        Ok(())
    }
}
