//! Indirect lighting task queue
//!
//! A grid update cycle is seven tagged tasks that always run in the same
//! relative order. The queue keeps tasks sorted by `(cycle, kind)`, so a
//! cycle scheduled while an older one is still draining queues up behind it.
//! Each task carries a cursor over its range (RSM owners or grid slices);
//! a task interrupted by the frame budget resumes from its cursor.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use umbra_core::FrameId;

/// Kind of indirect lighting task, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndirectTaskKind {
    ReassignRsms,
    FillRsms,
    InjectRsms,
    GatherRsms,
    ReprojectGrid,
    Bounce,
    Propagate,
}

impl IndirectTaskKind {
    /// Every kind in execution order
    pub const ALL: [IndirectTaskKind; 7] = [
        IndirectTaskKind::ReassignRsms,
        IndirectTaskKind::FillRsms,
        IndirectTaskKind::InjectRsms,
        IndirectTaskKind::GatherRsms,
        IndirectTaskKind::ReprojectGrid,
        IndirectTaskKind::Bounce,
        IndirectTaskKind::Propagate,
    ];

    /// Whether the task iterates grid slices
    pub fn is_sliced(self) -> bool {
        !matches!(self, Self::ReassignRsms | Self::FillRsms)
    }
}

impl fmt::Display for IndirectTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReassignRsms => "ReassignRSMs",
            Self::FillRsms => "FillRSMs",
            Self::InjectRsms => "InjectRSMs",
            Self::GatherRsms => "GatherRSMs",
            Self::ReprojectGrid => "ReprojectGrid",
            Self::Bounce => "Bounce",
            Self::Propagate => "Propagate",
        };
        f.write_str(name)
    }
}

/// One queued task
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndirectLightingTask {
    pub kind: IndirectTaskKind,
    pub cycle: u64,
    /// Earliest frame the task may run
    pub due_frame: FrameId,
    /// Units to process: RSM owner indices or slice indices
    pub range: Range<u32>,
    /// Next unit to process
    pub cursor: u32,
}

impl IndirectLightingTask {
    pub fn new(kind: IndirectTaskKind, cycle: u64, due_frame: FrameId, range: Range<u32>) -> Self {
        let cursor = range.start;
        Self {
            kind,
            cycle,
            due_frame,
            range,
            cursor,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.range.end
    }

    pub fn remaining(&self) -> u32 {
        self.range.end.saturating_sub(self.cursor)
    }

    fn key(&self) -> (u64, IndirectTaskKind) {
        (self.cycle, self.kind)
    }
}

/// Bounded, ordered task queue
#[derive(Clone, Debug)]
pub struct IndirectTaskQueue {
    tasks: VecDeque<IndirectLightingTask>,
    capacity: usize,
    rejected: u64,
}

impl Default for IndirectTaskQueue {
    fn default() -> Self {
        Self::with_capacity(32)
    }
}

impl IndirectTaskQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            rejected: 0,
        }
    }

    /// Insert in `(cycle, kind)` order.
    ///
    /// A task with the same key is a duplicate and is silently dropped.
    /// When full the task is rejected and handed back.
    pub fn push(&mut self, task: IndirectLightingTask) -> Result<(), IndirectLightingTask> {
        if self.tasks.iter().any(|t| t.key() == task.key()) {
            return Ok(());
        }
        if self.tasks.len() >= self.capacity {
            self.rejected += 1;
            return Err(task);
        }
        let position = self
            .tasks
            .iter()
            .position(|t| t.key() > task.key())
            .unwrap_or(self.tasks.len());
        self.tasks.insert(position, task);
        Ok(())
    }

    pub fn front(&self) -> Option<&IndirectLightingTask> {
        self.tasks.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut IndirectLightingTask> {
        self.tasks.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<IndirectLightingTask> {
        self.tasks.pop_front()
    }

    /// Find a queued task by key
    pub fn get_mut(&mut self, cycle: u64, kind: IndirectTaskKind) -> Option<&mut IndirectLightingTask> {
        self.tasks.iter_mut().find(|t| t.cycle == cycle && t.kind == kind)
    }

    /// Cycle currently at the head
    pub fn current_cycle(&self) -> Option<u64> {
        self.tasks.front().map(|t| t.cycle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndirectLightingTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes rejected because the queue was full
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(kind: IndirectTaskKind, cycle: u64) -> IndirectLightingTask {
        IndirectLightingTask::new(kind, cycle, 0, 0..4)
    }

    #[test]
    fn test_kinds_sorted_in_execution_order() {
        let mut sorted = IndirectTaskKind::ALL;
        sorted.sort();
        assert_eq!(sorted, IndirectTaskKind::ALL);
        assert!(!IndirectTaskKind::FillRsms.is_sliced());
        assert!(IndirectTaskKind::Bounce.is_sliced());
    }

    #[test]
    fn test_push_orders_by_cycle_then_kind() {
        let mut queue = IndirectTaskQueue::default();
        for kind in IndirectTaskKind::ALL.iter().rev() {
            queue.push(task(*kind, 2)).unwrap();
        }
        queue.push(task(IndirectTaskKind::Propagate, 1)).unwrap();

        let order: Vec<_> = queue.iter().map(|t| (t.cycle, t.kind)).collect();
        assert_eq!(order[0], (1, IndirectTaskKind::Propagate));
        let cycle2: Vec<_> = order[1..].iter().map(|(_, k)| *k).collect();
        assert_eq!(cycle2, IndirectTaskKind::ALL.to_vec());
    }

    #[test]
    fn test_duplicates_dropped() {
        let mut queue = IndirectTaskQueue::default();
        queue.push(task(IndirectTaskKind::Bounce, 1)).unwrap();
        queue.push(task(IndirectTaskKind::Bounce, 1)).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_full_queue_rejects() {
        let mut queue = IndirectTaskQueue::with_capacity(2);
        queue.push(task(IndirectTaskKind::ReassignRsms, 1)).unwrap();
        queue.push(task(IndirectTaskKind::FillRsms, 1)).unwrap();
        let rejected = queue.push(task(IndirectTaskKind::InjectRsms, 1)).unwrap_err();
        assert_eq!(rejected.kind, IndirectTaskKind::InjectRsms);
        assert_eq!(queue.rejected(), 1);
    }

    #[test]
    fn test_cursor_progress() {
        let mut t = IndirectLightingTask::new(IndirectTaskKind::InjectRsms, 0, 0, 2..5);
        assert_eq!(t.remaining(), 3);
        t.cursor = 5;
        assert!(t.is_complete());
    }
}
