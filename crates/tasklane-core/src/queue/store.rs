//! Task & Queue Store: the four ordered collections and run counters.
//!
//! Pure data plus lookup. No locking here; the engine owns the store behind
//! its single mutex and is the only caller of the mutating methods.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{TaskRecord, TaskState};
use crate::domain::{AdmissionMode, Counts, Placement, SequenceId, Task};

/// Names of the four collections, in lookup scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl Collection {
    pub const SCAN_ORDER: [Collection; 4] = [
        Collection::Pending,
        Collection::InFlight,
        Collection::Succeeded,
        Collection::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Pending => "pending",
            Collection::InFlight => "in_flight",
            Collection::Succeeded => "succeeded",
            Collection::Failed => "failed",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a caller names a task: by id, by the task's name, or by identity.
pub enum TaskKey<P> {
    Id(SequenceId),
    Name(String),
    Task(Arc<Task<P>>),
}

impl<P> TaskKey<P> {
    fn matches(&self, record: &TaskRecord<P>) -> bool {
        match self {
            TaskKey::Id(id) => record.sequence_id == *id,
            TaskKey::Name(name) => record.task.name() == Some(name.as_str()),
            TaskKey::Task(task) => Arc::ptr_eq(task, &record.task),
        }
    }
}

impl<P> From<SequenceId> for TaskKey<P> {
    fn from(id: SequenceId) -> Self {
        TaskKey::Id(id)
    }
}

impl<P> From<u64> for TaskKey<P> {
    fn from(id: u64) -> Self {
        TaskKey::Id(SequenceId::new(id))
    }
}

impl<P> From<&str> for TaskKey<P> {
    fn from(name: &str) -> Self {
        TaskKey::Name(name.to_owned())
    }
}

impl<P> From<String> for TaskKey<P> {
    fn from(name: String) -> Self {
        TaskKey::Name(name)
    }
}

impl<P> From<&Arc<Task<P>>> for TaskKey<P> {
    fn from(task: &Arc<Task<P>>) -> Self {
        TaskKey::Task(Arc::clone(task))
    }
}

impl<P> fmt::Debug for TaskKey<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Id(id) => write!(f, "Id({id})"),
            TaskKey::Name(name) => write!(f, "Name({name:?})"),
            TaskKey::Task(task) => write!(f, "Task({:?})", task.name()),
        }
    }
}

/// Result of a lookup: where a task currently is.
pub struct TaskDescriptor<P> {
    pub task: Arc<Task<P>>,
    pub collection: Collection,
    pub position: usize,
    pub sequence_id: SequenceId,
    pub mode: AdmissionMode,
    pub state: TaskState,
    pub attempts: u32,
}

impl<P> TaskDescriptor<P> {
    fn of(record: &TaskRecord<P>, collection: Collection, position: usize) -> Self {
        Self {
            task: Arc::clone(&record.task),
            collection,
            position,
            sequence_id: record.sequence_id,
            mode: record.mode,
            state: record.state,
            attempts: record.attempts,
        }
    }
}

impl<P> Clone for TaskDescriptor<P> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            ..*self
        }
    }
}

impl<P> fmt::Debug for TaskDescriptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("task", &self.task)
            .field("collection", &self.collection)
            .field("position", &self.position)
            .field("sequence_id", &self.sequence_id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish()
    }
}

/// Sequence ids per collection, in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionsView {
    pub pending: Vec<SequenceId>,
    pub in_flight: Vec<SequenceId>,
    pub succeeded: Vec<SequenceId>,
    pub failed: Vec<SequenceId>,
}

pub struct QueueStore<P> {
    pending: VecDeque<TaskRecord<P>>,
    in_flight: Vec<TaskRecord<P>>,
    succeeded: Vec<TaskRecord<P>>,
    failed: Vec<TaskRecord<P>>,

    /// `|pending|` at the first start of a run; reset by clear/restart.
    start_count: Option<usize>,

    /// Registrations since construction or the last clear.
    total: usize,

    /// Next id to hand out. Survives `reset` so ids are never reused.
    next_id: SequenceId,

    restarts: u32,
}

impl<P> QueueStore<P> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            start_count: None,
            total: 0,
            next_id: SequenceId::new(0),
            restarts: 0,
        }
    }

    /// Register a task into `pending` and return its fresh id.
    pub fn insert(
        &mut self,
        task: Arc<Task<P>>,
        mode: AdmissionMode,
        placement: Placement,
    ) -> SequenceId {
        let id = self.next_id;
        self.next_id = id.next();
        self.total += 1;

        let record = TaskRecord::new(id, mode, task);
        match placement {
            Placement::Tail => self.pending.push_back(record),
            Placement::Head => self.pending.push_front(record),
        }
        id
    }

    pub fn pending_head(&self) -> Option<&TaskRecord<P>> {
        self.pending.front()
    }

    /// Representative of `inFlight` for admission decisions.
    pub fn in_flight_head(&self) -> Option<&TaskRecord<P>> {
        self.in_flight.first()
    }

    pub fn pop_pending(&mut self) -> Option<TaskRecord<P>> {
        self.pending.pop_front()
    }

    pub fn push_in_flight(&mut self, record: TaskRecord<P>) {
        self.in_flight.push(record);
    }

    pub fn in_flight_mut(&mut self, id: SequenceId) -> Option<&mut TaskRecord<P>> {
        self.in_flight.iter_mut().find(|r| r.sequence_id == id)
    }

    pub fn in_flight(&self) -> &[TaskRecord<P>] {
        &self.in_flight
    }

    /// Remove a record by id from the given collection.
    pub fn take(&mut self, collection: Collection, id: SequenceId) -> Option<TaskRecord<P>> {
        match collection {
            Collection::Pending => {
                let pos = self.pending.iter().position(|r| r.sequence_id == id)?;
                self.pending.remove(pos)
            }
            Collection::InFlight => take_from(&mut self.in_flight, id),
            Collection::Succeeded => take_from(&mut self.succeeded, id),
            Collection::Failed => take_from(&mut self.failed, id),
        }
    }

    /// Append a finished record to the matching log.
    pub fn push_finished(&mut self, record: TaskRecord<P>) {
        match record.state {
            TaskState::Succeeded => self.succeeded.push(record),
            _ => self.failed.push(record),
        }
    }

    /// First match in scan order: pending, inFlight, succeeded, failed.
    pub fn find(&self, key: &TaskKey<P>) -> Option<TaskDescriptor<P>> {
        Collection::SCAN_ORDER.iter().find_map(|&collection| {
            self.iter(collection)
                .enumerate()
                .find(|(_, record)| key.matches(record))
                .map(|(pos, record)| TaskDescriptor::of(record, collection, pos))
        })
    }

    fn iter(&self, collection: Collection) -> Box<dyn Iterator<Item = &TaskRecord<P>> + '_> {
        match collection {
            Collection::Pending => Box::new(self.pending.iter()),
            Collection::InFlight => Box::new(self.in_flight.iter()),
            Collection::Succeeded => Box::new(self.succeeded.iter()),
            Collection::Failed => Box::new(self.failed.iter()),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// `|pending| + |inFlight|`.
    pub fn remaining(&self) -> usize {
        self.pending.len() + self.in_flight.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn start_count(&self) -> Option<usize> {
        self.start_count
    }

    /// Records `|pending|` on the first call of a run; later calls keep it.
    pub fn mark_started(&mut self) -> usize {
        *self.start_count.get_or_insert(self.pending.len())
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn counts(&self) -> Counts {
        Counts {
            start: self.start_count,
            remaining: self.remaining(),
            finished: self.succeeded.len() + self.failed.len(),
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
            total: self.total,
        }
    }

    pub fn collections(&self) -> CollectionsView {
        let ids = |c: Collection| -> Vec<SequenceId> { self.iter(c).map(|r| r.sequence_id).collect() };
        CollectionsView {
            pending: ids(Collection::Pending),
            in_flight: ids(Collection::InFlight),
            succeeded: ids(Collection::Succeeded),
            failed: ids(Collection::Failed),
        }
    }

    /// A barrier shares `inFlight` with another task. Must never be true.
    pub fn barrier_conflict(&self) -> bool {
        self.in_flight.len() > 1 && self.in_flight.iter().any(|r| r.mode.is_barrier())
    }

    /// Drop every record and reset counters. The id source is kept.
    pub fn reset(&mut self) {
        let next_id = self.next_id;
        *self = Self::new();
        self.next_id = next_id;
    }

    /// Put processed tasks back into `pending` in original insertion order.
    ///
    /// Pending, in-flight and succeeded records are always re-enqueued; failed
    /// ones only when `exclude_errors` is false, otherwise they stay in the
    /// failed log. `start_count` is cleared.
    pub fn requeue_all(&mut self, exclude_errors: bool) {
        let mut records: Vec<TaskRecord<P>> = self
            .pending
            .drain(..)
            .chain(self.in_flight.drain(..))
            .chain(self.succeeded.drain(..))
            .collect();
        if !exclude_errors {
            records.append(&mut self.failed);
        }
        records.sort_by_key(|r| r.sequence_id);
        for record in &mut records {
            record.requeue();
        }

        self.pending = records.into();
        self.start_count = None;
        self.restarts += 1;
    }
}

impl<P> Default for QueueStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn take_from<P>(records: &mut Vec<TaskRecord<P>>, id: SequenceId) -> Option<TaskRecord<P>> {
    let pos = records.iter().position(|r| r.sequence_id == id)?;
    Some(records.remove(pos))
}
