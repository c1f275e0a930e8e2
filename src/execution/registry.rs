//! Execution registry
//!
//! In-memory table of every [`ExecutionRecord`], keyed by [`ExecutionId`].
//! The registry owns selection state and is the only thing a front end
//! observes. It holds non-`Send` observer callbacks, so the compiler keeps it
//! on the thread that created it; worker threads reach it only through
//! [`super::MainThreadHandle`].

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument};

use super::record::{ExecutionId, ExecutionRecord, ExecutionStatus};

/// What changed in the registry, delivered to every observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// A new record was appended
    Inserted(ExecutionId),
    /// An existing record was reset for a re-run
    Reset(ExecutionId),
    /// Output, status or end time of a record was written
    Updated(ExecutionId),
    /// The selected record changed (None = nothing selected)
    SelectionChanged(Option<ExecutionId>),
    /// Records were deleted
    Removed(Vec<ExecutionId>),
    /// Periodic refresh while something is running
    Tick,
}

/// Which path `upsert` took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Reset,
}

/// Handle returned by [`ExecutionRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Observer = Box<dyn FnMut(&RegistryChange)>;

pub struct ExecutionRegistry {
    /// Records in launch order
    records: Vec<ExecutionRecord>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
    /// Incremented on every notification
    revision: u64,
}

impl std::fmt::Debug for ExecutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRegistry")
            .field("records", &self.records)
            .field("observers", &self.observers.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            observers: Vec::new(),
            next_subscription: 0,
            revision: 0,
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Register an observer called after every change
    pub fn subscribe(&mut self, observer: impl FnMut(&RegistryChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns true if the subscription existed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    fn notify(&mut self, change: RegistryChange) {
        self.revision = self.revision.wrapping_add(1);
        for (_, observer) in self.observers.iter_mut() {
            observer(&change);
        }
    }

    /// Bumped on every notification; cheap change detection for pollers
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn get(&self, id: &ExecutionId) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.get(id).is_some()
    }

    pub fn selected(&self) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.is_selected)
    }

    pub fn running_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_running()).count()
    }

    pub fn running_ids(&self) -> Vec<ExecutionId> {
        self.records
            .iter()
            .filter(|r| r.is_running())
            .map(|r| r.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: &ExecutionId) -> Option<usize> {
        self.records.iter().position(|r| r.id == *id)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert a Running record, or reset the existing one in place.
    ///
    /// Both paths leave the same observable state: status Running, output
    /// `initial_output`, fresh start time, no end time.
    #[instrument(level = "debug", skip(self, initial_output), fields(execution_id = %id))]
    pub fn upsert(&mut self, id: ExecutionId, name: &str, initial_output: &str) -> UpsertOutcome {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            record.name = name.to_string();
            record.output = initial_output.to_string();
            record.status = ExecutionStatus::Running;
            record.start_time = Utc::now();
            record.end_time = None;
            record.run_count = record.run_count.saturating_add(1);
            debug!(run_count = record.run_count, "Reset execution record for re-run");
            self.notify(RegistryChange::Reset(id));
            return UpsertOutcome::Reset;
        }

        let mut record = ExecutionRecord::new(id, name.to_string(), initial_output.to_string());
        let only_record = self.records.is_empty();
        record.is_selected = only_record;
        self.records.push(record);
        debug!(total = self.records.len(), "Inserted execution record");
        self.notify(RegistryChange::Inserted(id));
        if only_record {
            self.notify(RegistryChange::SelectionChanged(Some(id)));
        }
        UpsertOutcome::Inserted
    }

    /// Tag the current run of `id` with the launch sequence its events carry.
    /// Bookkeeping only; observers are not notified.
    pub fn stamp_launch(&mut self, id: &ExecutionId, launch: u64) -> bool {
        match self.records.iter_mut().find(|r| r.id == *id) {
            Some(record) => {
                record.launch = launch;
                true
            }
            None => false,
        }
    }

    /// Apply a streamed update.
    ///
    /// `output` replaces the transcript (runners send cumulative text).
    /// Returns false when the update was dropped: unknown identity, or a
    /// record that already reached a terminal status.
    pub fn update(
        &mut self,
        id: &ExecutionId,
        output: String,
        status: Option<ExecutionStatus>,
        end_time: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == *id) else {
            error!(
                execution_id = %id,
                "Update for unknown execution identity dropped (correlation defect upstream)"
            );
            return false;
        };

        if record.status.is_terminal() {
            debug!(
                execution_id = %id,
                status = %record.status,
                late_status = ?status,
                "Ignoring update for an execution that already finished"
            );
            return false;
        }

        record.output = output;
        if let Some(status) = status {
            record.status = status;
        }
        if let Some(end_time) = end_time {
            record.end_time = Some(end_time);
        }
        if record.status.is_terminal() && record.end_time.is_none() {
            record.end_time = Some(Utc::now());
        }

        self.notify(RegistryChange::Updated(*id));
        true
    }

    /// Select exactly one record. No-op for unknown identities.
    pub fn select(&mut self, id: &ExecutionId) -> bool {
        if !self.contains(id) {
            debug!(execution_id = %id, "Select ignored for unknown execution");
            return false;
        }
        for record in self.records.iter_mut() {
            record.is_selected = record.id == *id;
        }
        self.notify(RegistryChange::SelectionChanged(Some(*id)));
        true
    }

    /// Delete one record, moving the selection if it pointed here
    pub fn remove(&mut self, id: &ExecutionId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let removed = self.records.remove(index);
        self.notify(RegistryChange::Removed(vec![removed.id]));
        if removed.is_selected {
            self.repair_selection();
        }
        true
    }

    /// Delete every record that is not Running. Returns how many were removed.
    pub fn clear_terminal(&mut self) -> usize {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.is_running());
        self.records = kept;

        if removed.is_empty() {
            return 0;
        }

        let selection_lost = removed.iter().any(|r| r.is_selected);
        let ids: Vec<ExecutionId> = removed.iter().map(|r| r.id).collect();
        let count = ids.len();
        self.notify(RegistryChange::Removed(ids));
        if selection_lost {
            self.repair_selection();
        }
        count
    }

    /// Empty the registry and clear selection
    pub fn remove_all(&mut self) -> usize {
        let ids: Vec<ExecutionId> = self.records.drain(..).map(|r| r.id).collect();
        let count = ids.len();
        if count > 0 {
            self.notify(RegistryChange::Removed(ids));
            self.notify(RegistryChange::SelectionChanged(None));
        }
        count
    }

    /// Periodic refresh. Observers hear about it only while something runs,
    /// which is what keeps elapsed-time displays ticking.
    pub fn tick(&mut self) -> bool {
        if self.running_count() == 0 {
            return false;
        }
        self.notify(RegistryChange::Tick);
        true
    }

    /// Select the first remaining record, or nothing when empty
    fn repair_selection(&mut self) {
        let next = self.records.first().map(|r| r.id);
        for (index, record) in self.records.iter_mut().enumerate() {
            record.is_selected = index == 0;
        }
        self.notify(RegistryChange::SelectionChanged(next));
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
