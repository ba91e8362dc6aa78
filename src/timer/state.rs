use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TimeRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
}

/// Live binding of the clock to one task. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub task_id: Option<String>,
    /// Title snapshot taken at start; later renames don't show up here.
    pub task_name: Option<String>,
    pub elapsed_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// Bumped on every start and stop. Ticks and bridge requests carry the
    /// generation they were issued for, and stale ones are dropped.
    #[serde(skip)]
    pub generation: u64,
}

/// Result of leaving `Running`: the record to hand to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub task_id: String,
    pub record: TimeRecord,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn is_running_for(&self, task_id: &str) -> bool {
        self.is_running() && self.task_id.as_deref() == Some(task_id)
    }

    /// Enters `Running` and returns the new generation.
    pub fn begin(
        &mut self,
        task_id: String,
        task_name: String,
        initial_seconds: u64,
        started_at: DateTime<Utc>,
    ) -> u64 {
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            status: TimerStatus::Running,
            task_id: Some(task_id),
            task_name: Some(task_name),
            elapsed_seconds: initial_seconds,
            started_at: Some(started_at),
            generation,
        };
        generation
    }

    /// Returns false for ticks from an earlier run or after a stop.
    pub fn apply_tick(&mut self, generation: u64, seconds: u64) -> bool {
        if !self.is_running() || self.generation != generation {
            return false;
        }
        self.elapsed_seconds = seconds;
        true
    }

    /// Leaves `Running`, producing exactly one record. Returns `None` when
    /// already idle.
    pub fn finish(&mut self, final_seconds: u64, stopped_at: DateTime<Utc>) -> Option<Completed> {
        if !self.is_running() {
            return None;
        }

        let seconds = final_seconds.max(self.elapsed_seconds);
        let task_id = self.task_id.take()?;
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            generation,
            ..Self::default()
        };

        Some(Completed {
            task_id,
            record: TimeRecord {
                timestamp: stopped_at,
                seconds,
            },
        })
    }
}
