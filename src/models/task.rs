//! Task data model.
//!
//! Field names serialize in camelCase, which is also the layout of the
//! stored collection document.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Sort key for list views: high first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("invalid priority '{value}' (expected high, medium or low)"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BugFix,
    Feature,
    Documentation,
    Enhancement,
    Security,
    Performance,
    Testing,
    UiUx,
    Devops,
    #[default]
    Development,
    Design,
    Research,
    Meeting,
    Planning,
    Other,
}

impl Category {
    /// Catalogue order. The predictor's numeric category ids index into this.
    pub const ALL: [Category; 15] = [
        Category::BugFix,
        Category::Feature,
        Category::Documentation,
        Category::Enhancement,
        Category::Security,
        Category::Performance,
        Category::Testing,
        Category::UiUx,
        Category::Devops,
        Category::Development,
        Category::Design,
        Category::Research,
        Category::Meeting,
        Category::Planning,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::BugFix => "bug_fix",
            Category::Feature => "feature",
            Category::Documentation => "documentation",
            Category::Enhancement => "enhancement",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Testing => "testing",
            Category::UiUx => "ui_ux",
            Category::Devops => "devops",
            Category::Development => "development",
            Category::Design => "design",
            Category::Research => "research",
            Category::Meeting => "meeting",
            Category::Planning => "planning",
            Category::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::BugFix => "Bug Fix",
            Category::Feature => "Feature Request",
            Category::Documentation => "Documentation",
            Category::Enhancement => "Enhancement",
            Category::Security => "Security",
            Category::Performance => "Performance",
            Category::Testing => "Testing",
            Category::UiUx => "UI/UX",
            Category::Devops => "DevOps",
            Category::Development => "Development",
            Category::Design => "Design",
            Category::Research => "Research",
            Category::Meeting => "Meeting",
            Category::Planning => "Planning",
            Category::Other => "Other",
        }
    }

    /// Out-of-range ids map to `Other`.
    pub fn from_index(index: i64) -> Category {
        usize::try_from(index)
            .ok()
            .and_then(|i| Category::ALL.get(i).copied())
            .unwrap_or(Category::Other)
    }

    pub fn index(&self) -> usize {
        Category::ALL
            .iter()
            .position(|c| c == self)
            .unwrap_or(Category::ALL.len() - 1)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown category '{value}'"))
    }
}

/// One stop event. `seconds` is the cumulative elapsed count at the stop,
/// not the length of the last run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRecord {
    pub timestamp: DateTime<Utc>,
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u64>,
    #[serde(default)]
    pub time_records: Vec<TimeRecord>,
}

impl Task {
    /// Seconds a new timer session for this task starts from.
    pub fn elapsed_seconds(&self) -> u64 {
        self.time_spent.unwrap_or(0)
    }

    pub fn last_record(&self) -> Option<&TimeRecord> {
        self.time_records.last()
    }

    /// Appends a stop record and refreshes the denormalized total.
    ///
    /// The history stays sorted by timestamp: a record stamped before the
    /// previous one (wall clock stepped backwards) is clamped to it.
    pub fn record_stop(&mut self, mut record: TimeRecord) -> TimeRecord {
        if let Some(last) = self.time_records.last() {
            if record.timestamp < last.timestamp {
                record.timestamp = last.timestamp;
            }
        }
        self.time_records.push(record);
        self.time_spent = Some(record.seconds);
        record
    }
}

/// User input for a new task. Id, timestamps and history are assigned by
/// the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
}

/// Replacement for an existing task's editable fields.
///
/// Time fields are only written when present, so edit forms that never
/// carried them leave the history untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskEdit {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_records: Option<Vec<TimeRecord>>,
}

impl From<&Task> for TaskEdit {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            category: task.category,
            time_spent: None,
            time_records: None,
        }
    }
}
