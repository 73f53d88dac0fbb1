//! Materialized task instances.
//!
//! Once created, a task's lifecycle is independent of its pattern; it only
//! keeps `recurring_task_id` for auditing and statistics.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PatternId, TaskId};
use super::pattern::Priority;

/// Task status.
///
/// State transitions:
/// - Pending -> InProgress -> Completed
/// - Pending / InProgress -> Cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Everything needed to insert a task, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub recurring_task_id: PatternId,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub tags: Vec<String>,
    pub estimated_minutes: Option<u32>,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub created_by: String,
    pub team_id: Option<String>,
}

/// A persisted task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub recurring_task_id: PatternId,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,

    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub created_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn from_draft(id: TaskId, draft: TaskDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            recurring_task_id: draft.recurring_task_id,
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            assigned_to: draft.assigned_to,
            tags: draft.tags,
            estimated_minutes: draft.estimated_minutes,
            due_date: draft.due_date,
            status: draft.status,
            created_by: draft.created_by,
            team_id: draft.team_id,
            created_at,
            completed_at: None,
        }
    }

    /// Move to `status`. Completing stamps `completed_at`; leaving
    /// `Completed` clears it.
    pub fn transition(&mut self, status: TaskStatus, at: DateTime<Utc>) {
        self.completed_at = match status {
            TaskStatus::Completed => Some(self.completed_at.unwrap_or(at)),
            _ => None,
        };
        self.status = status;
    }

    /// Past its due date without reaching a terminal state.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due_date < today
    }
}
