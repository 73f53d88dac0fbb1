//! Per-pattern statistics over the tasks it has produced.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::pattern::RecurringTask;
use super::task::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub overdue: usize,

    /// Percentage of tasks completed (0.0 ..= 100.0).
    pub completion_rate: f64,

    /// Mean hours from creation to completion over completed tasks; 0.0 when none.
    pub avg_completion_time_hours: f64,

    pub tasks_generated: u32,
    pub next_generation_date: Option<NaiveDate>,
}

impl PatternStats {
    pub fn collect(pattern: &RecurringTask, tasks: &[Task], today: NaiveDate) -> Self {
        let mut completed = 0;
        let mut pending = 0;
        let mut in_progress = 0;
        let mut overdue = 0;
        let mut completion_hours = Vec::new();

        for task in tasks {
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Pending => pending += 1,
                TaskStatus::InProgress => in_progress += 1,
                TaskStatus::Cancelled => {}
            }
            if task.is_overdue(today) {
                overdue += 1;
            }
            if let Some(done) = task.completed_at {
                let secs = (done - task.created_at).num_seconds().max(0);
                completion_hours.push(secs as f64 / 3600.0);
            }
        }

        let total = tasks.len();
        let completion_rate = if total == 0 {
            0.0
        } else {
            round2(completed as f64 * 100.0 / total as f64)
        };
        let avg_completion_time_hours = if completion_hours.is_empty() {
            0.0
        } else {
            round2(completion_hours.iter().sum::<f64>() / completion_hours.len() as f64)
        };

        Self {
            total,
            completed,
            pending,
            in_progress,
            overdue,
            completion_rate,
            avg_completion_time_hours,
            tasks_generated: pattern.tasks_generated,
            next_generation_date: pattern.next_generation_date,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
