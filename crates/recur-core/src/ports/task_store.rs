//! TaskStore port - 生成済み Task の保存先
//!
//! # 設計原則
//! - `(recurring_task_id, due_date)` は一意。`insert` は重複を
//!   `StoreError::DuplicateOccurrence` で拒否する
//! - Task は生成後 pattern から独立している。`recurring_task_id` は監査・統計用

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::errors::StoreError;
use crate::domain::ids::{PatternId, TaskId};
use crate::domain::task::{Task, TaskStatus};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn find_occurrence(
        &self,
        pattern_id: PatternId,
        due_date: NaiveDate,
    ) -> Result<Option<Task>, StoreError>;

    /// Tasks of one pattern, ordered by due date.
    async fn find_by_pattern(&self, pattern_id: PatternId) -> Result<Vec<Task>, StoreError>;

    async fn insert(&self, task: Task) -> Result<Task, StoreError>;

    async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task, StoreError>;

    /// Returns how many tasks were deleted.
    async fn delete_by_pattern(&self, pattern_id: PatternId) -> Result<usize, StoreError>;
}
