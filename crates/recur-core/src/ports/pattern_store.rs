//! PatternStore port - RecurringTask の正本（source of truth）
//!
//! # 設計原則
//! - `update` は条件付き書き込み（楽観ロック）。保存済みの `version` と一致した時だけ成功し、
//!   成功時に `version` を 1 進める
//! - 負けた側は `StoreError::VersionConflict` を受け取り、読み直してリトライする

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::errors::StoreError;
use crate::domain::ids::PatternId;
use crate::domain::pattern::RecurringTask;

#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn get(&self, id: PatternId) -> Result<Option<RecurringTask>, StoreError>;

    /// Insert a new pattern. Fails with `Backend` if the id is already taken.
    async fn insert(&self, pattern: RecurringTask) -> Result<RecurringTask, StoreError>;

    /// Replace the stored pattern if its version still equals `pattern.version`.
    /// Returns the stored copy with the bumped version.
    async fn update(&self, pattern: RecurringTask) -> Result<RecurringTask, StoreError>;

    /// Returns whether a pattern was removed.
    async fn delete(&self, id: PatternId) -> Result<bool, StoreError>;

    /// Non-paused patterns whose cursor is on or before `today`.
    async fn find_due(&self, today: NaiveDate) -> Result<Vec<RecurringTask>, StoreError>;

    async fn find_all(&self) -> Result<Vec<RecurringTask>, StoreError>;
}
