//! Errors - エラー型と分類
//!
//! # 分類
//! - **Validation**: 不正な recurrence 定義や引数（呼び出し側で修正可能）
//! - **NotFound**: 存在しない pattern / task
//! - **ConcurrencyConflict**: 楽観ロックの競合（内部でリトライし、尽きた時だけ表に出る）
//! - **Store / StoreTimeout**: 永続化層の障害
//!
//! 生成の安全上限（safety cap）到達はエラーではなく、ログに残して部分結果を返す。

use chrono::NaiveDate;
use thiserror::Error;

use super::ids::{PatternId, SkipDateId, TaskId};

/// A recurrence definition or request argument was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("interval must be a positive integer, got {0}")]
    InvalidInterval(u32),

    #[error("interval {interval} exceeds the maximum of {max}")]
    IntervalTooLarge { interval: u32, max: u32 },

    #[error("days_of_week is required and must be non-empty for weekly patterns")]
    MissingDaysOfWeek,

    #[error("day of week {0} is out of range (expected 0..=6, 0 = Sunday)")]
    WeekdayOutOfRange(u8),

    #[error("day_of_month is required for monthly patterns")]
    MissingDayOfMonth,

    #[error("day_of_month {0} is out of range (expected -1 or 1..=31)")]
    DayOfMonthOutOfRange(i8),

    #[error("end_date {end} must be strictly after start_date {start}")]
    EndNotAfterStart { start: NaiveDate, end: NaiveDate },

    #[error("max_occurrences must be at least 1")]
    InvalidMaxOccurrences,

    #[error("count {requested} is outside the allowed range 1..={max}")]
    CountOutOfRange { requested: u32, max: u32 },

    #[error("pattern {0} is paused; resume it before generating tasks")]
    PatternPaused(PatternId),
}

/// Failures reported by a store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,

    /// Conditional write lost against a concurrent writer.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("task for {pattern_id} on {due_date} already exists")]
    DuplicateOccurrence {
        pattern_id: PatternId,
        due_date: NaiveDate,
    },

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the recurrence engine's operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("recurring task {0} not found")]
    PatternNotFound(PatternId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("skip date {0} not found")]
    SkipDateNotFound(SkipDateId),

    #[error("concurrent update on {pattern_id} did not settle after {attempts} attempts")]
    ConcurrencyConflict { pattern_id: PatternId, attempts: u32 },

    #[error("store call `{0}` timed out")]
    StoreTimeout(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::PatternNotFound(_)
                | EngineError::TaskNotFound(_)
                | EngineError::SkipDateNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn validation_errors_carry_actionable_detail() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let msg = ValidationError::EndNotAfterStart { start, end }.to_string();
        assert!(msg.contains("2024-01-10"));
        assert!(msg.contains("2024-01-01"));

        let msg = ValidationError::CountOutOfRange {
            requested: 11,
            max: 10,
        }
        .to_string();
        assert!(msg.contains("11"));
    }

    #[test]
    fn client_errors_are_classified() {
        let id = PatternId::from_ulid(Ulid::new());
        assert!(EngineError::PatternNotFound(id).is_client_error());
        assert!(EngineError::from(ValidationError::EmptyTitle).is_client_error());
        assert!(!EngineError::StoreTimeout("get").is_client_error());
        assert!(
            !EngineError::ConcurrencyConflict {
                pattern_id: id,
                attempts: 5
            }
            .is_client_error()
        );
    }
}
