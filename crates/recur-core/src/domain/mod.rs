//! Domain model (IDs, patterns, tasks, the recurrence calculator, errors).
//!
//! - **ids**: ULID ベースの型付き ID
//! - **pattern**: RecurringTask エンティティと入力（PatternSpec / PatternPatch）
//! - **recurrence**: 純粋なカレンダー計算（次回日付、適格性判定、Task 下書き）
//! - **task**: 生成済み Task
//! - **stats**: pattern ごとの統計
//! - **errors**: エラー型と分類

pub mod errors;
pub mod ids;
pub mod pattern;
pub mod recurrence;
pub mod stats;
pub mod task;

pub use errors::{EngineError, StoreError, ValidationError};
pub use ids::{IdParseError, PatternId, SkipDateId, TaskId};
pub use pattern::{
    Frequency, LAST_DAY_OF_MONTH, MAX_INTERVAL, PatternPatch, PatternSpec, Priority, RecurrenceRule,
    RecurringTask, SkipDate, TaskTemplate,
};
pub use recurrence::Ineligible;
pub use stats::PatternStats;
pub use task::{Task, TaskDraft, TaskStatus};
