//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **RecurrenceService**: API 表面（create / update / pause / generate_now など）
//! - **Generator**: pattern 1 件分の Task 生成（冪等・楽観ロック・安全上限）
//! - **SchedulerLoop**: 定期 tick で due な pattern を掃く
//! - **Maintenance**: cursor の補完と自動 pause
//!
//! # 並行性
//! - pattern ごとの advisory lock（`PatternLocks`）でプロセス内の書き込みを直列化
//! - 書き込みは常に `version` 条件付き。負けたら読み直してリトライ

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::OwnedMutexGuard;
use tracing::warn;

use crate::domain::errors::{EngineError, StoreError};
use crate::domain::ids::PatternId;
use crate::domain::pattern::RecurringTask;
use crate::ports::{Clock, HolidayCalendar, IdGenerator, PatternStore, TaskStore};

pub mod builder;
pub mod generator;
pub mod maintenance;
pub mod scheduler_loop;
pub mod service;

pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::generator::Generator;
pub use self::maintenance::Maintenance;
pub use self::scheduler_loop::{SchedulerLoop, SchedulerState};
pub use self::service::{DeleteOptions, RecurrenceService};

/// Per-pattern advisory locks. Cross-pattern work never contends.
#[derive(Default)]
pub(crate) struct PatternLocks {
    locks: Mutex<HashMap<PatternId, Arc<tokio::sync::Mutex<()>>>>,
}

impl PatternLocks {
    pub(crate) async fn acquire(&self, id: PatternId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    pub(crate) fn forget(&self, id: PatternId) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(&id);
    }
}

/// Everything the app components share: ports, limits and the lock table.
#[derive(Clone)]
pub struct EngineContext {
    pub(crate) patterns: Arc<dyn PatternStore>,
    pub(crate) tasks: Arc<dyn TaskStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) holidays: Arc<dyn HolidayCalendar>,
    pub(crate) store_timeout: Duration,
    pub(crate) max_conflict_retries: u32,
    pub(crate) locks: Arc<PatternLocks>,
}

impl EngineContext {
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Run a store call under the configured timeout.
    pub(crate) async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::StoreTimeout(op)),
        }
    }

    pub(crate) async fn load_pattern(&self, id: PatternId) -> Result<RecurringTask, EngineError> {
        self.call("pattern_store.get", self.patterns.get(id))
            .await?
            .ok_or(EngineError::PatternNotFound(id))
    }

    /// Read-modify-write one pattern under its advisory lock.
    ///
    /// `edit` returns whether it changed anything; unchanged patterns are not
    /// written. A lost conditional write re-reads and re-applies `edit`.
    pub(crate) async fn mutate_pattern<F>(
        &self,
        id: PatternId,
        mut edit: F,
    ) -> Result<RecurringTask, EngineError>
    where
        F: FnMut(&mut RecurringTask) -> Result<bool, EngineError>,
    {
        let _guard = self.locks.acquire(id).await;

        for attempt in 1..=self.max_conflict_retries {
            let mut pattern = self.load_pattern(id).await?;
            if !edit(&mut pattern)? {
                return Ok(pattern);
            }
            pattern.updated_at = self.clock.now();

            match self.call("pattern_store.update", self.patterns.update(pattern)).await {
                Ok(stored) => return Ok(stored),
                Err(EngineError::Store(StoreError::VersionConflict { expected, actual })) => {
                    warn!(pattern_id = %id, attempt, expected, actual, "pattern write lost a race; retrying");
                }
                Err(EngineError::Store(StoreError::NotFound)) => {
                    return Err(EngineError::PatternNotFound(id));
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::ConcurrencyConflict {
            pattern_id: id,
            attempts: self.max_conflict_retries,
        })
    }
}
