//! Generator - pattern 1 件分の Task 生成
//!
//! # フロー
//! 1. pattern の advisory lock を取る
//! 2. pattern を読み直す（paused なら何もしない）
//!    - cursor が無ければ start_date と last_generated_date の後から求め直す
//! 3. cursor から候補日を進め、適格な日だけ Task を作る
//!    - 既存の `(recurring_task_id, due_date)` があればそれを採用（insert しない）
//!    - 不適格な日は予算を消費せずに飛ばす
//! 4. counter と cursor を `version` 条件付きで書き戻す
//!
//! counter の書き込みは Task の保存が成功した後だけ行う。
//! 条件付き書き込みに負けたら 2 からやり直す。

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::EngineContext;
use super::maintenance::resume_point;
use crate::config::GenerationConfig;
use crate::domain::errors::{EngineError, StoreError};
use crate::domain::ids::PatternId;
use crate::domain::pattern::RecurringTask;
use crate::domain::recurrence::{check_eligibility, next_occurrence, task_draft};
use crate::domain::task::Task;

enum Attempt {
    Committed(Vec<Task>),
    Conflict,
}

pub struct Generator {
    ctx: EngineContext,
    config: GenerationConfig,
}

impl Generator {
    pub fn new(ctx: EngineContext, config: GenerationConfig) -> Self {
        Self { ctx, config }
    }

    /// Materialize up to `count` tasks for one pattern.
    ///
    /// Returns fewer than `count` when the pattern is paused, exhausted, or
    /// the per-call advance cap is hit.
    pub async fn generate(&self, pattern_id: PatternId, count: u32) -> Result<Vec<Task>, EngineError> {
        let _guard = self.ctx.locks.acquire(pattern_id).await;
        let retries = self.config.max_conflict_retries;

        for attempt in 1..=retries {
            let pattern = self.ctx.load_pattern(pattern_id).await?;
            if pattern.paused {
                debug!(%pattern_id, "pattern is paused; nothing to generate");
                return Ok(Vec::new());
            }

            match self.attempt(pattern, count).await? {
                Attempt::Committed(tasks) => {
                    if !tasks.is_empty() {
                        info!(%pattern_id, count = tasks.len(), "generated tasks");
                    }
                    return Ok(tasks);
                }
                Attempt::Conflict => {
                    warn!(%pattern_id, attempt, "cursor commit lost a race; re-reading");
                }
            }
        }

        Err(EngineError::ConcurrencyConflict {
            pattern_id,
            attempts: retries,
        })
    }

    async fn attempt(&self, mut pattern: RecurringTask, count: u32) -> Result<Attempt, EngineError> {
        let now = self.ctx.clock.now();
        let seeded = pattern.next_generation_date;
        let mut cursor = seeded.unwrap_or_else(|| resume_point(&pattern, pattern.rule.start_date));

        let cap = self.config.advance_cap(count);
        let mut advances = 0u32;
        let mut produced = Vec::new();

        while produced.len() < count as usize {
            if advances >= cap {
                warn!(
                    pattern_id = %pattern.id,
                    cap,
                    produced = produced.len(),
                    %cursor,
                    "generation safety limit reached; returning partial result"
                );
                break;
            }
            advances += 1;

            match check_eligibility(&pattern, cursor, self.ctx.holidays.as_ref()) {
                Err(reason) if reason.is_exhausted() => {
                    debug!(pattern_id = %pattern.id, %cursor, ?reason, "series exhausted");
                    break;
                }
                Err(reason) => {
                    debug!(pattern_id = %pattern.id, %cursor, ?reason, "skipping candidate");
                    cursor = next_occurrence(&pattern.rule, cursor);
                    continue;
                }
                Ok(()) => {}
            }

            let task = self.materialize(&pattern, cursor, now).await?;
            produced.push(task);
            pattern.tasks_generated += 1;
            pattern.last_generated_date = Some(cursor);
            cursor = next_occurrence(&pattern.rule, cursor);
        }

        if produced.is_empty() && seeded == Some(cursor) {
            return Ok(Attempt::Committed(produced));
        }

        let pattern_id = pattern.id;
        pattern.next_generation_date = Some(cursor);
        pattern.updated_at = now;
        match self.ctx.call("pattern_store.update", self.ctx.patterns.update(pattern)).await {
            Ok(_) => Ok(Attempt::Committed(produced)),
            Err(EngineError::Store(StoreError::VersionConflict { .. })) => Ok(Attempt::Conflict),
            Err(EngineError::Store(StoreError::NotFound)) => {
                Err(EngineError::PatternNotFound(pattern_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Insert the task for `due_date` unless it already exists.
    async fn materialize(
        &self,
        pattern: &RecurringTask,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Task, EngineError> {
        if let Some(existing) = self
            .ctx
            .call("task_store.find_occurrence", self.ctx.tasks.find_occurrence(pattern.id, due_date))
            .await?
        {
            debug!(pattern_id = %pattern.id, %due_date, task_id = %existing.id, "occurrence already materialized");
            return Ok(existing);
        }

        let task = Task::from_draft(self.ctx.ids.generate_task_id(), task_draft(pattern, due_date), now);
        match self.ctx.call("task_store.insert", self.ctx.tasks.insert(task)).await {
            Ok(task) => Ok(task),
            Err(EngineError::Store(StoreError::DuplicateOccurrence { .. })) => self
                .ctx
                .call("task_store.find_occurrence", self.ctx.tasks.find_occurrence(pattern.id, due_date))
                .await?
                .ok_or(EngineError::Store(StoreError::NotFound)),
            Err(e) => Err(e),
        }
    }
}
