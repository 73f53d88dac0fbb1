//! RecurrenceService - エンジンの API 表面
//!
//! # 操作
//! - pattern: create / update / delete / pause / resume / get / list
//! - 生成: generate_now（1..=max_generate_now 件）
//! - skip date: add / remove
//! - 参照: get_stats / list_tasks / get_task
//! - task: complete_task / update_task_status
//!
//! pattern の書き込みはすべて `EngineContext::mutate_pattern` を通る
//! （advisory lock + version 条件付き書き込み + リトライ）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::EngineContext;
use super::generator::Generator;
use super::maintenance::resume_point;
use crate::config::GenerationConfig;
use crate::domain::errors::{EngineError, StoreError, ValidationError};
use crate::domain::ids::{PatternId, SkipDateId, TaskId};
use crate::domain::pattern::{PatternPatch, PatternSpec, RecurringTask, SkipDate};
use crate::domain::recurrence::{first_occurrence, next_occurrence};
use crate::domain::stats::PatternStats;
use crate::domain::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Also delete every task the pattern has materialized.
    pub cascade_delete_generated: bool,
}

pub struct RecurrenceService {
    ctx: EngineContext,
    generator: Arc<Generator>,
    config: GenerationConfig,
}

impl RecurrenceService {
    pub fn new(ctx: EngineContext, generator: Arc<Generator>, config: GenerationConfig) -> Self {
        Self {
            ctx,
            generator,
            config,
        }
    }

    pub async fn create_pattern(&self, spec: PatternSpec) -> Result<RecurringTask, EngineError> {
        spec.validate()?;

        let skip_ids = spec
            .skip_dates
            .iter()
            .map(|_| self.ctx.ids.generate_skip_date_id())
            .collect();
        let mut pattern = RecurringTask::from_spec(
            self.ctx.ids.generate_pattern_id(),
            spec,
            skip_ids,
            self.ctx.clock.now(),
        );
        pattern.next_generation_date = Some(first_occurrence(&pattern.rule));

        let pattern = self
            .ctx
            .call("pattern_store.insert", self.ctx.patterns.insert(pattern))
            .await?;
        info!(
            pattern_id = %pattern.id,
            frequency = ?pattern.rule.frequency,
            next = ?pattern.next_generation_date,
            "created recurring task"
        );
        Ok(pattern)
    }

    /// Apply `patch`. Recurrence-affecting changes recompute the cursor from
    /// today, never rewinding behind an already generated date.
    pub async fn update_pattern(
        &self,
        id: PatternId,
        patch: PatternPatch,
    ) -> Result<RecurringTask, EngineError> {
        let today = self.ctx.today();
        let recompute = patch.affects_recurrence();

        let pattern = self
            .ctx
            .mutate_pattern(id, |p| {
                patch.clone().apply(p)?;
                if recompute {
                    p.next_generation_date = Some(resume_point(p, today));
                }
                Ok(true)
            })
            .await?;

        info!(pattern_id = %id, recompute, next = ?pattern.next_generation_date, "updated recurring task");
        Ok(pattern)
    }

    /// Returns the number of generated tasks removed with the pattern.
    pub async fn delete_pattern(
        &self,
        id: PatternId,
        options: DeleteOptions,
    ) -> Result<usize, EngineError> {
        let removed_tasks = {
            let _guard = self.ctx.locks.acquire(id).await;
            let deleted = self
                .ctx
                .call("pattern_store.delete", self.ctx.patterns.delete(id))
                .await?;
            if !deleted {
                return Err(EngineError::PatternNotFound(id));
            }

            if options.cascade_delete_generated {
                self.ctx
                    .call("task_store.delete_by_pattern", self.ctx.tasks.delete_by_pattern(id))
                    .await?
            } else {
                0
            }
        };
        self.ctx.locks.forget(id);

        info!(pattern_id = %id, removed_tasks, "deleted recurring task");
        Ok(removed_tasks)
    }

    /// Cursor is left untouched.
    pub async fn pause_pattern(&self, id: PatternId) -> Result<RecurringTask, EngineError> {
        let pattern = self
            .ctx
            .mutate_pattern(id, |p| {
                if p.paused {
                    return Ok(false);
                }
                p.paused = true;
                Ok(true)
            })
            .await?;
        info!(pattern_id = %id, "paused recurring task");
        Ok(pattern)
    }

    /// Unpause; a cursor already due is caught up with one generation right away.
    pub async fn resume_pattern(&self, id: PatternId) -> Result<RecurringTask, EngineError> {
        let today = self.ctx.today();
        let pattern = self
            .ctx
            .mutate_pattern(id, |p| {
                let seed = p.next_generation_date.is_none();
                if !p.paused && !seed {
                    return Ok(false);
                }
                p.paused = false;
                if seed {
                    p.next_generation_date = Some(resume_point(p, p.rule.start_date));
                }
                Ok(true)
            })
            .await?;
        info!(pattern_id = %id, next = ?pattern.next_generation_date, "resumed recurring task");

        if !pattern.is_due(today) {
            return Ok(pattern);
        }
        let generated = self.generator.generate(id, 1).await?;
        debug!(pattern_id = %id, count = generated.len(), "caught up on resume");
        self.ctx.load_pattern(id).await
    }

    pub async fn generate_now(&self, id: PatternId, count: u32) -> Result<Vec<Task>, EngineError> {
        let max = self.config.max_generate_now;
        if !(1..=max).contains(&count) {
            return Err(ValidationError::CountOutOfRange {
                requested: count,
                max,
            }
            .into());
        }

        let pattern = self.ctx.load_pattern(id).await?;
        if pattern.paused {
            return Err(ValidationError::PatternPaused(id).into());
        }
        self.generator.generate(id, count).await
    }

    /// Idempotent by date. Skipping the cursor's own date moves the cursor on.
    pub async fn add_skip_date(
        &self,
        id: PatternId,
        date: chrono::NaiveDate,
    ) -> Result<RecurringTask, EngineError> {
        let pattern = self
            .ctx
            .mutate_pattern(id, |p| {
                if p.is_skip_date(date) {
                    return Ok(false);
                }
                p.skip_dates.push(SkipDate {
                    id: self.ctx.ids.generate_skip_date_id(),
                    date,
                });
                if p.next_generation_date == Some(date) {
                    p.next_generation_date = Some(next_occurrence(&p.rule, date));
                }
                Ok(true)
            })
            .await?;
        debug!(pattern_id = %id, %date, "added skip date");
        Ok(pattern)
    }

    /// Remove a skip date and recompute the cursor from today.
    pub async fn remove_skip_date(
        &self,
        id: PatternId,
        skip_date_id: SkipDateId,
    ) -> Result<RecurringTask, EngineError> {
        let today = self.ctx.today();
        let pattern = self
            .ctx
            .mutate_pattern(id, |p| {
                let index = p
                    .skip_dates
                    .iter()
                    .position(|s| s.id == skip_date_id)
                    .ok_or(EngineError::SkipDateNotFound(skip_date_id))?;
                p.skip_dates.remove(index);
                p.next_generation_date = Some(resume_point(p, today));
                Ok(true)
            })
            .await?;
        debug!(pattern_id = %id, %skip_date_id, next = ?pattern.next_generation_date, "removed skip date");
        Ok(pattern)
    }

    pub async fn get_stats(&self, id: PatternId) -> Result<PatternStats, EngineError> {
        let pattern = self.ctx.load_pattern(id).await?;
        let tasks = self
            .ctx
            .call("task_store.find_by_pattern", self.ctx.tasks.find_by_pattern(id))
            .await?;
        Ok(PatternStats::collect(&pattern, &tasks, self.ctx.today()))
    }

    pub async fn get_pattern(&self, id: PatternId) -> Result<RecurringTask, EngineError> {
        self.ctx.load_pattern(id).await
    }

    pub async fn list_patterns(&self) -> Result<Vec<RecurringTask>, EngineError> {
        self.ctx
            .call("pattern_store.find_all", self.ctx.patterns.find_all())
            .await
    }

    /// Tasks outlive a non-cascading delete, so this does not require the pattern.
    pub async fn list_tasks(&self, id: PatternId) -> Result<Vec<Task>, EngineError> {
        self.ctx
            .call("task_store.find_by_pattern", self.ctx.tasks.find_by_pattern(id))
            .await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, EngineError> {
        self.ctx
            .call("task_store.get", self.ctx.tasks.get(id))
            .await?
            .ok_or(EngineError::TaskNotFound(id))
    }

    pub async fn complete_task(&self, id: TaskId) -> Result<Task, EngineError> {
        self.update_task_status(id, TaskStatus::Completed).await
    }

    pub async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, EngineError> {
        let now = self.ctx.clock.now();
        match self
            .ctx
            .call("task_store.update_status", self.ctx.tasks.update_status(id, status, now))
            .await
        {
            Err(EngineError::Store(StoreError::NotFound)) => Err(EngineError::TaskNotFound(id)),
            other => other,
        }
    }
}
