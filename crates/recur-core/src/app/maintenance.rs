//! Maintenance - cursor の補完と自動 pause
//!
//! - cursor の無い稼働中 pattern に cursor を補う（今日以降、生成済みの日付より後）
//! - `tasks_generated >= max_occurrences` の pattern を pause
//! - `end_date` を過ぎた pattern を pause

use chrono::NaiveDate;
use tracing::{error, info};

use super::EngineContext;
use crate::domain::errors::EngineError;
use crate::domain::pattern::RecurringTask;
use crate::domain::recurrence::occurrence_on_or_after;
use crate::observability::MaintenanceReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fix {
    Backfill,
    PauseExhausted,
    PausePastEnd,
}

fn plan(pattern: &RecurringTask, today: NaiveDate) -> Option<Fix> {
    if pattern.paused {
        return None;
    }
    if pattern.has_reached_max_occurrences() {
        Some(Fix::PauseExhausted)
    } else if pattern.is_past_end(today) {
        Some(Fix::PausePastEnd)
    } else if pattern.next_generation_date.is_none() {
        Some(Fix::Backfill)
    } else {
        None
    }
}

/// Earliest occurrence that is neither before the start nor already generated.
pub(crate) fn resume_point(pattern: &RecurringTask, floor: NaiveDate) -> NaiveDate {
    let after_last = pattern.last_generated_date.and_then(|d| d.succ_opt());
    let floor = [Some(pattern.rule.start_date), Some(floor), after_last]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(floor);
    occurrence_on_or_after(&pattern.rule, floor)
}

pub struct Maintenance {
    ctx: EngineContext,
}

impl Maintenance {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// One maintenance sweep. Per-pattern failures are logged and counted.
    pub async fn run(&self) -> Result<MaintenanceReport, EngineError> {
        let today = self.ctx.today();
        let patterns = self
            .ctx
            .call("pattern_store.find_all", self.ctx.patterns.find_all())
            .await?;

        let mut report = MaintenanceReport::default();
        for pattern in patterns {
            let Some(fix) = plan(&pattern, today) else {
                continue;
            };

            // Re-plan against the fresh copy; the pattern may have moved on.
            let mut applied = false;
            let result = self
                .ctx
                .mutate_pattern(pattern.id, |p| {
                    applied = plan(p, today) == Some(fix);
                    if !applied {
                        return Ok(false);
                    }
                    match fix {
                        Fix::Backfill => {
                            p.next_generation_date = Some(resume_point(p, today));
                        }
                        Fix::PauseExhausted | Fix::PausePastEnd => p.paused = true,
                    }
                    Ok(true)
                })
                .await;

            match result {
                Ok(p) if applied => match fix {
                    Fix::Backfill => report.backfilled += 1,
                    Fix::PauseExhausted => {
                        info!(pattern_id = %p.id, generated = p.tasks_generated, "auto-paused exhausted pattern");
                        report.paused_exhausted += 1;
                    }
                    Fix::PausePastEnd => {
                        info!(pattern_id = %p.id, end_date = ?p.rule.end_date, "auto-paused pattern past its end date");
                        report.paused_past_end += 1;
                    }
                },
                Ok(_) => {}
                Err(EngineError::PatternNotFound(_)) => {}
                Err(e) => {
                    error!(pattern_id = %pattern.id, error = %e, "maintenance failed for pattern");
                    report.failed += 1;
                }
            }
        }

        if report.touched() > 0 {
            info!(
                backfilled = report.backfilled,
                paused_exhausted = report.paused_exhausted,
                paused_past_end = report.paused_past_end,
                "maintenance sweep finished"
            );
        }
        Ok(report)
    }
}
