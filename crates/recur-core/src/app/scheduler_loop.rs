//! SchedulerLoop - 定期生成ループ
//!
//! # 状態
//! - Stopped --start()--> Running --stop()--> Stopped
//! - Running 中の start()、Stopped 中の stop() は何もしない
//!
//! # tick
//! 1. N tick ごとに maintenance（cursor 補完・自動 pause）
//! 2. due な pattern を取得（`next_generation_date <= today`、paused 以外）
//! 3. pattern ごとに `Generator::generate(id, 1)`。1 件の失敗は sweep を止めない
//! 4. 件数と所要時間を記録
//!
//! `tick()` は公開されているので、テストは FixedClock を進めて直接呼べる。

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::EngineContext;
use super::generator::Generator;
use super::maintenance::Maintenance;
use crate::config::SchedulerConfig;
use crate::domain::errors::EngineError;
use crate::observability::{MaintenanceReport, SchedulerStats, SweepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Shared between the handle and the spawned loop.
struct Sweeper {
    ctx: EngineContext,
    generator: Arc<Generator>,
    maintenance: Maintenance,
    maintenance_every_ticks: u32,
    stats: Mutex<SchedulerStats>,
}

impl Sweeper {
    fn stats(&self) -> std::sync::MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn tick(&self) -> SweepReport {
        let ticks_so_far = self.stats().ticks;
        if ticks_so_far % u64::from(self.maintenance_every_ticks.max(1)) == 0 {
            // failures are logged and counted inside
            let _ = self.maintain().await;
        }

        let started = Instant::now();
        let today = self.ctx.today();
        let mut report = SweepReport {
            today: Some(today),
            ..Default::default()
        };

        match self.ctx.call("pattern_store.find_due", self.ctx.patterns.find_due(today)).await {
            Ok(due) => {
                report.due = due.len();
                for pattern in due {
                    match self.generator.generate(pattern.id, 1).await {
                        Ok(tasks) => report.generated += tasks.len(),
                        Err(e) => {
                            report.failed += 1;
                            error!(pattern_id = %pattern.id, error = %e, "generation failed during sweep");
                        }
                    }
                }
            }
            Err(e) => {
                report.failed += 1;
                error!(error = %e, "could not query due patterns");
            }
        }

        let report = report.with_duration(started.elapsed());
        if report.due > 0 || report.failed > 0 {
            info!(
                %today,
                due = report.due,
                generated = report.generated,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "sweep finished"
            );
        } else {
            debug!(%today, "sweep found nothing due");
        }
        self.stats().record_sweep(&report);
        report
    }

    async fn maintain(&self) -> Result<MaintenanceReport, EngineError> {
        let result = self.maintenance.run().await;
        match &result {
            Ok(report) => self.stats().record_maintenance(report),
            Err(e) => {
                error!(error = %e, "maintenance sweep failed");
                self.stats().record_maintenance(&MaintenanceReport {
                    failed: 1,
                    ..Default::default()
                });
            }
        }
        result
    }
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Owned scheduler handle with explicit start/stop.
pub struct SchedulerLoop {
    sweeper: Arc<Sweeper>,
    period: Duration,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl SchedulerLoop {
    pub fn new(ctx: EngineContext, generator: Arc<Generator>, config: &SchedulerConfig) -> Self {
        Self::with_period(ctx, generator, config, Duration::from_secs(config.tick_interval_secs))
    }

    /// Same as `new` with an explicit tick period (sub-second periods for tests and demos).
    pub fn with_period(
        ctx: EngineContext,
        generator: Arc<Generator>,
        config: &SchedulerConfig,
        period: Duration,
    ) -> Self {
        let sweeper = Sweeper {
            maintenance: Maintenance::new(ctx.clone()),
            ctx,
            generator,
            maintenance_every_ticks: config.maintenance_every_ticks,
            stats: Mutex::new(SchedulerStats::default()),
        };
        Self {
            sweeper: Arc::new(sweeper),
            period,
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        if self.running.lock().await.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Returns false when already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("scheduler already running");
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sweeper = Arc::clone(&self.sweeper);
        let period = self.period;

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // sender dropped counts as shutdown
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        sweeper.tick().await;
                    }
                }
            }
        });

        *running = Some(Running { shutdown_tx, join });
        info!(period_ms = period.as_millis() as u64, "scheduler started");
        true
    }

    /// Waits for an in-flight sweep to finish. Returns false when already stopped.
    pub async fn stop(&self) -> bool {
        let Some(Running { shutdown_tx, join }) = self.running.lock().await.take() else {
            debug!("scheduler already stopped");
            return false;
        };

        // ignore send error: the loop may already have exited
        let _ = shutdown_tx.send(true);
        if let Err(e) = join.await {
            error!(error = %e, "scheduler task ended abnormally");
        }
        info!("scheduler stopped");
        true
    }

    /// Run one sweep now, independent of the timer.
    pub async fn tick(&self) -> SweepReport {
        self.sweeper.tick().await
    }

    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, EngineError> {
        self.sweeper.maintain().await
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.sweeper.stats().clone();
        stats.running = self.state().await == SchedulerState::Running;
        stats
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};

    use super::*;
    use crate::app::service::RecurrenceService;
    use crate::app::testing::{Harness, date, harness};
    use crate::config::GenerationConfig;
    use crate::domain::errors::StoreError;
    use crate::domain::ids::{PatternId, TaskId};
    use crate::domain::pattern::{PatternSpec, RecurrenceRule, RecurringTask};
    use crate::domain::recurrence::first_occurrence;
    use crate::domain::task::{Task, TaskStatus};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::{PatternStore, TaskStore};

    fn scheduler(h: &Harness) -> SchedulerLoop {
        let generator = Arc::new(Generator::new(h.ctx.clone(), GenerationConfig::default()));
        SchedulerLoop::new(h.ctx.clone(), generator, &SchedulerConfig::default())
    }

    async fn seed(h: &Harness, rule: RecurrenceRule) -> RecurringTask {
        let spec = PatternSpec::new("feed the cat", rule, "alice");
        let mut pattern = RecurringTask::from_spec(h.ctx.ids.generate_pattern_id(), spec, vec![], h.ctx.clock.now());
        pattern.next_generation_date = Some(first_occurrence(&pattern.rule));
        h.patterns.insert(pattern).await.unwrap()
    }

    #[tokio::test]
    async fn tick_generates_only_what_is_due() {
        let h = harness(date(2024, 1, 1));
        let sched = scheduler(&h);
        let pattern = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;
        seed(&h, RecurrenceRule::daily(date(2024, 6, 1), 1)).await;

        let report = sched.tick().await;
        assert_eq!((report.due, report.generated, report.failed), (1, 1, 0));
        assert_eq!(sched.tick().await.generated, 0);

        h.set_today(date(2024, 1, 2));
        assert_eq!(sched.tick().await.generated, 1);
        assert_eq!(h.tasks.find_by_pattern(pattern.id).await.unwrap().len(), 2);

        let stats = sched.stats().await;
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.tasks_generated, 2);
        assert!(!stats.running);
    }

    #[tokio::test]
    async fn paused_patterns_stay_silent_until_resumed() {
        let h = harness(date(2024, 1, 1));
        let generator = Arc::new(Generator::new(h.ctx.clone(), GenerationConfig::default()));
        let sched = SchedulerLoop::new(h.ctx.clone(), Arc::clone(&generator), &SchedulerConfig::default());
        let service = RecurrenceService::new(h.ctx.clone(), generator, GenerationConfig::default());
        let pattern = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;
        service.pause_pattern(pattern.id).await.unwrap();

        for day in 1..=5 {
            h.set_today(date(2024, 1, day));
            assert_eq!(sched.tick().await.generated, 0);
        }
        assert!(h.tasks.is_empty().await);

        // Resuming catches up on the stale cursor with one task; the sweep
        // then walks the series forward one occurrence per tick.
        let resumed = service.resume_pattern(pattern.id).await.unwrap();
        assert!(!resumed.paused);
        assert_eq!(resumed.tasks_generated, 1);
        assert_eq!(resumed.next_generation_date, Some(date(2024, 1, 2)));

        assert_eq!(sched.tick().await.generated, 1);
        let dues: Vec<NaiveDate> = h
            .tasks
            .find_by_pattern(pattern.id)
            .await
            .unwrap()
            .iter()
            .map(|t| t.due_date)
            .collect();
        assert_eq!(dues, vec![date(2024, 1, 1), date(2024, 1, 2)]);
    }

    #[tokio::test]
    async fn exhausted_pattern_is_paused_by_maintenance() {
        let h = harness(date(2024, 1, 1));
        let sched = scheduler(&h);
        let pattern = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1).limited_to(2)).await;

        for day in 1..=4 {
            h.set_today(date(2024, 1, day));
            sched.tick().await;
        }

        let stored = h.patterns.get(pattern.id).await.unwrap().unwrap();
        assert!(stored.paused);
        assert_eq!(stored.tasks_generated, 2);
        assert_eq!(h.tasks.find_by_pattern(pattern.id).await.unwrap().len(), 2);
        assert_eq!(sched.stats().await.maintenance_runs, 4);
    }

    enum Fault {
        Reject,
        Stall,
    }

    /// Task store whose inserts for one pattern fail or never resolve.
    struct FaultyTaskStore {
        inner: InMemoryTaskStore,
        target: PatternId,
        fault: Fault,
    }

    #[async_trait]
    impl TaskStore for FaultyTaskStore {
        async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
            self.inner.get(id).await
        }
        async fn find_occurrence(&self, pattern_id: PatternId, due_date: NaiveDate) -> Result<Option<Task>, StoreError> {
            self.inner.find_occurrence(pattern_id, due_date).await
        }
        async fn find_by_pattern(&self, pattern_id: PatternId) -> Result<Vec<Task>, StoreError> {
            self.inner.find_by_pattern(pattern_id).await
        }
        async fn insert(&self, task: Task) -> Result<Task, StoreError> {
            if task.recurring_task_id == self.target {
                match self.fault {
                    Fault::Reject => return Err(StoreError::Backend("disk full".into())),
                    Fault::Stall => std::future::pending::<()>().await,
                }
            }
            self.inner.insert(task).await
        }
        async fn update_status(&self, id: TaskId, status: TaskStatus, at: DateTime<Utc>) -> Result<Task, StoreError> {
            self.inner.update_status(id, status, at).await
        }
        async fn delete_by_pattern(&self, pattern_id: PatternId) -> Result<usize, StoreError> {
            self.inner.delete_by_pattern(pattern_id).await
        }
    }

    #[tokio::test]
    async fn one_failing_pattern_does_not_abort_the_sweep() {
        let mut h = harness(date(2024, 1, 1));
        let broken = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;
        let healthy = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;
        h.ctx.tasks = Arc::new(FaultyTaskStore {
            inner: h.tasks.clone(),
            target: broken.id,
            fault: Fault::Reject,
        });
        let sched = scheduler(&h);

        let report = sched.tick().await;
        assert_eq!((report.due, report.generated, report.failed), (2, 1, 1));
        assert_eq!(h.tasks.find_by_pattern(healthy.id).await.unwrap().len(), 1);

        // Counters are untouched when the task write failed.
        let stored = h.patterns.get(broken.id).await.unwrap().unwrap();
        assert_eq!(stored.tasks_generated, 0);
        assert_eq!(stored.next_generation_date, Some(date(2024, 1, 1)));
    }

    #[tokio::test]
    async fn stalled_store_times_out_as_a_pattern_failure() {
        let mut h = harness(date(2024, 1, 1));
        let stalled = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;
        let healthy = seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;
        h.ctx.store_timeout = Duration::from_millis(20);
        h.ctx.tasks = Arc::new(FaultyTaskStore {
            inner: h.tasks.clone(),
            target: stalled.id,
            fault: Fault::Stall,
        });
        let generator = Arc::new(Generator::new(h.ctx.clone(), GenerationConfig::default()));

        assert!(matches!(
            generator.generate(stalled.id, 1).await,
            Err(EngineError::StoreTimeout("task_store.insert"))
        ));

        let sched = scheduler(&h);
        let report = sched.tick().await;
        assert_eq!((report.due, report.generated, report.failed), (2, 1, 1));
        assert_eq!(h.tasks.find_by_pattern(healthy.id).await.unwrap().len(), 1);
        assert_eq!(sched.stats().await.failures, 1);

        let stored = h.patterns.get(stalled.id).await.unwrap().unwrap();
        assert_eq!(stored.tasks_generated, 0);
        assert_eq!(stored.next_generation_date, Some(date(2024, 1, 1)));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let h = harness(date(2024, 1, 1));
        let generator = Arc::new(Generator::new(h.ctx.clone(), GenerationConfig::default()));
        let sched = SchedulerLoop::with_period(
            h.ctx.clone(),
            generator,
            &SchedulerConfig::default(),
            Duration::from_millis(5),
        );
        seed(&h, RecurrenceRule::daily(date(2024, 1, 1), 1)).await;

        assert!(!sched.stop().await);
        assert!(sched.start().await);
        assert!(!sched.start().await);
        assert_eq!(sched.state().await, SchedulerState::Running);
        assert!(sched.stats().await.running);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(sched.stop().await);
        assert!(!sched.stop().await);
        assert_eq!(sched.state().await, SchedulerState::Stopped);

        let stats = sched.stats().await;
        assert!(stats.ticks >= 1);
        assert_eq!(stats.tasks_generated, 1);
        assert_eq!(h.tasks.len().await, 1);
    }
}
