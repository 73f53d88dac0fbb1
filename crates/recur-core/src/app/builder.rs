//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定が不正なら build() で止める
//! - 差し込まなかった port は開発用のデフォルトで埋める

use std::sync::Arc;
use std::time::Duration;

use crate::app::generator::Generator;
use crate::app::scheduler_loop::SchedulerLoop;
use crate::app::service::RecurrenceService;
use crate::app::{EngineContext, PatternLocks};
use crate::config::{ConfigError, EngineConfig};
use crate::impls::{InMemoryPatternStore, InMemoryTaskStore};
use crate::ports::{
    Clock, HolidayCalendar, IdGenerator, NoHolidays, PatternStore, SystemClock, TaskStore,
    UlidGenerator,
};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .config(EngineConfig::load(None)?)
///     .clock(Arc::new(SystemClock))
///     .build()?;
/// engine.scheduler.start().await;
/// ```
///
/// # デフォルト
/// - PatternStore / TaskStore: in-memory
/// - Clock: SystemClock
/// - IdGenerator: 同じ Clock を使う UlidGenerator
/// - HolidayCalendar: NoHolidays
pub struct EngineBuilder {
    config: EngineConfig,
    patterns: Option<Arc<dyn PatternStore>>,
    tasks: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    holidays: Option<Arc<dyn HolidayCalendar>>,
    tick_interval: Option<Duration>,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("tick interval must be non-zero")]
    ZeroTickInterval,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            patterns: None,
            tasks: None,
            clock: None,
            ids: None,
            holidays: None,
            tick_interval: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pattern_store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.patterns = Some(store);
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn holidays(mut self, holidays: Arc<dyn HolidayCalendar>) -> Self {
        self.holidays = Some(holidays);
        self
    }

    /// Override the configured tick period (e.g. milliseconds for a demo run).
    pub fn tick_interval(mut self, period: Duration) -> Self {
        self.tick_interval = Some(period);
        self
    }

    /// 設定を検証してから全コンポーネントをワイヤリング
    pub fn build(self) -> Result<Engine, BuildError> {
        self.config.validate()?;
        let period = self.tick_interval.unwrap_or_else(|| self.config.tick_interval());
        if period.is_zero() {
            return Err(BuildError::ZeroTickInterval);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let ctx = EngineContext {
            patterns: self
                .patterns
                .unwrap_or_else(|| Arc::new(InMemoryPatternStore::new())),
            tasks: self.tasks.unwrap_or_else(|| Arc::new(InMemoryTaskStore::new())),
            clock,
            ids,
            holidays: self.holidays.unwrap_or_else(|| Arc::new(NoHolidays)),
            store_timeout: self.config.store_timeout(),
            max_conflict_retries: self.config.generation.max_conflict_retries,
            locks: Arc::new(PatternLocks::default()),
        };

        let generation = self.config.generation.clone();
        let generator = Arc::new(Generator::new(ctx.clone(), generation.clone()));
        let service = Arc::new(RecurrenceService::new(ctx.clone(), Arc::clone(&generator), generation));
        let scheduler = SchedulerLoop::with_period(ctx, generator, &self.config.scheduler, period);

        Ok(Engine {
            service,
            scheduler,
            config: self.config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A wired engine: the API surface plus the background scheduler sharing it.
pub struct Engine {
    pub service: Arc<RecurrenceService>,
    pub scheduler: SchedulerLoop,
    pub config: EngineConfig,
}
