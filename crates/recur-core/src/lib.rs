//! recur-core
//!
//! Core building blocks for the recurring task engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, pattern, recurrence, task, stats, errors）
//! - **ports**: 抽象化レイヤー（PatternStore, TaskStore, Clock, IdGenerator, HolidayCalendar）
//! - **app**: アプリケーションロジック（builder, service, generator, scheduler_loop, maintenance）
//! - **impls**: 実装（InMemoryPatternStore / InMemoryTaskStore など開発用）
//! - **config**: TOML 設定と環境変数による上書き
//! - **observability**: sweep / maintenance / scheduler の集計

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
