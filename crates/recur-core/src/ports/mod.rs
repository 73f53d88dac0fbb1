//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ドキュメントストア、祝日カレンダー、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - PatternStore が pattern の正本。cursor と counter はここにしか書かない
//! - TaskStore は生成済み Task の正本。occurrence 単位で一意
//! - Clock を差し替えることで scheduler をテストから決定的に駆動できる

pub mod clock;
pub mod holiday;
pub mod id_generator;
pub mod pattern_store;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::holiday::{FixedHolidays, HolidayCalendar, NoHolidays};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::pattern_store::PatternStore;
pub use self::task_store::TaskStore;
