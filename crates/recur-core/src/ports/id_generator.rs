//! IdGenerator port - ID の採番
//!
//! ストアの採番を待たずに、書き込み前に ID を決める。
//! Task は insert 前に ID が要る（occurrence 重複時は既存 Task を採用し、その ID は捨てる）。
//!
//! # UlidGenerator
//! - timestamp 部分は注入された Clock から取る
//! - 同じミリ秒内でも単調増加（`ulid::Generator`）。FixedClock 下でも
//!   作成順 = ID 順が保たれ、`list_patterns` の順序が決定的になる

use std::sync::Mutex;
use std::time::SystemTime;

use crate::domain::ids::{PatternId, SkipDateId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_pattern_id(&self) -> PatternId;

    fn generate_task_id(&self) -> TaskId;

    fn generate_skip_date_id(&self) -> SkipDateId;
}

/// Clock-stamped, monotonic ULIDs shared by every id kind.
pub struct UlidGenerator<C> {
    clock: C,
    monotonic: Mutex<ulid::Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(ulid::Generator::new()),
        }
    }

    fn next_ulid(&self) -> Ulid {
        let now = self.clock.now();
        let mut monotonic = self.monotonic.lock().unwrap_or_else(|p| p.into_inner());
        monotonic
            .generate_from_datetime(SystemTime::from(now))
            // random part exhausted within one millisecond
            .unwrap_or_else(|_| {
                Ulid::from_parts(now.timestamp_millis().max(0) as u64, rand::random())
            })
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_pattern_id(&self) -> PatternId {
        PatternId::from(self.next_ulid())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_skip_date_id(&self) -> SkipDateId {
        SkipDateId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    fn frozen() -> (FixedClock, UlidGenerator<FixedClock>) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
        (clock.clone(), UlidGenerator::new(clock))
    }

    #[test]
    fn ids_carry_the_clock_time() {
        let (clock, ids) = frozen();
        let id = ids.generate_task_id();
        assert_eq!(id.as_ulid().timestamp_ms(), clock.now().timestamp_millis() as u64);
    }

    #[test]
    fn ids_grow_within_a_frozen_millisecond() {
        let (_, ids) = frozen();
        let created: Vec<PatternId> = (0..50).map(|_| ids.generate_pattern_id()).collect();

        let mut sorted = created.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, created);
    }

    #[test]
    fn kinds_share_one_sequence() {
        let (_, ids) = frozen();
        let pattern = ids.generate_pattern_id().as_ulid();
        let skip = ids.generate_skip_date_id().as_ulid();
        let task = ids.generate_task_id().as_ulid();
        assert!(pattern < skip && skip < task);
    }

    #[test]
    fn advancing_the_clock_moves_the_timestamp() {
        let (clock, ids) = frozen();
        let before = ids.generate_task_id();
        clock.advance(Duration::days(1));
        let after = ids.generate_task_id();

        assert_eq!(
            after.as_ulid().timestamp_ms() - before.as_ulid().timestamp_ms(),
            86_400_000
        );
    }
}
