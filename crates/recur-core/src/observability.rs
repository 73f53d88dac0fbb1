use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome of one scheduler sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub today: Option<NaiveDate>,
    pub due: usize,
    pub generated: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl SweepReport {
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Outcome of one maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub backfilled: usize,
    pub paused_exhausted: usize,
    pub paused_past_end: usize,
    pub failed: usize,
}

impl MaintenanceReport {
    pub fn touched(&self) -> usize {
        self.backfilled + self.paused_exhausted + self.paused_past_end
    }
}

/// Cumulative scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub ticks: u64,
    pub tasks_generated: u64,
    pub failures: u64,
    pub maintenance_runs: u64,
    pub last_sweep: Option<SweepReport>,
    pub last_maintenance: Option<MaintenanceReport>,
}

impl SchedulerStats {
    pub(crate) fn record_sweep(&mut self, report: &SweepReport) {
        self.ticks += 1;
        self.tasks_generated += report.generated as u64;
        self.failures += report.failed as u64;
        self.last_sweep = Some(report.clone());
    }

    pub(crate) fn record_maintenance(&mut self, report: &MaintenanceReport) {
        self.maintenance_runs += 1;
        self.failures += report.failed as u64;
        self.last_maintenance = Some(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweeps_accumulate() {
        let mut stats = SchedulerStats::default();
        let first = SweepReport {
            due: 3,
            generated: 2,
            failed: 1,
            ..Default::default()
        };
        stats.record_sweep(&first);
        stats.record_sweep(&SweepReport {
            generated: 4,
            ..Default::default()
        });

        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.tasks_generated, 6);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.last_sweep.as_ref().map(|s| s.generated), Some(4));
    }

    #[test]
    fn report_serializes_duration_in_millis() {
        let report = SweepReport::default().with_duration(Duration::from_millis(1500));
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["duration_ms"], 1500);
    }
}
