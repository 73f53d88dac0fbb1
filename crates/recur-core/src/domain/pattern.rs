//! Recurring task pattern: the persisted rule plus generation bookkeeping.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::ids::{PatternId, SkipDateId};

/// Calendar unit a pattern repeats in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Sentinel `day_of_month` meaning "the last day of the month".
pub const LAST_DAY_OF_MONTH: i8 = -1;

/// Largest accepted `interval`, whatever the frequency.
pub const MAX_INTERVAL: u32 = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// What every materialized task is stamped from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Estimated effort in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
}

impl TaskTemplate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::default(),
            assigned_to: None,
            tags: Vec::new(),
            estimated_minutes: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// The calendar part of a pattern.
///
/// `days_of_week` uses 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,

    /// Every N units of `frequency`.
    pub interval: u32,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub days_of_week: BTreeSet<u8>,

    /// -1 means the last day of the month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<i8>,

    pub start_date: NaiveDate,

    /// Exclusive upper bound for occurrences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<u32>,
}

impl RecurrenceRule {
    pub fn daily(start_date: NaiveDate, interval: u32) -> Self {
        Self {
            frequency: Frequency::Daily,
            interval,
            days_of_week: BTreeSet::new(),
            day_of_month: None,
            start_date,
            end_date: None,
            max_occurrences: None,
        }
    }

    pub fn weekly(start_date: NaiveDate, interval: u32, days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            days_of_week: days.into_iter().collect(),
            ..Self::daily(start_date, interval)
        }
        .with_frequency(Frequency::Weekly)
    }

    pub fn monthly(start_date: NaiveDate, interval: u32, day_of_month: i8) -> Self {
        Self {
            day_of_month: Some(day_of_month),
            ..Self::daily(start_date, interval)
        }
        .with_frequency(Frequency::Monthly)
    }

    pub fn yearly(start_date: NaiveDate, interval: u32) -> Self {
        Self::daily(start_date, interval).with_frequency(Frequency::Yearly)
    }

    fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn until(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn limited_to(mut self, max_occurrences: u32) -> Self {
        self.max_occurrences = Some(max_occurrences);
        self
    }

    /// Check the frequency-specific requirements and the date bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval == 0 {
            return Err(ValidationError::InvalidInterval(self.interval));
        }
        if self.interval > MAX_INTERVAL {
            return Err(ValidationError::IntervalTooLarge {
                interval: self.interval,
                max: MAX_INTERVAL,
            });
        }

        match self.frequency {
            Frequency::Weekly => {
                if self.days_of_week.is_empty() {
                    return Err(ValidationError::MissingDaysOfWeek);
                }
                if let Some(&day) = self.days_of_week.iter().find(|&&d| d > 6) {
                    return Err(ValidationError::WeekdayOutOfRange(day));
                }
            }
            Frequency::Monthly => {
                let day = self.day_of_month.ok_or(ValidationError::MissingDayOfMonth)?;
                if day != LAST_DAY_OF_MONTH && !(1..=31).contains(&day) {
                    return Err(ValidationError::DayOfMonthOutOfRange(day));
                }
            }
            Frequency::Daily | Frequency::Yearly => {}
        }

        if let Some(end) = self.end_date
            && end <= self.start_date
        {
            return Err(ValidationError::EndNotAfterStart {
                start: self.start_date,
                end,
            });
        }

        if self.max_occurrences == Some(0) {
            return Err(ValidationError::InvalidMaxOccurrences);
        }

        Ok(())
    }
}

/// A date on which no task may be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipDate {
    pub id: SkipDateId,
    pub date: NaiveDate,
}

/// A recurring task pattern (the persisted entity).
///
/// Design:
/// - `next_generation_date` is the cursor: the earliest candidate not yet evaluated.
/// - `tasks_generated` only ever grows, once per materialized task.
/// - `version` is bumped by the store on every successful write; conditional
///   updates compare against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTask {
    pub id: PatternId,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub rule: RecurrenceRule,

    #[serde(default)]
    pub skip_dates: Vec<SkipDate>,
    #[serde(default)]
    pub skip_weekends: bool,
    #[serde(default)]
    pub skip_holidays: bool,

    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub tasks_generated: u32,
    pub last_generated_date: Option<NaiveDate>,
    pub next_generation_date: Option<NaiveDate>,

    pub task_template: TaskTemplate,
    pub created_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringTask {
    /// Build a fresh entity from a validated spec. The cursor is left unset;
    /// the service seeds it.
    pub fn from_spec(id: PatternId, spec: PatternSpec, skip_ids: Vec<SkipDateId>, now: DateTime<Utc>) -> Self {
        let mut skip_dates: Vec<SkipDate> = Vec::with_capacity(spec.skip_dates.len());
        for (date, id) in spec.skip_dates.into_iter().zip(skip_ids) {
            if !skip_dates.iter().any(|s| s.date == date) {
                skip_dates.push(SkipDate { id, date });
            }
        }

        Self {
            id,
            title: spec.title,
            description: spec.description,
            rule: spec.rule,
            skip_dates,
            skip_weekends: spec.skip_weekends,
            skip_holidays: spec.skip_holidays,
            paused: false,
            tasks_generated: 0,
            last_generated_date: None,
            next_generation_date: None,
            task_template: spec.task_template,
            created_by: spec.created_by,
            team_id: spec.team_id,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_skip_date(&self, date: NaiveDate) -> bool {
        self.skip_dates.iter().any(|s| s.date == date)
    }

    /// Due for the scheduler: running and the cursor is on or before `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        !self.paused && self.next_generation_date.is_some_and(|d| d <= today)
    }

    pub fn has_reached_max_occurrences(&self) -> bool {
        self.rule
            .max_occurrences
            .is_some_and(|max| self.tasks_generated >= max)
    }

    pub fn is_past_end(&self, today: NaiveDate) -> bool {
        self.rule.end_date.is_some_and(|end| end <= today)
    }
}

/// Input for creating a pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule: RecurrenceRule,
    #[serde(default)]
    pub skip_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub skip_weekends: bool,
    #[serde(default)]
    pub skip_holidays: bool,
    pub task_template: TaskTemplate,
    pub created_by: String,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl PatternSpec {
    /// Convenience constructor: template title follows the pattern title.
    pub fn new(title: impl Into<String>, rule: RecurrenceRule, created_by: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            task_template: TaskTemplate::new(title.clone()),
            title,
            description: None,
            rule,
            skip_dates: Vec::new(),
            skip_weekends: false,
            skip_holidays: false,
            created_by: created_by.into(),
            team_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() || self.task_template.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        self.rule.validate()
    }
}

/// Partial update. `None` leaves a field untouched; the nested `Option`s on
/// `day_of_month`, `end_date` and `max_occurrences` allow clearing them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub frequency: Option<Frequency>,
    pub interval: Option<u32>,
    pub days_of_week: Option<BTreeSet<u8>>,
    pub day_of_month: Option<Option<i8>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub max_occurrences: Option<Option<u32>>,
    pub skip_weekends: Option<bool>,
    pub skip_holidays: Option<bool>,
    pub task_template: Option<TaskTemplate>,
}

impl PatternPatch {
    /// Fields that change where occurrences fall force a cursor recomputation.
    pub fn affects_recurrence(&self) -> bool {
        self.frequency.is_some()
            || self.interval.is_some()
            || self.days_of_week.is_some()
            || self.day_of_month.is_some()
            || self.start_date.is_some()
    }

    /// Apply onto `task` and validate the result.
    pub fn apply(self, task: &mut RecurringTask) -> Result<(), ValidationError> {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(frequency) = self.frequency {
            task.rule.frequency = frequency;
        }
        if let Some(interval) = self.interval {
            task.rule.interval = interval;
        }
        if let Some(days) = self.days_of_week {
            task.rule.days_of_week = days;
        }
        if let Some(day) = self.day_of_month {
            task.rule.day_of_month = day;
        }
        if let Some(start) = self.start_date {
            task.rule.start_date = start;
        }
        if let Some(end) = self.end_date {
            task.rule.end_date = end;
        }
        if let Some(max) = self.max_occurrences {
            task.rule.max_occurrences = max;
        }
        if let Some(skip) = self.skip_weekends {
            task.skip_weekends = skip;
        }
        if let Some(skip) = self.skip_holidays {
            task.skip_holidays = skip;
        }
        if let Some(template) = self.task_template {
            task.task_template = template;
        }

        if task.title.trim().is_empty() || task.task_template.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        task.rule.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_without_days_is_rejected() {
        let rule = RecurrenceRule::weekly(date(2024, 1, 1), 1, []);
        assert_eq!(rule.validate(), Err(ValidationError::MissingDaysOfWeek));
    }

    #[test]
    fn weekday_out_of_range_is_rejected() {
        let rule = RecurrenceRule::weekly(date(2024, 1, 1), 1, [1, 7]);
        assert_eq!(rule.validate(), Err(ValidationError::WeekdayOutOfRange(7)));
    }

    #[test]
    fn monthly_requires_day_of_month() {
        let mut rule = RecurrenceRule::monthly(date(2024, 1, 1), 1, 15);
        rule.day_of_month = None;
        assert_eq!(rule.validate(), Err(ValidationError::MissingDayOfMonth));
    }

    #[rstest]
    #[case::zero(0, false)]
    #[case::below_sentinel(-2, false)]
    #[case::too_large(32, false)]
    #[case::last_day(-1, true)]
    #[case::first(1, true)]
    #[case::thirty_first(31, true)]
    fn monthly_day_of_month_range(#[case] day: i8, #[case] ok: bool) {
        let rule = RecurrenceRule::monthly(date(2024, 1, 1), 1, day);
        assert_eq!(rule.validate().is_ok(), ok);
    }

    #[test]
    fn end_date_must_follow_start_date() {
        let rule = RecurrenceRule::daily(date(2024, 3, 1), 1).until(date(2024, 3, 1));
        assert!(matches!(
            rule.validate(),
            Err(ValidationError::EndNotAfterStart { .. })
        ));
    }

    #[rstest]
    #[case::daily(RecurrenceRule::daily(date(2024, 1, 1), MAX_INTERVAL + 1))]
    #[case::monthly(RecurrenceRule::monthly(date(2024, 1, 1), 2_147_483_000, 1))]
    #[case::yearly(RecurrenceRule::yearly(date(2024, 1, 1), u32::MAX))]
    fn oversized_interval_is_rejected(#[case] rule: RecurrenceRule) {
        assert_eq!(
            rule.validate(),
            Err(ValidationError::IntervalTooLarge {
                interval: rule.interval,
                max: MAX_INTERVAL,
            })
        );
    }

    #[test]
    fn interval_at_the_limit_is_accepted() {
        let rule = RecurrenceRule::yearly(date(2024, 1, 1), MAX_INTERVAL);
        assert_eq!(rule.validate(), Ok(()));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let rule = RecurrenceRule::daily(date(2024, 3, 1), 0);
        assert_eq!(rule.validate(), Err(ValidationError::InvalidInterval(0)));
    }

    #[test]
    fn spec_requires_title() {
        let spec = PatternSpec::new("  ", RecurrenceRule::daily(date(2024, 1, 1), 1), "alice");
        assert_eq!(spec.validate(), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn patch_detects_recurrence_changes() {
        let cosmetic = PatternPatch {
            title: Some("renamed".into()),
            skip_weekends: Some(true),
            ..Default::default()
        };
        assert!(!cosmetic.affects_recurrence());

        let structural = PatternPatch {
            interval: Some(2),
            ..Default::default()
        };
        assert!(structural.affects_recurrence());
    }

    #[test]
    fn rule_serializes_with_snake_case_frequency() {
        let rule = RecurrenceRule::monthly(date(2024, 1, 31), 1, LAST_DAY_OF_MONTH);
        let v = serde_json::to_value(&rule).unwrap();
        assert_eq!(v["frequency"], "monthly");
        assert_eq!(v["day_of_month"], -1);
        assert!(v.get("days_of_week").is_none());
    }
}
