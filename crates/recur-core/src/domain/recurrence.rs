//! Recurrence calculator: pure calendar math over a [`RecurrenceRule`].
//!
//! Nothing here touches a store or a clock. Given the same inputs the
//! functions always return the same dates, which is what lets the generator
//! and the scheduler race on a pattern without disagreeing about *where*
//! occurrences fall.
//!
//! Conventions:
//! - Weekday numbers are 0 = Sunday .. 6 = Saturday.
//! - Weekly cadence counts whole weeks from the Sunday that starts the week
//!   containing `start_date`.
//! - Monthly and yearly occurrences clamp to the last day of a short month.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use super::pattern::{Frequency, LAST_DAY_OF_MONTH, RecurrenceRule, RecurringTask};
use super::task::{TaskDraft, TaskStatus};
use crate::ports::HolidayCalendar;

/// Upper bound on steps when walking a series forward to a floor date.
const MAX_SEED_STEPS: u32 = 100_000;

/// Weekday as 0 = Sunday .. 6 = Saturday.
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        year.checked_add(1).and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// `day` in the given month, falling back to the month's last day when the
/// month is too short or `day` is the last-day sentinel.
fn clamped_date(year: i32, month: u32, day: i8) -> Option<NaiveDate> {
    let last = days_in_month(year, month);
    let day = if day == LAST_DAY_OF_MONTH || day as u32 > last {
        last
    } else {
        day as u32
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Sunday on or before `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    let back = u64::from(weekday_number(date));
    date.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
}

fn is_in_weekly_cadence(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    let weeks = (date - week_start(rule.start_date)).num_days().div_euclid(7);
    weeks.rem_euclid(i64::from(rule.interval.max(1))) == 0
}

fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// Interval as a signed step; anything past `i32::MAX` saturates so the
/// result runs off the calendar instead of wrapping backwards.
fn step(interval: u32) -> i32 {
    i32::try_from(interval).unwrap_or(i32::MAX)
}

fn monthly_anchor_day(rule: &RecurrenceRule) -> i8 {
    rule.day_of_month
        .unwrap_or(rule.start_date.day() as i8)
}

/// Next occurrence strictly after `from`.
pub fn next_occurrence(rule: &RecurrenceRule, from: NaiveDate) -> NaiveDate {
    let interval = rule.interval.max(1);

    match rule.frequency {
        Frequency::Daily => add_days(from, u64::from(interval)),

        Frequency::Weekly => {
            if rule.days_of_week.is_empty() {
                return add_days(from, 7 * u64::from(interval));
            }
            // One full cadence period plus a week always contains a match.
            let horizon = 7 * u64::from(interval) + 7;
            let mut candidate = add_days(from, 1);
            for _ in 0..horizon {
                if rule.days_of_week.contains(&weekday_number(candidate))
                    && is_in_weekly_cadence(rule, candidate)
                {
                    return candidate;
                }
                candidate = add_days(candidate, 1);
            }
            candidate
        }

        Frequency::Monthly => {
            let months = (from.year() * 12 + from.month0() as i32)
                .checked_add(step(interval));
            months
                .and_then(|total| {
                    let (year, month) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
                    clamped_date(year, month, monthly_anchor_day(rule))
                })
                .unwrap_or(NaiveDate::MAX)
        }

        Frequency::Yearly => {
            let anchor = rule.start_date;
            from.year()
                .checked_add(step(interval))
                .and_then(|year| clamped_date(year, anchor.month(), anchor.day() as i8))
                .unwrap_or(NaiveDate::MAX)
        }
    }
}

/// First occurrence on or after `start_date`.
pub fn first_occurrence(rule: &RecurrenceRule) -> NaiveDate {
    let start = rule.start_date;
    match rule.frequency {
        Frequency::Daily | Frequency::Yearly => start,
        Frequency::Weekly => {
            if rule.days_of_week.contains(&weekday_number(start)) {
                start
            } else {
                next_occurrence(rule, start)
            }
        }
        Frequency::Monthly => {
            match clamped_date(start.year(), start.month(), monthly_anchor_day(rule)) {
                Some(candidate) if candidate >= start => candidate,
                Some(candidate) => next_occurrence(rule, candidate),
                None => next_occurrence(rule, start),
            }
        }
    }
}

/// Earliest occurrence of the series that is on or after `floor`.
pub fn occurrence_on_or_after(rule: &RecurrenceRule, floor: NaiveDate) -> NaiveDate {
    let first = first_occurrence(rule);
    if first >= floor {
        return first;
    }

    if rule.frequency == Frequency::Daily {
        let interval = i64::from(rule.interval.max(1));
        let gap = (floor - first).num_days();
        let steps = (gap + interval - 1) / interval;
        return add_days(first, (steps * interval) as u64);
    }

    let mut current = first;
    for _ in 0..MAX_SEED_STEPS {
        if current >= floor {
            return current;
        }
        current = next_occurrence(rule, current);
    }
    next_occurrence(rule, floor.pred_opt().unwrap_or(floor))
}

/// Why a candidate date is not eligible for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Paused,
    SkipDate,
    Weekend,
    Holiday,
    PastEndDate,
    MaxOccurrencesReached,
}

impl Ineligible {
    /// No later candidate can become eligible either.
    pub fn is_exhausted(self) -> bool {
        matches!(
            self,
            Ineligible::PastEndDate | Ineligible::MaxOccurrencesReached
        )
    }
}

/// The single eligibility check for a candidate date.
pub fn check_eligibility(
    task: &RecurringTask,
    date: NaiveDate,
    holidays: &dyn HolidayCalendar,
) -> Result<(), Ineligible> {
    if task.paused {
        return Err(Ineligible::Paused);
    }
    if task.is_skip_date(date) {
        return Err(Ineligible::SkipDate);
    }
    if task.skip_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return Err(Ineligible::Weekend);
    }
    if task.skip_holidays && holidays.is_holiday(date) {
        return Err(Ineligible::Holiday);
    }
    if task.rule.end_date.is_some_and(|end| date >= end) {
        return Err(Ineligible::PastEndDate);
    }
    if task.has_reached_max_occurrences() {
        return Err(Ineligible::MaxOccurrencesReached);
    }
    Ok(())
}

pub fn should_generate(task: &RecurringTask, date: NaiveDate, holidays: &dyn HolidayCalendar) -> bool {
    check_eligibility(task, date, holidays).is_ok()
}

/// Stamp the pattern's template into a draft due on `date`.
pub fn task_draft(task: &RecurringTask, date: NaiveDate) -> TaskDraft {
    let template = &task.task_template;
    TaskDraft {
        recurring_task_id: task.id,
        title: template.title.clone(),
        description: template.description.clone(),
        priority: template.priority,
        assigned_to: template.assigned_to.clone(),
        tags: template.tags.clone(),
        estimated_minutes: template.estimated_minutes,
        due_date: date,
        status: TaskStatus::Pending,
        created_by: task.created_by.clone(),
        team_id: task.team_id.clone(),
    }
}
