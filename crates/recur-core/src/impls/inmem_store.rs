//! In-memory store implementations (development / tests).
//!
//! Both stores keep their whole state behind one `tokio::sync::Mutex`, so every
//! trait method is atomic with respect to the others. That is enough to give
//! `PatternStore::update` real compare-and-set semantics and to make the
//! `(recurring_task_id, due_date)` uniqueness check race-free.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::domain::errors::StoreError;
use crate::domain::ids::{PatternId, TaskId};
use crate::domain::pattern::RecurringTask;
use crate::domain::task::{Task, TaskStatus};
use crate::ports::{PatternStore, TaskStore};

/// In-memory pattern store.
#[derive(Clone, Default)]
pub struct InMemoryPatternStore {
    patterns: Arc<Mutex<HashMap<PatternId, RecurringTask>>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn get(&self, id: PatternId) -> Result<Option<RecurringTask>, StoreError> {
        let patterns = self.patterns.lock().await;
        Ok(patterns.get(&id).cloned())
    }

    async fn insert(&self, pattern: RecurringTask) -> Result<RecurringTask, StoreError> {
        let mut patterns = self.patterns.lock().await;
        if patterns.contains_key(&pattern.id) {
            return Err(StoreError::Backend(format!("{} already exists", pattern.id)));
        }
        patterns.insert(pattern.id, pattern.clone());
        Ok(pattern)
    }

    async fn update(&self, mut pattern: RecurringTask) -> Result<RecurringTask, StoreError> {
        let mut patterns = self.patterns.lock().await;
        let stored = patterns.get_mut(&pattern.id).ok_or(StoreError::NotFound)?;
        if stored.version != pattern.version {
            return Err(StoreError::VersionConflict {
                expected: pattern.version,
                actual: stored.version,
            });
        }
        pattern.version += 1;
        *stored = pattern.clone();
        Ok(pattern)
    }

    async fn delete(&self, id: PatternId) -> Result<bool, StoreError> {
        let mut patterns = self.patterns.lock().await;
        Ok(patterns.remove(&id).is_some())
    }

    async fn find_due(&self, today: NaiveDate) -> Result<Vec<RecurringTask>, StoreError> {
        let patterns = self.patterns.lock().await;
        let mut due: Vec<RecurringTask> = patterns
            .values()
            .filter(|p| p.is_due(today))
            .cloned()
            .collect();
        due.sort_by_key(|p| (p.next_generation_date, p.id));
        Ok(due)
    }

    async fn find_all(&self) -> Result<Vec<RecurringTask>, StoreError> {
        let patterns = self.patterns.lock().await;
        let mut all: Vec<RecurringTask> = patterns.values().cloned().collect();
        all.sort_by_key(|p| p.id);
        Ok(all)
    }
}

#[derive(Default)]
struct TaskState {
    tasks: HashMap<TaskId, Task>,

    /// Occurrence index: (pattern, due date) -> task. Enforces uniqueness.
    occurrences: BTreeMap<(PatternId, NaiveDate), TaskId>,
}

/// In-memory task store.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<TaskState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored tasks across all patterns.
    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_occurrence(
        &self,
        pattern_id: PatternId,
        due_date: NaiveDate,
    ) -> Result<Option<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .occurrences
            .get(&(pattern_id, due_date))
            .and_then(|id| state.tasks.get(id))
            .cloned())
    }

    async fn find_by_pattern(&self, pattern_id: PatternId) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        // BTreeMap order gives due-date order within a pattern.
        Ok(state
            .occurrences
            .range((pattern_id, NaiveDate::MIN)..=(pattern_id, NaiveDate::MAX))
            .filter_map(|(_, id)| state.tasks.get(id).cloned())
            .collect())
    }

    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        let key = (task.recurring_task_id, task.due_date);
        if state.occurrences.contains_key(&key) {
            return Err(StoreError::DuplicateOccurrence {
                pattern_id: key.0,
                due_date: key.1,
            });
        }
        state.occurrences.insert(key, task.id);
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        let task = state.tasks.get_mut(&id).ok_or(StoreError::NotFound)?;
        task.transition(status, at);
        Ok(task.clone())
    }

    async fn delete_by_pattern(&self, pattern_id: PatternId) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let keys: Vec<(PatternId, NaiveDate)> = state
            .occurrences
            .range((pattern_id, NaiveDate::MIN)..=(pattern_id, NaiveDate::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            if let Some(id) = state.occurrences.remove(key) {
                state.tasks.remove(&id);
            }
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::{PatternSpec, RecurrenceRule};
    use crate::domain::recurrence::task_draft;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pattern() -> RecurringTask {
        let spec = PatternSpec::new("backup", RecurrenceRule::daily(date(2024, 1, 1), 1), "ops");
        RecurringTask::from_spec(
            PatternId::from_ulid(Ulid::new()),
            spec,
            vec![],
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn task_for(pattern: &RecurringTask, due: NaiveDate) -> Task {
        Task::from_draft(
            TaskId::from_ulid(Ulid::new()),
            task_draft(pattern, due),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_writes() {
        let store = InMemoryPatternStore::new();
        let original = store.insert(pattern()).await.unwrap();

        let mut first = original.clone();
        first.paused = true;
        let stored = store.update(first).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut stale = original.clone();
        stale.title = "stale".into();
        let err = store.update(stale).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1
            }
        );
        assert!(store.get(original.id).await.unwrap().unwrap().paused);
    }

    #[tokio::test]
    async fn update_of_missing_pattern_is_not_found() {
        let store = InMemoryPatternStore::new();
        assert_eq!(store.update(pattern()).await.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn find_due_skips_paused_and_future_patterns() {
        let store = InMemoryPatternStore::new();

        let mut due = pattern();
        due.next_generation_date = Some(date(2024, 1, 1));
        let mut future = pattern();
        future.next_generation_date = Some(date(2024, 2, 1));
        let mut paused = pattern();
        paused.next_generation_date = Some(date(2024, 1, 1));
        paused.paused = true;
        let unseeded = pattern();

        for p in [due.clone(), future, paused, unseeded] {
            store.insert(p).await.unwrap();
        }

        let found = store.find_due(date(2024, 1, 10)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn duplicate_occurrence_is_rejected() {
        let store = InMemoryTaskStore::new();
        let p = pattern();

        store.insert(task_for(&p, date(2024, 1, 1))).await.unwrap();
        let err = store.insert(task_for(&p, date(2024, 1, 1))).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOccurrence { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn tasks_are_listed_by_due_date_and_deleted_per_pattern() {
        let store = InMemoryTaskStore::new();
        let p = pattern();
        let other = pattern();

        store.insert(task_for(&p, date(2024, 1, 3))).await.unwrap();
        store.insert(task_for(&p, date(2024, 1, 1))).await.unwrap();
        store.insert(task_for(&other, date(2024, 1, 2))).await.unwrap();

        let listed = store.find_by_pattern(p.id).await.unwrap();
        let dues: Vec<NaiveDate> = listed.iter().map(|t| t.due_date).collect();
        assert_eq!(dues, vec![date(2024, 1, 1), date(2024, 1, 3)]);
        assert_eq!(store.find_by_pattern(p.id).await.unwrap().len(), 2);

        assert_eq!(store.delete_by_pattern(p.id).await.unwrap(), 2);
        assert_eq!(store.find_by_pattern(p.id).await.unwrap().len(), 0);
        assert_eq!(store.find_by_pattern(other.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_status_stamps_completion() {
        let store = InMemoryTaskStore::new();
        let p = pattern();
        let task = store.insert(task_for(&p, date(2024, 1, 1))).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let updated = store
            .update_status(task.id, TaskStatus::Completed, at)
            .await
            .unwrap();
        assert_eq!(updated.completed_at, Some(at));

        let missing = TaskId::from_ulid(Ulid::new());
        assert_eq!(
            store
                .update_status(missing, TaskStatus::Completed, at)
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }
}
