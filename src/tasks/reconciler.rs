use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    db::Database,
    error::{TaskError, TaskResult},
    models::{Task, TaskDraft, TaskEdit, TimeRecord},
};

/// Key under which the whole task collection is stored.
pub const TASKS_KEY: &str = "smartsynch.tasks";

/// Sole writer of the task collection.
///
/// Every mutation is applied to a copy, persisted, and only then swapped in,
/// so readers never observe a write that failed to reach the store.
#[derive(Clone)]
pub struct TaskReconciler {
    tasks: Arc<Mutex<Vec<Task>>>,
    db: Database,
}

impl TaskReconciler {
    /// Reads the stored collection. Unparseable data starts an empty one.
    pub async fn load(db: Database) -> anyhow::Result<Self> {
        let tasks = match db.get_value(TASKS_KEY).await? {
            Some(raw) => match serde_json::from_str::<Vec<Task>>(&raw) {
                Ok(tasks) => tasks,
                Err(err) => {
                    warn!("Stored tasks are malformed, starting with an empty list: {err}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        info!("Loaded {} task(s)", tasks.len());

        Ok(Self {
            tasks: Arc::new(Mutex::new(tasks)),
            db,
        })
    }

    pub async fn list(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks
            .lock()
            .await
            .iter()
            .find(|task| task.id == task_id)
            .cloned()
    }

    pub async fn create(&self, draft: TaskDraft) -> TaskResult<Task> {
        validate(&draft.title, &draft.description)?;

        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            priority: draft.priority,
            category: draft.category,
            created_at: Utc::now(),
            time_spent: None,
            time_records: Vec::new(),
        };

        let mut guard = self.tasks.lock().await;
        let mut next = guard.clone();
        next.push(task.clone());
        self.commit(&mut guard, next).await?;

        info!("Created task {} ({})", task.id, task.category);
        Ok(task)
    }

    /// Replaces the editable fields of an existing task. `id` and
    /// `created_at` never change; the time history changes only when the
    /// edit carries it.
    pub async fn update(&self, edit: TaskEdit) -> TaskResult<Task> {
        validate(&edit.title, &edit.description)?;

        let mut guard = self.tasks.lock().await;
        let mut next = guard.clone();
        let task = next
            .iter_mut()
            .find(|task| task.id == edit.id)
            .ok_or_else(|| TaskError::NotFound(edit.id.clone()))?;

        task.title = edit.title.trim().to_string();
        task.description = edit.description.trim().to_string();
        task.priority = edit.priority;
        task.category = edit.category;
        if let Some(records) = edit.time_records {
            task.time_records = records;
            task.time_records.sort_by_key(|record| record.timestamp);
            task.time_spent = task.time_records.last().map(|record| record.seconds);
        }
        if let Some(seconds) = edit.time_spent {
            task.time_spent = Some(seconds);
        }
        let updated = task.clone();

        self.commit(&mut guard, next).await?;
        Ok(updated)
    }

    /// Removes the task. A running timer bound to it must be stopped by the
    /// caller beforehand.
    pub async fn delete(&self, task_id: &str) -> TaskResult<Task> {
        let mut guard = self.tasks.lock().await;
        let mut next = guard.clone();
        let position = next
            .iter()
            .position(|task| task.id == task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        let removed = next.remove(position);

        self.commit(&mut guard, next).await?;
        info!("Deleted task {task_id}");
        Ok(removed)
    }

    /// Appends a timer stop record to the task's history.
    pub async fn apply_stop(&self, task_id: &str, record: TimeRecord) -> TaskResult<Task> {
        let mut guard = self.tasks.lock().await;
        let mut next = guard.clone();
        let task = next
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        if let Some(previous) = task.time_spent {
            if record.seconds < previous {
                warn!(
                    "Stop record for {task_id} lowers time spent from {previous}s to {}s",
                    record.seconds
                );
            }
        }
        task.record_stop(record);
        let updated = task.clone();

        self.commit(&mut guard, next).await?;
        Ok(updated)
    }

    async fn commit(&self, current: &mut Vec<Task>, next: Vec<Task>) -> TaskResult<()> {
        let serialized = serde_json::to_string(&next).map_err(anyhow::Error::from)?;
        self.db.put_value(TASKS_KEY, serialized).await?;
        *current = next;
        Ok(())
    }
}

fn validate(title: &str, description: &str) -> TaskResult<()> {
    if title.trim().is_empty() {
        return Err(TaskError::Validation { field: "title" });
    }
    if description.trim().is_empty() {
        return Err(TaskError::Validation { field: "description" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Priority};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn draft(title: &str, description: &str) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            description: description.into(),
            priority: Priority::High,
            category: Category::Research,
        }
    }

    async fn reconciler() -> TaskReconciler {
        TaskReconciler::load(Database::open_in_memory().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_assigns_identity_and_empty_history() {
        let tasks = reconciler().await;
        let first = tasks.create(draft("Survey", "Read related work")).await.unwrap();
        let second = tasks.create(draft("Survey", "Read related work")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.time_records.is_empty());
        assert_eq!(first.time_spent, None);
        assert_eq!(tasks.list().await.len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let tasks = reconciler().await;
        let err = tasks.create(draft("  ", "something")).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation { field: "title" }));

        let err = tasks.create(draft("Title", "")).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation { field: "description" }));
        assert!(tasks.list().await.is_empty());
    }

    #[tokio::test]
    async fn update_preserves_time_history() {
        let tasks = reconciler().await;
        let task = tasks.create(draft("Survey", "Read related work")).await.unwrap();
        let record = TimeRecord { timestamp: Utc::now(), seconds: 90 };
        tasks.apply_stop(&task.id, record).await.unwrap();

        let mut edit = TaskEdit::from(&task);
        edit.title = "Survey v2".into();
        edit.category = Category::Planning;
        let updated = tasks.update(edit).await.unwrap();

        assert_eq!(updated.title, "Survey v2");
        assert_eq!(updated.category, Category::Planning);
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.time_records, vec![record]);
        assert_eq!(updated.time_spent, Some(90));
    }

    #[tokio::test]
    async fn update_with_explicit_time_fields_replaces_them() {
        let tasks = reconciler().await;
        let task = tasks.create(draft("Survey", "Read related work")).await.unwrap();
        let now = Utc::now();
        let later = TimeRecord { timestamp: now, seconds: 20 };
        let earlier = TimeRecord { timestamp: now - Duration::minutes(5), seconds: 10 };

        let mut edit = TaskEdit::from(&task);
        edit.time_records = Some(vec![later, earlier]);
        let updated = tasks.update(edit).await.unwrap();
        assert_eq!(updated.time_records, vec![earlier, later]);
        assert_eq!(updated.time_spent, Some(20));

        let mut edit = TaskEdit::from(&updated);
        edit.time_spent = Some(300);
        let updated = tasks.update(edit).await.unwrap();
        assert_eq!(updated.time_spent, Some(300));
        assert_eq!(updated.time_records.len(), 2);
    }

    #[tokio::test]
    async fn update_unknown_task_is_not_found() {
        let tasks = reconciler().await;
        let task = tasks.create(draft("Survey", "Read related work")).await.unwrap();
        let mut edit = TaskEdit::from(&task);
        edit.id = "nope".into();
        assert!(tasks.update(edit).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn apply_stop_after_delete_is_not_found() {
        let tasks = reconciler().await;
        let task = tasks.create(draft("Survey", "Read related work")).await.unwrap();
        tasks.delete(&task.id).await.unwrap();

        assert!(tasks.get(&task.id).await.is_none());
        let err = tasks
            .apply_stop(&task.id, TimeRecord { timestamp: Utc::now(), seconds: 5 })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(tasks.delete(&task.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn time_spent_tracks_last_record() {
        let tasks = reconciler().await;
        let task = tasks.create(draft("Survey", "Read related work")).await.unwrap();
        for seconds in [12, 40, 41] {
            tasks
                .apply_stop(&task.id, TimeRecord { timestamp: Utc::now(), seconds })
                .await
                .unwrap();
        }

        let stored = tasks.get(&task.id).await.unwrap();
        assert_eq!(stored.time_records.len(), 3);
        assert_eq!(stored.time_spent, stored.last_record().map(|r| r.seconds));
    }

    #[tokio::test]
    async fn collection_is_reloaded_from_store() {
        let db = Database::open_in_memory().unwrap();
        let tasks = TaskReconciler::load(db.clone()).await.unwrap();
        let task = tasks.create(draft("Survey", "Read related work")).await.unwrap();

        let reloaded = TaskReconciler::load(db).await.unwrap();
        assert_eq!(reloaded.list().await, vec![task]);
    }

    #[tokio::test]
    async fn malformed_store_loads_as_empty() {
        let db = Database::open_in_memory().unwrap();
        db.put_value(TASKS_KEY, "{not json".into()).await.unwrap();

        let tasks = TaskReconciler::load(db).await.unwrap();
        assert!(tasks.list().await.is_empty());
    }
}
