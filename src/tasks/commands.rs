use crate::{
    error::TaskError,
    models::{Category, Task, TaskDraft, TaskEdit},
    predictor::{CategoryFeedback, Suggestion},
    AppState,
};

use super::group_by_category;

pub async fn suggest_category(
    state: &AppState,
    title: &str,
    description: &str,
) -> Option<Suggestion> {
    state.suggester.suggest(title, description).await
}

/// Creates the task. When a suggestion was shown for this draft, reports
/// whether the user kept it.
pub async fn create_task(
    state: &AppState,
    draft: TaskDraft,
    suggestion: Option<Suggestion>,
) -> Result<Task, String> {
    let task = state.tasks.create(draft).await.map_err(|e| e.to_string())?;

    if let Some(suggestion) = suggestion {
        report_feedback(state, &task, suggestion);
    }

    Ok(task)
}

/// Saves the edit and resyncs the running timer. `suggestion` is the one
/// shown for the edited text, if any.
pub async fn update_task(
    state: &AppState,
    edit: TaskEdit,
    suggestion: Option<Suggestion>,
) -> Result<Task, String> {
    let task = state.tasks.update(edit).await.map_err(|e| e.to_string())?;
    state.timer.reconcile_with(&task);

    if let Some(suggestion) = suggestion {
        report_feedback(state, &task, suggestion);
    }

    Ok(task)
}

fn report_feedback(state: &AppState, task: &Task, suggestion: Suggestion) {
    state.feedback.report(CategoryFeedback::new(
        &task.title,
        &task.description,
        suggestion.category,
        task.category,
    ));
}

/// Stops the task's timer first if it is the one running.
pub async fn delete_task(state: &AppState, task_id: &str) -> Result<Task, String> {
    if state.timer.is_running_for(task_id) {
        state.timer.stop().await.map_err(|e| e.to_string())?;
    }
    state.tasks.delete(task_id).await.map_err(|e| e.to_string())
}

pub async fn get_task(state: &AppState, task_id: &str) -> Result<Task, String> {
    state
        .tasks
        .get(task_id)
        .await
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()).to_string())
}

pub async fn list_tasks(state: &AppState) -> Result<Vec<Task>, String> {
    Ok(state.tasks.list().await)
}

pub async fn list_tasks_grouped(state: &AppState) -> Result<Vec<(Category, Vec<Task>)>, String> {
    Ok(group_by_category(&state.tasks.list().await))
}
