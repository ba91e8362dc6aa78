use crate::{
    models::Task,
    timer::{TimerController, TimerSnapshot},
    AppState,
};

fn controller_from_state(state: &AppState) -> &TimerController {
    &state.timer
}

pub async fn get_timer_state(state: &AppState) -> Result<TimerSnapshot, String> {
    Ok(controller_from_state(state).get_snapshot())
}

/// Starts the timer for a stored task, resuming from its recorded time.
pub async fn start_timer(state: &AppState, task_id: &str) -> Result<TimerSnapshot, String> {
    controller_from_state(state)
        .start_task(task_id)
        .await
        .map_err(|e| e.to_string())
}

/// `Ok(None)` when no timer was running.
pub async fn stop_timer(state: &AppState) -> Result<Option<Task>, String> {
    controller_from_state(state)
        .stop()
        .await
        .map_err(|e| e.to_string())
}
