/// Errors surfaced to the UI layer by task and timer operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{field} must not be empty")]
    Validation { field: &'static str },
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("timer already running for task {active_task_id}; stop it first")]
    Conflict { active_task_id: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskError::NotFound(_))
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
