pub mod commands;
pub mod reconciler;
pub mod view;

pub use reconciler::{TaskReconciler, TASKS_KEY};
pub use view::group_by_category;
