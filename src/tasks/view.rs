use crate::models::{Category, Task};

/// Groups tasks by category in catalogue order, highest priority first
/// within each group. Empty categories are left out.
pub fn group_by_category(tasks: &[Task]) -> Vec<(Category, Vec<Task>)> {
    Category::ALL
        .into_iter()
        .filter_map(|category| {
            let mut members: Vec<Task> = tasks
                .iter()
                .filter(|task| task.category == category)
                .cloned()
                .collect();
            if members.is_empty() {
                return None;
            }
            members.sort_by_key(|task| task.priority.rank());
            Some((category, members))
        })
        .collect()
}
