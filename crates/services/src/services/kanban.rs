//! Kanban board model: columns, priorities and task ordering.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KanbanError {
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
    #[error("unknown priority '{0}'")]
    UnknownPriority(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Column order on the board.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Backlog,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::Todo => "To do",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Review => "Review",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = KanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| KanbanError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = KanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| KanbanError::UnknownPriority(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_key")]
    pub key: String,
    pub project_key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub feature_key: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub status: TaskStatus,
    pub tasks: Vec<Task>,
}

/// Group tasks into the fixed column order, each column sorted by position.
pub fn board(tasks: Vec<Task>) -> Vec<Column> {
    let mut columns: Vec<Column> = TaskStatus::ALL
        .into_iter()
        .map(|status| Column {
            status,
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
            column.tasks.push(task);
        }
    }
    for column in &mut columns {
        column
            .tasks
            .sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.key.cmp(&b.key)));
    }
    columns
}

/// Next free position at the bottom of a column.
pub fn next_position(column: &[Task]) -> i64 {
    column.iter().map(|t| t.position).max().map_or(0, |max| max + 1)
}

/// New dense positions for `column` after inserting `moved` at `index`.
///
/// `column` holds the target column's tasks in board order and may already
/// contain `moved` (a move within the same column). Returns `(key, position)`
/// for every task in the column.
pub fn reorder(column: &[Task], moved: &str, index: usize) -> Vec<(String, i64)> {
    let mut keys: Vec<&str> = column
        .iter()
        .map(|t| t.key.as_str())
        .filter(|k| *k != moved)
        .collect();
    let index = index.min(keys.len());
    keys.insert(index, moved);
    keys.into_iter()
        .enumerate()
        .map(|(pos, key)| (key.to_string(), pos as i64))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureProgress {
    pub total: u32,
    pub done: u32,
}

impl FeatureProgress {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut progress = FeatureProgress { total: 0, done: 0 };
        for task in tasks {
            progress.total += 1;
            if task.status == TaskStatus::Done {
                progress.done += 1;
            }
        }
        progress
    }

    /// Completion percentage, rounded down; zero for an empty feature.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            self.done * 100 / self.total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(key: &str, status: TaskStatus, position: i64) -> Task {
        Task {
            key: key.to_string(),
            project_key: "p1".to_string(),
            title: key.to_uppercase(),
            description: String::new(),
            status,
            priority: Priority::default(),
            position,
            feature_key: None,
            assignee: None,
        }
    }

    #[test]
    fn status_parsing() {
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!(matches!(
            "doing".parse::<TaskStatus>(),
            Err(KanbanError::UnknownStatus(_))
        ));
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
    }

    #[test]
    fn board_groups_in_column_order() {
        let columns = board(vec![
            task("c", TaskStatus::Done, 0),
            task("b", TaskStatus::Todo, 2),
            task("a", TaskStatus::Todo, 1),
        ]);
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].status, TaskStatus::Backlog);
        let todo: Vec<_> = columns[1].tasks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(todo, ["a", "b"]);
        assert_eq!(columns[4].tasks.len(), 1);
    }

    #[test]
    fn next_position_after_max() {
        assert_eq!(next_position(&[]), 0);
        let column = [task("a", TaskStatus::Todo, 3), task("b", TaskStatus::Todo, 7)];
        assert_eq!(next_position(&column), 8);
    }

    #[test]
    fn reorder_within_column() {
        let column = [
            task("a", TaskStatus::Todo, 0),
            task("b", TaskStatus::Todo, 1),
            task("c", TaskStatus::Todo, 2),
        ];
        let positions = reorder(&column, "c", 0);
        assert_eq!(
            positions,
            vec![("c".into(), 0), ("a".into(), 1), ("b".into(), 2)]
        );
    }

    #[test]
    fn reorder_into_other_column_clamps_index() {
        let column = [task("a", TaskStatus::Done, 0)];
        let positions = reorder(&column, "z", 99);
        assert_eq!(positions, vec![("a".into(), 0), ("z".into(), 1)]);
    }

    #[test]
    fn feature_progress_percent() {
        let tasks = [
            task("a", TaskStatus::Done, 0),
            task("b", TaskStatus::Todo, 0),
            task("c", TaskStatus::Done, 1),
        ];
        let progress = FeatureProgress::from_tasks(&tasks);
        assert_eq!(progress, FeatureProgress { total: 3, done: 2 });
        assert_eq!(progress.percent(), 66);
        assert_eq!(FeatureProgress::from_tasks(&[]).percent(), 0);
    }
}
