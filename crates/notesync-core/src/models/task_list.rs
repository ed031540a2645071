//! Task-list transcoding between local tasks and a markdown checklist.
//!
//! Backends only store text, so a task-list note is sent as one
//! `- [ ] item` / `- [x] item` line per task.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single checklist entry of a task-list note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteTask {
    pub id: i64,
    pub content: String,
    pub is_done: bool,
}

impl NoteTask {
    #[must_use]
    pub fn new(id: i64, content: impl Into<String>, is_done: bool) -> Self {
        Self {
            id,
            content: content.into(),
            is_done,
        }
    }
}

fn checklist_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"^\s*[-*]\s+\[([ xX])\]\s?(.*)$").expect("checklist regex is valid")
    })
}

/// Serialize tasks to a markdown checklist.
///
/// # Examples
///
/// ```
/// use notesync_core::models::{task_list_to_markdown, NoteTask};
///
/// let tasks = vec![NoteTask::new(0, "Milk", false), NoteTask::new(1, "Eggs", true)];
/// assert_eq!(task_list_to_markdown(&tasks), "- [ ] Milk\n- [x] Eggs");
/// ```
#[must_use]
pub fn task_list_to_markdown(tasks: &[NoteTask]) -> String {
    tasks
        .iter()
        .map(|task| {
            let mark = if task.is_done { 'x' } else { ' ' };
            format!("- [{mark}] {}", task.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a markdown checklist into tasks.
///
/// Blank lines are skipped; lines that are not checklist items become
/// unchecked tasks. Ids are assigned sequentially from 0.
#[must_use]
pub fn markdown_to_task_list(markdown: &str) -> Vec<NoteTask> {
    markdown
        .lines()
        .filter(|line| !line.trim().is_empty())
        .zip(0_i64..)
        .map(|(line, id)| match checklist_line().captures(line) {
            Some(caps) => NoteTask::new(id, caps[2].trim(), caps[1].eq_ignore_ascii_case("x")),
            None => NoteTask::new(id, line.trim(), false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_checked_and_unchecked_items() {
        let tasks = markdown_to_task_list("- [ ] one\n* [X] two\n\n-  [x]   three");
        assert_eq!(
            tasks,
            vec![
                NoteTask::new(0, "one", false),
                NoteTask::new(1, "two", true),
                NoteTask::new(2, "three", true),
            ]
        );
    }

    #[test]
    fn plain_lines_become_unchecked_tasks() {
        let tasks = markdown_to_task_list("buy bread\n- [x] call mom");
        assert_eq!(tasks[0], NoteTask::new(0, "buy bread", false));
        assert_eq!(tasks[1], NoteTask::new(1, "call mom", true));
    }

    #[test]
    fn empty_list_serializes_to_empty_string() {
        assert_eq!(task_list_to_markdown(&[]), "");
        assert!(markdown_to_task_list("").is_empty());
    }

    #[test]
    fn serialized_list_parses_back_to_same_tasks() {
        let tasks = vec![
            NoteTask::new(0, "alpha", true),
            NoteTask::new(1, "beta", false),
        ];
        assert_eq!(markdown_to_task_list(&task_list_to_markdown(&tasks)), tasks);
    }
}
