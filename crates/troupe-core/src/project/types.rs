use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contents of a project's `project_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub structure: BTreeMap<String, StructureNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_info: Option<ImportInfo>,
}

/// Tree of files tracked in a project, keyed by path component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureNode {
    Directory {
        #[serde(default)]
        children: BTreeMap<String, StructureNode>,
    },
    File,
}

impl StructureNode {
    pub fn directory() -> Self {
        StructureNode::Directory {
            children: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set for imported files; true when the content was copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Review,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "pending" | "todo" => Some(Self::Pending),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "completed" | "done" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task as submitted by a caller. Missing fields get defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTask {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: String,
    pub assigned_to: String,
    pub status: Option<TaskStatus>,
}

impl NewTask {
    pub fn assigned(name: &str, description: &str, role: &str) -> Self {
        Self {
            name: Some(name.into()),
            description: description.into(),
            assigned_to: role.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInfo {
    pub source_directory: String,
    pub imported_at: DateTime<Utc>,
    pub file_count: usize,
    pub skipped_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_accepts_common_spellings() {
        assert_eq!(TaskStatus::from_str("in-progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::from_str("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::from_str("DONE"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_str("archived"), None);
        assert_eq!(TaskStatus::Review.as_str(), "review");
    }

    #[test]
    fn structure_uses_type_tag() {
        let mut children = BTreeMap::new();
        children.insert("main.rs".to_string(), StructureNode::File);
        let node = StructureNode::Directory { children };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "directory",
                "children": { "main.rs": { "type": "file" } }
            })
        );
    }

    #[test]
    fn new_task_fills_defaults() {
        let task: NewTask = serde_json::from_value(serde_json::json!({
            "name": "Write tests"
        }))
        .unwrap();
        assert_eq!(task.name.as_deref(), Some("Write tests"));
        assert!(task.status.is_none());
        assert!(task.assigned_to.is_empty());
    }
}
