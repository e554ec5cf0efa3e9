//! Projects, their files and their tasks, stored one directory per project.

mod draft;
mod store;
mod types;

pub use draft::{draft_prompt, parse_project_draft, ProjectDraft};
pub use store::{validate_project_name, ProjectStore};
pub use types::{
    FileRecord, ImportInfo, NewTask, Project, StructureNode, Task, TaskStatus,
};
