use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    FileRecord, ImportInfo, NewTask, Project, StructureNode, Task, TaskStatus,
};
use crate::error::{Missing, TeamError, TeamResult};

const CONFIG_FILE: &str = "project_config.json";

/// Files above this size are copied without being read.
const MAX_TEXT_IMPORT_BYTES: u64 = 10 * 1024 * 1024;

const SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    "node_modules",
    "__pycache__",
    "venv",
    "env",
    ".env",
    ".venv",
    ".vs",
    ".idea",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "svg", "mp3", "mp4", "wav", "avi", "mov", "mkv",
    "pdf", "zip", "tar", "gz", "rar", "7z", "exe", "dll", "so", "dylib", "pyc", "pyd", "pyo",
    "jar", "war", "ear", "db", "sqlite", "sqlite3", "xls", "xlsx", "doc", "docx", "ppt", "pptx",
];

/// Standard plan: (name, description, assigned role).
const STANDARD_PLAN: &[(&str, &str, &str)] = &[
    (
        "Design system architecture",
        "Create a detailed system design and architecture diagram",
        "chiefArchitect",
    ),
    (
        "Set up project structure",
        "Initialize the basic project structure and files",
        "backendEngineer",
    ),
    (
        "Create UI mockups",
        "Design the user interface components and layouts",
        "uiUxDesigner",
    ),
    (
        "Implement frontend components",
        "Develop the React/Next.js components for the UI",
        "frontendEngineer",
    ),
    (
        "Implement backend APIs",
        "Develop the API endpoints and database models",
        "backendEngineer",
    ),
    (
        "Set up CI/CD pipeline",
        "Configure continuous integration and deployment",
        "devopsEngineer",
    ),
    (
        "Document API endpoints",
        "Create comprehensive API documentation",
        "technicalWriter",
    ),
];

/// File-backed projects, one directory each under `base`.
///
/// Every read-modify-write of a `project_config.json` happens while holding
/// `current`, which doubles as the mutation lock.
pub struct ProjectStore {
    base: PathBuf,
    current: Mutex<Option<String>>,
}

impl ProjectStore {
    pub fn new(base: impl Into<PathBuf>) -> TeamResult<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| {
            TeamError::Persistence(format!(
                "failed to create projects directory '{}': {e}",
                base.display()
            ))
        })?;
        Ok(Self {
            base,
            current: Mutex::new(None),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recently created or imported project.
    pub fn current_project(&self) -> Option<String> {
        self.lock().clone()
    }

    pub fn create_project(&self, name: &str, description: &str) -> TeamResult<Project> {
        validate_project_name(name)?;
        let mut current = self.lock();
        let project = self.create_locked(name, description)?;
        *current = Some(name.to_string());
        info!(project = name, "Created project");
        Ok(project)
    }

    fn create_locked(&self, name: &str, description: &str) -> TeamResult<Project> {
        let dir = self.base.join(name);
        if dir.join(CONFIG_FILE).exists() {
            return Err(TeamError::Conflict(format!("Project {name} already exists")));
        }
        let existed = dir.exists();
        self.write_skeleton(&dir, name, description).inspect_err(|_| {
            if !existed {
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    warn!(path = %dir.display(), "Failed to remove partial project: {cleanup}");
                }
            }
        })
    }

    fn write_skeleton(&self, dir: &Path, name: &str, description: &str) -> TeamResult<Project> {
        std::fs::create_dir_all(dir.join("src"))?;
        std::fs::create_dir_all(dir.join("docs"))?;

        let now = Utc::now();
        let mut structure = BTreeMap::new();
        structure.insert("src".to_string(), StructureNode::directory());
        structure.insert("docs".to_string(), StructureNode::directory());
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            tasks: Vec::new(),
            files: Vec::new(),
            structure,
            import_info: None,
        };
        self.save(&project)?;
        std::fs::write(
            dir.join("README.md"),
            format!(
                "# {name}\n\n{description}\n\n## Getting Started\n\nThis project is managed by the team."
            ),
        )?;
        Ok(project)
    }

    pub fn get_project(&self, name: &str) -> TeamResult<Project> {
        validate_project_name(name)?;
        let path = self.base.join(name).join(CONFIG_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TeamError::not_found(Missing::Project, name))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents).map_err(|e| {
            TeamError::Persistence(format!("corrupt project config '{}': {e}", path.display()))
        })
    }

    /// Directories under the base that hold a project config, sorted.
    pub fn list_projects(&self) -> TeamResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && entry.path().join(CONFIG_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn save(&self, project: &Project) -> TeamResult<()> {
        let path = self.base.join(&project.name).join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(project)
            .map_err(|e| TeamError::Persistence(format!("failed to encode project: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn file_path(&self, project: &str, file_path: &str) -> TeamResult<(PathBuf, String)> {
        let rel = normalize_relative(file_path)?;
        if rel == CONFIG_FILE {
            return Err(TeamError::InvalidInput(format!(
                "{CONFIG_FILE} is managed by the project store"
            )));
        }
        Ok((self.base.join(project).join(&rel), rel))
    }

    /// Write a new file (or overwrite an existing one) and track it.
    pub fn create_file(
        &self,
        project_name: &str,
        file_path: &str,
        content: &str,
    ) -> TeamResult<FileRecord> {
        let _guard = self.lock();
        let mut project = self.get_project(project_name)?;
        let (full, rel) = self.file_path(project_name, file_path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;

        let now = Utc::now();
        let record = upsert_record(&mut project.files, &rel, None);
        insert_structure(&mut project.structure, &rel);
        project.updated_at = now;
        self.save(&project)?;
        debug!(project = project_name, path = %rel, "Created file");
        Ok(record)
    }

    pub fn read_file(&self, project_name: &str, file_path: &str) -> TeamResult<String> {
        self.get_project(project_name)?;
        let (full, rel) = self.file_path(project_name, file_path)?;
        match std::fs::read_to_string(&full) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TeamError::not_found(Missing::File, rel))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite an existing file.
    pub fn update_file(
        &self,
        project_name: &str,
        file_path: &str,
        content: &str,
    ) -> TeamResult<FileRecord> {
        let _guard = self.lock();
        let mut project = self.get_project(project_name)?;
        let (full, rel) = self.file_path(project_name, file_path)?;
        if !full.is_file() {
            return Err(TeamError::not_found(Missing::File, rel));
        }
        std::fs::write(&full, content)?;

        let record = upsert_record(&mut project.files, &rel, None);
        insert_structure(&mut project.structure, &rel);
        project.updated_at = Utc::now();
        self.save(&project)?;
        Ok(record)
    }

    pub fn delete_file(&self, project_name: &str, file_path: &str) -> TeamResult<()> {
        let _guard = self.lock();
        let mut project = self.get_project(project_name)?;
        let (full, rel) = self.file_path(project_name, file_path)?;
        if !full.is_file() {
            return Err(TeamError::not_found(Missing::File, rel));
        }
        std::fs::remove_file(&full)?;

        project.files.retain(|f| f.path != rel);
        remove_structure(&mut project.structure, &rel);
        project.updated_at = Utc::now();
        self.save(&project)?;
        debug!(project = project_name, path = %rel, "Deleted file");
        Ok(())
    }

    /// Files under `directory` (relative to the project root), sorted.
    pub fn list_files(&self, project_name: &str, directory: &str) -> TeamResult<Vec<String>> {
        self.get_project(project_name)?;
        let root = self.base.join(project_name);
        let rel = if directory.trim().is_empty() {
            String::new()
        } else {
            normalize_relative(directory)?
        };
        let target = root.join(&rel);
        if !target.is_dir() {
            return Err(TeamError::not_found(Missing::Directory, directory));
        }

        let mut files = Vec::new();
        walk_files(&target, &mut |path: &Path| {
            let Ok(relative) = path.strip_prefix(&root) else {
                return;
            };
            let relative = to_slash(relative);
            if relative != CONFIG_FILE {
                files.push(relative);
            }
        })?;
        files.sort();
        Ok(files)
    }

    pub fn add_task(&self, project_name: &str, task: NewTask) -> TeamResult<Task> {
        let _guard = self.lock();
        let mut project = self.get_project(project_name)?;
        let task = build_task(task);
        project.tasks.push(task.clone());
        project.updated_at = Utc::now();
        self.save(&project)?;
        info!(project = project_name, task = %task.name, assigned_to = %task.assigned_to, "Added task");
        Ok(task)
    }

    pub fn update_task_status(
        &self,
        project_name: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> TeamResult<Task> {
        let _guard = self.lock();
        let mut project = self.get_project(project_name)?;
        let now = Utc::now();
        let task = project
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| TeamError::not_found(Missing::Task, task_id))?;
        task.status = status;
        task.updated_at = now;
        let updated = task.clone();
        project.updated_at = now;
        self.save(&project)?;
        debug!(
            project = project_name,
            task = task_id,
            status = status.as_str(),
            "Updated task"
        );
        Ok(updated)
    }

    pub fn get_tasks(&self, project_name: &str) -> TeamResult<Vec<Task>> {
        Ok(self.get_project(project_name)?.tasks)
    }

    pub fn get_task(&self, project_name: &str, task_id: &str) -> TeamResult<Option<Task>> {
        Ok(self
            .get_project(project_name)?
            .tasks
            .into_iter()
            .find(|t| t.id == task_id))
    }

    /// Append the standard role-assigned plan to a project.
    pub fn plan_project(&self, project_name: &str) -> TeamResult<Project> {
        let _guard = self.lock();
        let mut project = self.get_project(project_name)?;
        for (name, description, role) in STANDARD_PLAN {
            project
                .tasks
                .push(build_task(NewTask::assigned(name, description, role)));
        }
        project.updated_at = Utc::now();
        self.save(&project)?;
        info!(project = project_name, tasks = STANDARD_PLAN.len(), "Planned project");
        Ok(project)
    }

    /// Create a project from an existing directory tree.
    ///
    /// Version-control and dependency directories are skipped. Files that look
    /// binary are copied verbatim. The store lock is only held while the
    /// project config is written, not during the copy. On failure the
    /// partially created project is removed.
    pub fn import_existing_project(
        &self,
        source_dir: &Path,
        project_name: &str,
        description: &str,
    ) -> TeamResult<Project> {
        validate_project_name(project_name)?;
        if !source_dir.is_dir() {
            return Err(TeamError::not_found(
                Missing::Directory,
                source_dir.display().to_string(),
            ));
        }

        self.create_locked_guarded(project_name, description)?;
        let result = copy_tree(source_dir, &self.base.join(project_name))
            .and_then(|copied| self.record_import(project_name, source_dir, copied));
        match result {
            Ok(project) => {
                info!(
                    project = project_name,
                    source = %source_dir.display(),
                    files = project.files.len(),
                    "Imported project"
                );
                Ok(project)
            }
            Err(e) => {
                let dir = self.base.join(project_name);
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    warn!(path = %dir.display(), "Failed to clean up after import: {cleanup}");
                }
                Err(TeamError::Persistence(format!("Failed to import project: {e}")))
            }
        }
    }

    fn create_locked_guarded(&self, name: &str, description: &str) -> TeamResult<Project> {
        let _guard = self.lock();
        self.create_locked(name, description)
    }

    fn record_import(
        &self,
        project_name: &str,
        source_dir: &Path,
        copied: CopiedTree,
    ) -> TeamResult<Project> {
        let mut current = self.lock();
        let mut project = self.get_project(project_name)?;
        for (rel, binary) in &copied.files {
            upsert_record(&mut project.files, rel, Some(*binary));
            insert_structure(&mut project.structure, rel);
        }
        project.import_info = Some(ImportInfo {
            source_directory: source_dir.display().to_string(),
            imported_at: Utc::now(),
            file_count: copied.files.len(),
            skipped_count: copied.skipped,
        });
        project.updated_at = Utc::now();
        self.save(&project)?;
        *current = Some(project_name.to_string());
        Ok(project)
    }
}

/// Relative paths copied by an import, with their binary flag.
struct CopiedTree {
    files: Vec<(String, bool)>,
    skipped: usize,
}

fn copy_tree(source_dir: &Path, dest_root: &Path) -> TeamResult<CopiedTree> {
    let mut sources = Vec::new();
    collect_import_files(source_dir, &mut sources)?;

    let mut copied = CopiedTree {
        files: Vec::new(),
        skipped: 0,
    };
    for src in sources {
        let Ok(relative) = src.strip_prefix(source_dir) else {
            continue;
        };
        let rel = to_slash(relative);
        if rel == CONFIG_FILE {
            copied.skipped += 1;
            continue;
        }
        match import_file(&src, &dest_root.join(relative)) {
            Ok(binary) => copied.files.push((rel, binary)),
            Err(e) => {
                warn!(path = %rel, "Skipping file during import: {e}");
                copied.skipped += 1;
            }
        }
    }
    Ok(copied)
}

/// Reject empty names, separators and dot-names so a project is always a
/// single directory directly under the base.
pub fn validate_project_name(name: &str) -> TeamResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed != name {
        return Err(TeamError::InvalidInput(format!(
            "invalid project name '{name}'"
        )));
    }
    if name.starts_with('.')
        || name.len() > 100
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.'))
    {
        return Err(TeamError::InvalidInput(format!(
            "invalid project name '{name}'"
        )));
    }
    Ok(())
}

/// Normalize a caller-supplied path to a forward-slash relative path.
fn normalize_relative(path: &str) -> TeamResult<String> {
    let unified = path.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(TeamError::InvalidInput(format!(
                    "path '{path}' must be relative and stay inside the project"
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(TeamError::InvalidInput("path must not be empty".into()));
    }
    Ok(parts.join("/"))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_task(task: NewTask) -> Task {
    let now = Utc::now();
    Task {
        id: task
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: task
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Unnamed Task".to_string()),
        description: task.description,
        assigned_to: task.assigned_to,
        status: task.status.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    }
}

fn upsert_record(files: &mut Vec<FileRecord>, path: &str, binary: Option<bool>) -> FileRecord {
    let now = Utc::now();
    if let Some(existing) = files.iter_mut().find(|f| f.path == path) {
        existing.updated_at = now;
        if binary.is_some() {
            existing.binary = binary;
        }
        return existing.clone();
    }
    let record = FileRecord {
        id: Uuid::new_v4().to_string(),
        path: path.to_string(),
        created_at: now,
        updated_at: now,
        binary,
    };
    files.push(record.clone());
    record
}

fn insert_structure(structure: &mut BTreeMap<String, StructureNode>, path: &str) {
    let parts: Vec<&str> = path.split('/').collect();
    let Some((file, dirs)) = parts.split_last() else {
        return;
    };
    let mut level = structure;
    for dir in dirs {
        let node = level
            .entry(dir.to_string())
            .or_insert_with(StructureNode::directory);
        if matches!(node, StructureNode::File) {
            *node = StructureNode::directory();
        }
        level = match node {
            StructureNode::Directory { children } => children,
            StructureNode::File => return,
        };
    }
    level
        .entry(file.to_string())
        .or_insert(StructureNode::File);
}

fn remove_structure(structure: &mut BTreeMap<String, StructureNode>, path: &str) {
    let parts: Vec<&str> = path.split('/').collect();
    let Some((file, dirs)) = parts.split_last() else {
        return;
    };
    let mut level = structure;
    for dir in dirs {
        level = match level.get_mut(*dir) {
            Some(StructureNode::Directory { children }) => children,
            _ => return,
        };
    }
    level.remove(*file);
}

fn walk_files(dir: &Path, visit: &mut dyn FnMut(&Path)) -> TeamResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_files(&path, visit)?;
        } else if file_type.is_file() {
            visit(&path);
        }
    }
    Ok(())
}

fn collect_import_files(dir: &Path, out: &mut Vec<PathBuf>) -> TeamResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let name = entry.file_name();
            if SKIP_DIRS.contains(&name.to_string_lossy().as_ref()) {
                continue;
            }
            collect_import_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn looks_binary(path: &Path, size: u64) -> bool {
    let by_extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()));
    by_extension || size > MAX_TEXT_IMPORT_BYTES
}

/// Copy one file. Returns whether it was treated as binary.
fn import_file(src: &Path, dest: &Path) -> std::io::Result<bool> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let size = std::fs::metadata(src)?.len();
    if looks_binary(src, size) {
        std::fs::copy(src, dest)?;
        return Ok(true);
    }
    let bytes = std::fs::read(src)?;
    match String::from_utf8(bytes) {
        Ok(text) => {
            std::fs::write(dest, text)?;
            Ok(false)
        }
        Err(e) => {
            std::fs::write(dest, e.into_bytes())?;
            Ok(true)
        }
    }
}
