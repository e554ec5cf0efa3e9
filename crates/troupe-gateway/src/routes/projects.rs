use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use troupe_core::project::{NewTask, TaskStatus};
use troupe_core::{ProjectStore, TeamError, TeamResult};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", post(create_project).get(list_projects))
        .route("/api/projects/import", post(import_project))
        .route("/api/projects/draft", post(draft_project))
        .route("/api/projects/{name}", get(get_project))
        .route("/api/projects/{name}/plan", post(plan_project))
        .route(
            "/api/files",
            post(create_file)
                .put(update_file)
                .delete(delete_file)
                .get(read_file),
        )
        .route("/api/files/{project}", get(list_files))
        .route("/api/tasks", post(add_task).put(update_task))
        .route("/api/tasks/{project}", get(get_tasks))
}

#[derive(Deserialize)]
struct ProjectRequest {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ImportRequest {
    source_directory: String,
    project_name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct DraftRequest {
    #[serde(default = "default_drafting_agent")]
    agent: String,
    message: String,
}

fn default_drafting_agent() -> String {
    "chiefArchitect".to_string()
}

#[derive(Deserialize)]
struct FileRequest {
    project_name: String,
    file_path: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct FilePathRequest {
    project_name: String,
    file_path: String,
}

#[derive(Deserialize)]
struct DirectoryQuery {
    #[serde(default)]
    directory: String,
}

#[derive(Deserialize)]
struct ProjectQuery {
    project_name: String,
}

#[derive(Deserialize)]
struct TaskUpdateRequest {
    project_name: String,
    task_id: String,
    status: String,
}

/// Run a project store call on the blocking pool.
async fn with_projects<T, F>(projects: &Arc<ProjectStore>, op: F) -> ApiResult<T>
where
    F: FnOnce(&ProjectStore) -> TeamResult<T> + Send + 'static,
    T: Send + 'static,
{
    let projects = projects.clone();
    tokio::task::spawn_blocking(move || op(&projects))
        .await
        .map_err(|e| TeamError::Persistence(format!("project task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<ProjectRequest>,
) -> ApiResult<Json<Value>> {
    let project = with_projects(&state.projects, move |p| {
        p.create_project(&req.name, &req.description)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "project": project })))
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (projects, current) = with_projects(&state.projects, |p| {
        Ok((p.list_projects()?, p.current_project()))
    })
    .await?;
    Ok(Json(json!({
        "status": "success",
        "projects": projects,
        "current": current,
    })))
}

async fn get_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let project = with_projects(&state.projects, move |p| p.get_project(&name)).await?;
    Ok(Json(json!({ "status": "success", "project": project })))
}

async fn plan_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let project = with_projects(&state.projects, move |p| p.plan_project(&name)).await?;
    Ok(Json(json!({ "status": "success", "project": project })))
}

async fn import_project(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<Json<Value>> {
    let source = PathBuf::from(&req.source_directory);
    let project = with_projects(&state.projects, move |p| {
        p.import_existing_project(&source, &req.project_name, &req.description)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "project": project })))
}

async fn draft_project(
    State(state): State<AppState>,
    Json(req): Json<DraftRequest>,
) -> ApiResult<Json<Value>> {
    let agent = state.team.get(&req.agent)?;
    let project = agent.propose_project(&req.message).await?;
    Ok(Json(json!({ "status": "success", "project": project })))
}

async fn create_file(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> ApiResult<Json<Value>> {
    let file = with_projects(&state.projects, move |p| {
        p.create_file(&req.project_name, &req.file_path, &req.content)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "file": file })))
}

async fn read_file(
    State(state): State<AppState>,
    Query(req): Query<FilePathRequest>,
) -> ApiResult<Json<Value>> {
    let content = with_projects(&state.projects, move |p| {
        p.read_file(&req.project_name, &req.file_path)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "content": content })))
}

async fn update_file(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> ApiResult<Json<Value>> {
    let file = with_projects(&state.projects, move |p| {
        p.update_file(&req.project_name, &req.file_path, &req.content)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "file": file })))
}

async fn delete_file(
    State(state): State<AppState>,
    Json(req): Json<FilePathRequest>,
) -> ApiResult<Json<Value>> {
    with_projects(&state.projects, move |p| {
        p.delete_file(&req.project_name, &req.file_path)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "result": true })))
}

async fn list_files(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<Json<Value>> {
    let files = with_projects(&state.projects, move |p| {
        p.list_files(&project, &query.directory)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "files": files })))
}

async fn add_task(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    Json(task): Json<NewTask>,
) -> ApiResult<Json<Value>> {
    let task = with_projects(&state.projects, move |p| {
        p.add_task(&query.project_name, task)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

async fn update_task(
    State(state): State<AppState>,
    Json(req): Json<TaskUpdateRequest>,
) -> ApiResult<Json<Value>> {
    let status = TaskStatus::from_str(&req.status).ok_or_else(|| {
        TeamError::InvalidInput(format!("unknown task status '{}'", req.status))
    })?;
    let task = with_projects(&state.projects, move |p| {
        p.update_task_status(&req.project_name, &req.task_id, status)
    })
    .await?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

async fn get_tasks(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<Value>> {
    let tasks = with_projects(&state.projects, move |p| p.get_tasks(&project)).await?;
    Ok(Json(json!({ "status": "success", "tasks": tasks })))
}
