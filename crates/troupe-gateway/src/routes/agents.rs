use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ApiResult;
use crate::state::AppState;
use troupe_core::TeamError;

const DEFAULT_MEMORY_LIMIT: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/execute", post(execute))
        .route("/api/run", post(run_team))
        .route("/api/agents", get(list_agents))
        .route(
            "/api/conversations/{agent}",
            get(get_conversations).delete(clear_conversations),
        )
        .route("/api/memory/{agent}", get(agent_memory))
        .route("/api/context", get(get_context).put(set_context))
}

#[derive(Deserialize)]
struct ChatRequest {
    agent: String,
    message: String,
}

#[derive(Deserialize)]
struct TaskRequest {
    agent: String,
    task: String,
}

#[derive(Deserialize)]
struct MemoryQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ContextUpdate {
    key: String,
    value: Value,
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<Value>> {
    let agent = state.team.get(&req.agent)?;
    debug!(agent = %req.agent, "Chat request");
    let generation = agent.chat(&req.message).await?;
    Ok(Json(json!({
        "status": "success",
        "response": generation.text,
        "agent": req.agent,
        "llm_info": {
            "provider": generation.provider,
            "model": generation.model,
            "provider_display_name": state.catalog.display_name(&generation.provider),
        }
    })))
}

async fn execute(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> ApiResult<Json<Value>> {
    let agent = state.team.get(&req.agent)?;
    if req.task.trim().is_empty() {
        return Err(TeamError::InvalidInput("task must not be empty".into()).into());
    }
    let outcome = agent.execute(&req.task).await;
    Ok(Json(json!({ "agent": req.agent, "result": outcome })))
}

async fn run_team(State(state): State<AppState>) -> Json<Value> {
    let results = state.team.run_standing_tasks().await;
    Json(json!({ "status": "success", "results": results }))
}

async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let agents: Vec<Value> = state
        .team
        .identities()
        .into_iter()
        .map(|identity| {
            let task = state.team.standing_task(&identity.role).map(str::to_string);
            json!({
                "role": identity.role,
                "title": identity.title,
                "goal": identity.goal,
                "backstory": identity.backstory,
                "standing_task": task,
            })
        })
        .collect();
    Json(json!({ "agents": agents }))
}

async fn get_conversations(
    State(state): State<AppState>,
    Path(agent): Path<String>,
) -> ApiResult<Json<Value>> {
    let runtime = state.team.get(&agent)?;
    Ok(Json(json!({ "conversations": runtime.get_conversations() })))
}

async fn clear_conversations(
    State(state): State<AppState>,
    Path(agent): Path<String>,
) -> ApiResult<Json<Value>> {
    state.team.get(&agent)?.clear_conversations();
    Ok(Json(json!({ "status": "success" })))
}

async fn agent_memory(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    Query(query): Query<MemoryQuery>,
) -> ApiResult<Json<Value>> {
    state.team.get(&agent)?;
    let entries = state
        .store
        .read_recent(&agent, query.limit.unwrap_or(DEFAULT_MEMORY_LIMIT))
        .await;
    Ok(Json(json!({ "agent": agent, "entries": entries })))
}

async fn get_context(State(state): State<AppState>) -> Json<Value> {
    let context = state.store.get_context(None).await.unwrap_or_else(|| json!({}));
    Json(json!({ "context": context }))
}

async fn set_context(
    State(state): State<AppState>,
    Json(update): Json<ContextUpdate>,
) -> ApiResult<Json<Value>> {
    state.store.set_context(&update.key, update.value).await?;
    Ok(Json(json!({ "status": "success" })))
}
