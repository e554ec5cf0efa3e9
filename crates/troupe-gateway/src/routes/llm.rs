use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/llm/providers", get(list_providers))
        .route("/api/llm/models/{provider}", get(list_models))
        .route("/api/llm/provider", post(set_provider))
        .route("/api/llm/model", post(set_model))
}

#[derive(Deserialize)]
struct ProviderRequest {
    provider: String,
}

#[derive(Deserialize)]
struct ModelRequest {
    provider: String,
    model: String,
}

async fn list_providers(State(state): State<AppState>) -> Json<Value> {
    let providers = state.catalog.providers();
    let display_names: BTreeMap<_, _> = providers
        .iter()
        .map(|p| (p.id.clone(), p.display_name.clone()))
        .collect();
    let ids: Vec<_> = providers.iter().map(|p| p.id.clone()).collect();
    Json(json!({
        "status": "success",
        "providers": ids,
        "display_names": display_names,
        "current_provider": state.catalog.current_provider(),
    }))
}

async fn list_models(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Json<Value>> {
    let models = state.catalog.models(&provider)?;
    Ok(Json(json!({
        "status": "success",
        "models": models.available,
        "current_model": models.current,
    })))
}

async fn set_provider(
    State(state): State<AppState>,
    Json(req): Json<ProviderRequest>,
) -> ApiResult<Json<Value>> {
    state.catalog.set_provider(&req.provider)?;
    Ok(Json(json!({
        "status": "success",
        "provider": req.provider,
        "display_name": state.catalog.display_name(&req.provider),
    })))
}

async fn set_model(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> ApiResult<Json<Value>> {
    state.catalog.set_model(&req.provider, &req.model)?;
    Ok(Json(json!({
        "status": "success",
        "provider": req.provider,
        "model": req.model,
    })))
}
