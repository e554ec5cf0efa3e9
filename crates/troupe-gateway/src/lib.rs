pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use troupe_config::GatewayConfig;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// The full JSON API.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::agents::routes())
        .merge(routes::projects::routes())
        .merge(routes::llm::routes())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &GatewayConfig, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid gateway listen address: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gateway");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use troupe_core::agent::builtin_roster;
    use troupe_core::llm::{ScriptedGenerator, ScriptedReply};
    use troupe_core::{ContextStore, ProjectStore, ProviderCatalog, StoreOptions, Team};

    use super::*;

    struct Harness {
        _dir: tempfile::TempDir,
        state: AppState,
        generator: Arc<ScriptedGenerator>,
    }

    impl Harness {
        async fn new(generator: ScriptedGenerator) -> Self {
            Self::with_timeout(generator, Duration::from_secs(5)).await
        }

        async fn with_timeout(generator: ScriptedGenerator, timeout: Duration) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(
                ContextStore::open(dir.path().join("memory.jsonl"), StoreOptions::default())
                    .await
                    .unwrap(),
            );
            let projects = Arc::new(ProjectStore::new(dir.path().join("projects")).unwrap());
            let generator = Arc::new(generator);
            let team = Team::assemble(
                builtin_roster(),
                store.clone(),
                generator.clone(),
                projects.clone(),
                timeout,
            );
            let state = AppState {
                team: Arc::new(team),
                store,
                projects,
                catalog: Arc::new(ProviderCatalog::builtin("deepseek")),
            };
            Self {
                _dir: dir,
                state,
                generator,
            }
        }

        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap();

            let resp = router(self.state.clone()).oneshot(request).await.unwrap();
            let status = resp.status();
            let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }
    }

    #[tokio::test]
    async fn chat_publishes_to_shared_memory() {
        let h = Harness::new(ScriptedGenerator::new([ScriptedReply::text(
            "use a normalized relational schema",
        )]))
        .await;

        let (status, body) = h
            .send(
                "POST",
                "/api/chat",
                Some(json!({ "agent": "chiefArchitect", "message": "design the schema" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["response"], "use a normalized relational schema");
        assert_eq!(body["llm_info"]["provider"], "scripted");

        let (status, body) = h.send("GET", "/api/memory/chiefArchitect?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entries"][0]["user_message"], "design the schema");

        let (_, body) = h.send("GET", "/api/conversations/chiefArchitect", None).await;
        assert_eq!(body["conversations"].as_array().unwrap().len(), 2);
        assert_eq!(body["conversations"][0]["role"], "user");

        let (status, _) = h.send("DELETE", "/api/conversations/chiefArchitect", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = h.send("GET", "/api/conversations/chiefArchitect", None).await;
        assert!(body["conversations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_is_404() {
        let h = Harness::new(ScriptedGenerator::always("ok")).await;
        let (status, body) = h
            .send(
                "POST",
                "/api/chat",
                Some(json!({ "agent": "ghostWriter", "message": "hi" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "not_found");
        assert!(h.generator.prompts().is_empty());

        let (status, _) = h.send("GET", "/api/conversations/ghostWriter", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = h.send("GET", "/api/memory/ghostWriter", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generation_failures_map_to_gateway_errors() {
        let h = Harness::new(ScriptedGenerator::new([ScriptedReply::Fail(
            "upstream down".into(),
        )]))
        .await;
        let (status, body) = h
            .send(
                "POST",
                "/api/chat",
                Some(json!({ "agent": "productManager", "message": "scope?" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "generation_failure");
        assert!(h.state.store.read_recent("productManager", 5).await.is_empty());
    }

    #[tokio::test]
    async fn slow_generation_is_504() {
        let h = Harness::with_timeout(
            ScriptedGenerator::new([ScriptedReply::Hang]),
            Duration::from_millis(50),
        )
        .await;
        let (status, body) = h
            .send(
                "POST",
                "/api/chat",
                Some(json!({ "agent": "productManager", "message": "scope?" })),
            )
            .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["kind"], "generation_failure");
    }

    #[tokio::test]
    async fn execute_and_run() {
        let h = Harness::new(ScriptedGenerator::always("done")).await;
        let (status, body) = h
            .send(
                "POST",
                "/api/execute",
                Some(json!({ "agent": "devopsEngineer", "task": "Set up CI/CD pipelines." })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!({ "status": "completed", "output": "done" }));

        let (status, body) = h.send("POST", "/api/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_object().unwrap().len(), 11);

        let (_, body) = h.send("GET", "/api/agents", None).await;
        assert_eq!(body["agents"].as_array().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn shared_context_roundtrip() {
        let h = Harness::new(ScriptedGenerator::always("ok")).await;
        let (status, _) = h
            .send(
                "PUT",
                "/api/context",
                Some(json!({ "key": "database", "value": "postgres" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = h.send("GET", "/api/context", None).await;
        assert_eq!(body["context"], json!({ "database": "postgres" }));

        let (status, _) = h
            .send("PUT", "/api/context", Some(json!({ "key": "", "value": 1 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn project_file_and_task_flow() {
        let h = Harness::new(ScriptedGenerator::always("ok")).await;

        let (status, body) = h
            .send(
                "POST",
                "/api/projects",
                Some(json!({ "name": "shop", "description": "A store" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project"]["name"], "shop");

        let (status, body) = h
            .send("POST", "/api/projects", Some(json!({ "name": "shop" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");

        let (status, _) = h
            .send(
                "POST",
                "/api/files",
                Some(json!({ "project_name": "shop", "file_path": "src/main.rs", "content": "fn main() {}" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = h
            .send("GET", "/api/files?project_name=shop&file_path=src/main.rs", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "fn main() {}");

        let (_, body) = h.send("GET", "/api/files/shop?directory=src", None).await;
        assert_eq!(body["files"], json!(["src/main.rs"]));

        let (status, _) = h
            .send(
                "POST",
                "/api/files",
                Some(json!({ "project_name": "shop", "file_path": "../escape", "content": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h
            .send(
                "DELETE",
                "/api/files",
                Some(json!({ "project_name": "shop", "file_path": "src/main.rs" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = h
            .send(
                "POST",
                "/api/tasks?project_name=shop",
                Some(json!({ "name": "Build cart", "assigned_to": "backendEngineer" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let task_id = body["task"]["id"].as_str().unwrap().to_string();

        let (status, body) = h
            .send(
                "PUT",
                "/api/tasks",
                Some(json!({ "project_name": "shop", "task_id": task_id, "status": "in_progress" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["status"], "in_progress");

        let (status, _) = h
            .send(
                "PUT",
                "/api/tasks",
                Some(json!({ "project_name": "shop", "task_id": task_id, "status": "archived" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = h.send("POST", "/api/projects/shop/plan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project"]["tasks"].as_array().unwrap().len(), 8);

        let (_, body) = h.send("GET", "/api/tasks/shop", None).await;
        assert_eq!(body["tasks"].as_array().unwrap().len(), 8);

        let (status, _) = h.send("GET", "/api/projects/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn draft_rejects_unparseable_output() {
        let h = Harness::new(ScriptedGenerator::new([
            ScriptedReply::text("{\"name\": \"crm\", \"description\": \"Sales CRM\"}"),
            ScriptedReply::text("I think you want a CRM."),
        ]))
        .await;

        let (status, body) = h
            .send(
                "POST",
                "/api/projects/draft",
                Some(json!({ "message": "create project for a sales CRM" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project"]["name"], "crm");

        let (status, body) = h
            .send(
                "POST",
                "/api/projects/draft",
                Some(json!({ "agent": "chiefArchitect", "message": "another" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "invalid_output");
    }

    #[tokio::test]
    async fn import_existing_directory() {
        let h = Harness::new(ScriptedGenerator::always("ok")).await;
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("app.py"), "print('hi')").unwrap();

        let (status, body) = h
            .send(
                "POST",
                "/api/projects/import",
                Some(json!({
                    "source_directory": source.path().display().to_string(),
                    "project_name": "legacy",
                    "description": "Old app",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project"]["import_info"]["file_count"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_writes_proceed_during_import() {
        let h = Harness::new(ScriptedGenerator::always("ok")).await;
        let source = tempfile::tempdir().unwrap();
        for i in 0..200 {
            std::fs::write(source.path().join(format!("mod_{i}.py")), "x = 1\n").unwrap();
        }
        let (status, _) = h
            .send("POST", "/api/projects", Some(json!({ "name": "shop" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let import = h.send(
            "POST",
            "/api/projects/import",
            Some(json!({
                "source_directory": source.path().display().to_string(),
                "project_name": "legacy",
            })),
        );
        let writes = async {
            for i in 0..10 {
                let (status, _) = h
                    .send(
                        "POST",
                        "/api/files",
                        Some(json!({
                            "project_name": "shop",
                            "file_path": format!("src/f{i}.rs"),
                            "content": "",
                        })),
                    )
                    .await;
                assert_eq!(status, StatusCode::OK);
            }
        };
        let ((status, body), ()) = tokio::join!(import, writes);

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project"]["import_info"]["file_count"], 200);
        let (_, body) = h.send("GET", "/api/files/shop?directory=src", None).await;
        assert_eq!(body["files"].as_array().unwrap().len(), 10);
        let (_, body) = h.send("GET", "/api/projects", None).await;
        assert_eq!(body["projects"], json!(["legacy", "shop"]));
    }

    #[tokio::test]
    async fn llm_selection_endpoints() {
        let h = Harness::new(ScriptedGenerator::always("ok")).await;
        let (_, body) = h.send("GET", "/api/llm/providers", None).await;
        assert_eq!(body["current_provider"], "deepseek");
        assert_eq!(body["display_names"]["gemini"], "Google Gemini");

        let (status, _) = h
            .send("POST", "/api/llm/provider", Some(json!({ "provider": "acme" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h
            .send(
                "POST",
                "/api/llm/model",
                Some(json!({ "provider": "openai", "model": "gpt-4o" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = h.send("GET", "/api/llm/models/openai", None).await;
        assert_eq!(body["current_model"], "gpt-4o");
        let (status, _) = h.send("GET", "/api/llm/models/acme", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
