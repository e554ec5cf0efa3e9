use std::sync::Arc;

use troupe_core::{ContextStore, ProjectStore, ProviderCatalog, Team};

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub team: Arc<Team>,
    pub store: Arc<ContextStore>,
    pub projects: Arc<ProjectStore>,
    pub catalog: Arc<ProviderCatalog>,
}
