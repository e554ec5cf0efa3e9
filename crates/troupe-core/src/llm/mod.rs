pub mod catalog;
pub mod backend;
pub mod scripted;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TeamResult;

pub use catalog::{ModelList, ProviderCatalog, ProviderSummary};
pub use backend::RigGenerator;
pub use scripted::{ScriptedGenerator, ScriptedReply};

/// Text produced by a backend together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// The single seam between the team and whatever produces text.
///
/// Implementations may be slow or fail; callers bound them with a timeout.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> TeamResult<Generation>;
}
