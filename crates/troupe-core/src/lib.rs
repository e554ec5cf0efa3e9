pub mod agent;
pub mod error;
pub mod llm;
pub mod memory;
pub mod project;

// Re-export key types
pub use agent::{AgentIdentity, AgentRuntime, RoleSpec, TaskOutcome, Team};
pub use error::{Missing, TeamError, TeamResult};
pub use llm::{Generation, ProviderCatalog, ResponseGenerator, RigGenerator, ScriptedGenerator};
pub use memory::{ContextStore, LoadOutcome, StoreOptions};
pub use project::ProjectStore;
