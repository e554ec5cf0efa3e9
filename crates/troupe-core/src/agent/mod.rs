pub mod context;
pub mod identity;
pub mod runtime;
pub mod team;

pub use context::{assemble_digest, build_prompt, Request};
pub use identity::{builtin_roster, roster_from_config, AgentIdentity, RoleSpec};
pub use runtime::{AgentRuntime, TaskOutcome, TranscriptEntry, TranscriptRole};
pub use team::{task_result_key, Team};
