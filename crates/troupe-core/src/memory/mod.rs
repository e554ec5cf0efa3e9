//! Shared memory: per-role conversation logs plus a flat key/value context,
//! persisted as an append-only JSONL log.

mod log;
mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{ContextStore, LoadOutcome, StoreOptions};

/// One exchange recorded under an agent's role. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub agent_response: String,
}

/// Role → ordered log. Iteration order is lexical by role.
pub type AgentLogs = BTreeMap<String, Vec<ConversationEntry>>;

/// Facts agents have published for each other. Last write wins.
pub type SharedContext = BTreeMap<String, serde_json::Value>;

/// Point-in-time view of the whole store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemorySnapshot {
    pub conversations: AgentLogs,
    pub shared: SharedContext,
}

/// Everything a role needs to build a prompt, read from one snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentContext {
    pub own_history: Vec<ConversationEntry>,
    pub team_history: AgentLogs,
    pub shared: SharedContext,
}

/// Last `limit` entries, oldest first.
pub(crate) fn tail(entries: &[ConversationEntry], limit: usize) -> Vec<ConversationEntry> {
    let start = entries.len().saturating_sub(limit);
    entries[start..].to_vec()
}
