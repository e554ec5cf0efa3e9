use serde::{Deserialize, Serialize};

use super::{AgentLogs, ConversationEntry, SharedContext};

/// A single line of the memory log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum LogRecord {
    Entry {
        role: String,
        entry: ConversationEntry,
    },
    Context {
        key: String,
        value: serde_json::Value,
    },
    Clear {
        role: String,
    },
}

impl LogRecord {
    pub(crate) fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// In-memory state rebuilt by replaying the log.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    pub(crate) logs: AgentLogs,
    pub(crate) shared: SharedContext,
}

impl MemoryState {
    pub(crate) fn apply(&mut self, record: LogRecord) {
        match record {
            LogRecord::Entry { role, entry } => {
                self.logs.entry(role).or_default().push(entry);
            }
            LogRecord::Context { key, value } => {
                self.shared.insert(key, value);
            }
            LogRecord::Clear { role } => {
                self.logs.remove(&role);
            }
        }
    }

    /// Minimal record sequence that rebuilds this state.
    pub(crate) fn to_records(&self) -> Vec<LogRecord> {
        let mut records = Vec::new();
        for (role, entries) in &self.logs {
            for entry in entries {
                records.push(LogRecord::Entry {
                    role: role.clone(),
                    entry: entry.clone(),
                });
            }
        }
        for (key, value) in &self.shared {
            records.push(LogRecord::Context {
                key: key.clone(),
                value: value.clone(),
            });
        }
        records
    }
}

/// Result of replaying raw log bytes.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub(crate) state: MemoryState,
    pub(crate) records: usize,
    pub(crate) discarded: usize,
}

/// Replay a log. Lines that are not valid UTF-8 or not a valid record are
/// counted and skipped; blank lines are ignored.
pub(crate) fn replay(bytes: &[u8]) -> Replay {
    let mut replay = Replay::default();
    for raw in bytes.split(|b| *b == b'\n') {
        let line = match std::str::from_utf8(raw) {
            Ok(l) => l.trim(),
            Err(_) => {
                replay.discarded += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => {
                replay.state.apply(record);
                replay.records += 1;
            }
            Err(_) => replay.discarded += 1,
        }
    }
    replay
}
