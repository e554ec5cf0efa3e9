use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::log::{replay, LogRecord, MemoryState};
use super::{tail, AgentContext, AgentLogs, ConversationEntry, MemorySnapshot};
use crate::error::{TeamError, TeamResult};

/// Tuning knobs for a [`ContextStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Rewrite the log after this many appended records. Zero disables.
    pub compact_after: usize,
    /// Own-history window returned by [`ContextStore::agent_context`].
    pub history_limit: usize,
    /// Per-role window for team history in [`ContextStore::agent_context`].
    /// Never narrower than one entry, since the digest reads the latest.
    pub team_limit: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            compact_after: 1000,
            history_limit: 10,
            team_limit: 5,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &troupe_config::MemoryConfig) -> Self {
        Self {
            compact_after: config.compact_after,
            history_limit: config.history_limit,
            team_limit: config.team_limit,
        }
    }
}

/// How the backing log looked when the store was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file existed; a new empty log was created.
    Fresh,
    /// Every line parsed.
    Loaded { records: usize },
    /// Some lines were unreadable and dropped. The original file was kept aside.
    Recovered { discarded: usize, kept: usize },
}

struct LogWriter {
    file: File,
    /// Length of the log up to the last fully committed record.
    len: u64,
    since_compact: usize,
}

impl LogWriter {
    async fn open(path: &Path) -> TeamResult<Self> {
        let file = open_append(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            file,
            len,
            since_compact: 0,
        })
    }

    /// Append one line. On failure the file is cut back to the last committed
    /// record so a torn line never prefixes the next one.
    async fn write_line(&mut self, path: &Path, line: &str) -> TeamResult<()> {
        let on_disk = self.file.metadata().await?.len();
        if on_disk != self.len {
            warn!(
                path = %path.display(),
                expected = self.len,
                found = on_disk,
                "Memory log has bytes past the last committed record, truncating"
            );
            self.file.set_len(self.len).await?;
        }

        let written = async {
            self.file.write_all(line.as_bytes()).await?;
            self.file.flush().await?;
            self.file.sync_data().await
        }
        .await;

        match written {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(undo) = self.file.set_len(self.len).await {
                    warn!(path = %path.display(), "Failed to roll back torn memory record: {undo}");
                }
                Err(TeamError::Persistence(format!(
                    "failed to append to memory log '{}': {e}",
                    path.display()
                )))
            }
        }
    }
}

/// Durable shared memory for the whole team.
///
/// Mutations go through a single writer lock: the record is written and
/// synced to disk first, then applied to the in-memory state. Readers only
/// take the state lock, so they never wait on disk I/O and never observe a
/// partially applied record.
pub struct ContextStore {
    path: PathBuf,
    state: RwLock<MemoryState>,
    writer: Mutex<LogWriter>,
    outcome: LoadOutcome,
    options: StoreOptions,
}

impl ContextStore {
    /// Open (or create) the log at `path` and replay it.
    pub async fn open(path: impl Into<PathBuf>, options: StoreOptions) -> TeamResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TeamError::Persistence(format!(
                    "failed to create memory directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }

        let (state, outcome) = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let replayed = replay(&bytes);
                if replayed.discarded > 0 {
                    let aside = quarantine(&path).await?;
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        discarded = replayed.discarded,
                        kept = replayed.records,
                        "Shared memory log was corrupted, rebuilt from readable records"
                    );
                    write_fresh(&path, &replayed.state).await?;
                    (
                        replayed.state,
                        LoadOutcome::Recovered {
                            discarded: replayed.discarded,
                            kept: replayed.records,
                        },
                    )
                } else {
                    (
                        replayed.state,
                        LoadOutcome::Loaded {
                            records: replayed.records,
                        },
                    )
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (MemoryState::default(), LoadOutcome::Fresh)
            }
            Err(e) => {
                return Err(TeamError::Persistence(format!(
                    "failed to read memory log '{}': {e}",
                    path.display()
                )))
            }
        };

        let writer = LogWriter::open(&path).await?;
        info!(path = %path.display(), outcome = ?outcome, "Shared memory opened");

        Ok(Self {
            path,
            state: RwLock::new(state),
            writer: Mutex::new(writer),
            outcome,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        self.outcome
    }

    /// Record one exchange for `role`, stamped with the current time.
    pub async fn append(
        &self,
        role: &str,
        user_message: &str,
        agent_response: &str,
    ) -> TeamResult<ConversationEntry> {
        if role.trim().is_empty() {
            return Err(TeamError::InvalidInput("role must not be empty".into()));
        }

        let mut writer = self.writer.lock().await;
        let entry = ConversationEntry {
            timestamp: Utc::now(),
            user_message: user_message.to_string(),
            agent_response: agent_response.to_string(),
        };
        self.commit(
            &mut writer,
            LogRecord::Entry {
                role: role.to_string(),
                entry: entry.clone(),
            },
        )
        .await?;
        debug!(role, "Appended conversation entry");
        Ok(entry)
    }

    pub async fn set_context(&self, key: &str, value: serde_json::Value) -> TeamResult<()> {
        if key.trim().is_empty() {
            return Err(TeamError::InvalidInput("context key must not be empty".into()));
        }
        let mut writer = self.writer.lock().await;
        self.commit(
            &mut writer,
            LogRecord::Context {
                key: key.to_string(),
                value,
            },
        )
        .await
    }

    /// Drop every entry recorded for `role`.
    pub async fn clear(&self, role: &str) -> TeamResult<()> {
        let mut writer = self.writer.lock().await;
        self.commit(
            &mut writer,
            LogRecord::Clear {
                role: role.to_string(),
            },
        )
        .await?;
        info!(role, "Cleared shared conversation log");
        Ok(())
    }

    pub async fn read_recent(&self, role: &str, limit: usize) -> Vec<ConversationEntry> {
        let state = self.state.read().await;
        state
            .logs
            .get(role)
            .map(|entries| tail(entries, limit))
            .unwrap_or_default()
    }

    pub async fn read_all_recent(&self, limit_per_agent: usize) -> AgentLogs {
        let state = self.state.read().await;
        recent_logs(&state.logs, limit_per_agent)
    }

    /// Look up one key, or the whole shared map as a JSON object when `key`
    /// is `None`.
    pub async fn get_context(&self, key: Option<&str>) -> Option<serde_json::Value> {
        let state = self.state.read().await;
        match key {
            Some(key) => state.shared.get(key).cloned(),
            None => Some(serde_json::Value::Object(
                state
                    .shared
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )),
        }
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.read().await;
        MemorySnapshot {
            conversations: state.logs.clone(),
            shared: state.shared.clone(),
        }
    }

    /// Own history, everyone's recent history and shared facts, all from the
    /// same view of the store.
    pub async fn agent_context(&self, role: &str) -> AgentContext {
        let state = self.state.read().await;
        AgentContext {
            own_history: state
                .logs
                .get(role)
                .map(|entries| tail(entries, self.options.history_limit))
                .unwrap_or_default(),
            team_history: recent_logs(&state.logs, self.options.team_limit.max(1)),
            shared: state.shared.clone(),
        }
    }

    /// Roles that currently have at least one entry.
    pub async fn roles(&self) -> Vec<String> {
        self.state.read().await.logs.keys().cloned().collect()
    }

    /// Rewrite the log so it holds one record per live entry and context key.
    pub async fn compact(&self) -> TeamResult<()> {
        let mut writer = self.writer.lock().await;
        self.compact_locked(&mut writer).await
    }

    async fn commit(&self, writer: &mut LogWriter, record: LogRecord) -> TeamResult<()> {
        let line = record
            .to_line()
            .map_err(|e| TeamError::Persistence(format!("failed to encode record: {e}")))?;
        writer.write_line(&self.path, &line).await?;

        self.state.write().await.apply(record);

        writer.since_compact += 1;
        if self.options.compact_after > 0 && writer.since_compact >= self.options.compact_after {
            if let Err(e) = self.compact_locked(writer).await {
                warn!(path = %self.path.display(), "Memory log compaction failed: {e}");
            }
        }
        Ok(())
    }

    async fn compact_locked(&self, writer: &mut LogWriter) -> TeamResult<()> {
        let records = self.state.read().await.to_records();
        let tmp = sibling(&self.path, "compact");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .await?;
        for record in &records {
            let line = record
                .to_line()
                .map_err(|e| TeamError::Persistence(format!("failed to encode record: {e}")))?;
            file.write_all(line.as_bytes()).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let handle = LogWriter::open(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *writer = handle;
        info!(
            path = %self.path.display(),
            records = records.len(),
            "Compacted shared memory log"
        );
        Ok(())
    }
}

fn recent_logs(logs: &AgentLogs, limit: usize) -> AgentLogs {
    logs.iter()
        .map(|(role, entries)| (role.clone(), tail(entries, limit)))
        .collect()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "memory".to_string());
    path.with_file_name(format!("{name}.{suffix}"))
}

async fn open_append(path: &Path) -> TeamResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| {
            TeamError::Persistence(format!(
                "failed to open memory log '{}': {e}",
                path.display()
            ))
        })
}

/// Move an unreadable log out of the way, returning where it went.
async fn quarantine(path: &Path) -> TeamResult<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let aside = sibling(path, &format!("corrupt-{stamp}"));
    tokio::fs::rename(path, &aside).await.map_err(|e| {
        TeamError::Persistence(format!(
            "failed to move corrupted log '{}' aside: {e}",
            path.display()
        ))
    })?;
    Ok(aside)
}

async fn write_fresh(path: &Path, state: &MemoryState) -> TeamResult<()> {
    let mut contents = String::new();
    for record in state.to_records() {
        let line = record
            .to_line()
            .map_err(|e| TeamError::Persistence(format!("failed to encode record: {e}")))?;
        contents.push_str(&line);
    }
    let mut file = File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn open(dir: &tempfile::TempDir) -> ContextStore {
        ContextStore::open(dir.path().join("shared.jsonl"), StoreOptions::default())
            .await
            .unwrap()
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    #[tokio::test]
    async fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        assert_eq!(store.load_outcome(), LoadOutcome::Fresh);
        assert!(store.read_recent("architect", 5).await.is_empty());
        assert!(store.roles().await.is_empty());
        assert_eq!(
            store.get_context(None).await,
            Some(serde_json::json!({}))
        );
    }

    #[tokio::test]
    async fn append_then_read_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let entry = store
            .append("architect", "design the schema", "use a normalized relational schema")
            .await
            .unwrap();

        let recent = store.read_recent("architect", 1).await;
        assert_eq!(recent, vec![entry]);
    }

    #[tokio::test]
    async fn read_recent_returns_tail_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        for i in 0..5 {
            store
                .append("pm", &format!("q{i}"), &format!("a{i}"))
                .await
                .unwrap();
        }
        let recent = store.read_recent("pm", 3).await;
        let asked: Vec<_> = recent.iter().map(|e| e.user_message.as_str()).collect();
        assert_eq!(asked, ["q2", "q3", "q4"]);
        assert_eq!(store.read_recent("pm", 0).await.len(), 0);
        assert_eq!(store.read_recent("pm", 50).await.len(), 5);
    }

    #[tokio::test]
    async fn empty_role_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let err = store.append("  ", "a", "b").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir).await;
            store.append("architect", "a", "b").await.unwrap();
            store
                .set_context("database", serde_json::json!("postgres"))
                .await
                .unwrap();
            store.append("writer", "c", "d").await.unwrap();
            store.clear("writer").await.unwrap();
        }

        let store = open(&dir).await;
        assert_eq!(store.load_outcome(), LoadOutcome::Loaded { records: 4 });
        assert_eq!(store.roles().await, vec!["architect".to_string()]);
        assert_eq!(
            store.get_context(Some("database")).await,
            Some(serde_json::json!("postgres"))
        );
        assert_eq!(store.get_context(Some("missing")).await, None);
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open(&dir).await);

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append(&format!("role{i}"), &format!("msg{i}"), &format!("reply{i}"))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let all = store.read_all_recent(5).await;
        assert_eq!(all.len(), 24);
        assert!(all.values().all(|entries| entries.len() == 1));
        drop(store);

        let reopened = open(&dir).await;
        assert_eq!(reopened.load_outcome(), LoadOutcome::Loaded { records: 24 });
        for i in 0..24 {
            let entries = reopened.read_recent(&format!("role{i}"), 1).await;
            assert_eq!(entries[0].agent_response, format!("reply{i}"));
        }
    }

    #[tokio::test]
    async fn corrupted_log_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");
        {
            let store = open(&dir).await;
            store.append("architect", "keep me", "ok").await.unwrap();
        }
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(b"{\"kind\":\"entry\",\"role\":\"arch");
        std::fs::write(&path, raw).unwrap();

        let store = open(&dir).await;
        assert_eq!(
            store.load_outcome(),
            LoadOutcome::Recovered {
                discarded: 1,
                kept: 1
            }
        );
        assert_eq!(store.read_recent("architect", 1).await[0].user_message, "keep me");

        let quarantined = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .count();
        assert_eq!(quarantined, 1);
        drop(store);

        let again = open(&dir).await;
        assert_eq!(again.load_outcome(), LoadOutcome::Loaded { records: 1 });
    }

    #[tokio::test]
    async fn explicit_compaction_drops_dead_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.append("architect", "a", "b").await.unwrap();
        store.append("writer", "c", "d").await.unwrap();
        store.clear("writer").await.unwrap();
        store.set_context("k", serde_json::json!(1)).await.unwrap();
        store.set_context("k", serde_json::json!(2)).await.unwrap();
        assert_eq!(line_count(store.path()), 5);

        store.compact().await.unwrap();
        assert_eq!(line_count(store.path()), 2);

        store.append("architect", "e", "f").await.unwrap();
        assert_eq!(line_count(store.path()), 3);
        assert_eq!(store.read_recent("architect", 5).await.len(), 2);
    }

    #[tokio::test]
    async fn automatic_compaction_after_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            compact_after: 3,
            ..StoreOptions::default()
        };
        let path = dir.path().join("shared.jsonl");
        {
            let store = ContextStore::open(&path, options).await.unwrap();
            store.append("writer", "a", "b").await.unwrap();
            store.append("writer", "c", "d").await.unwrap();
            store.clear("writer").await.unwrap();
            assert_eq!(line_count(&path), 0);
            store.append("pm", "e", "f").await.unwrap();
        }

        let store = ContextStore::open(&path, options).await.unwrap();
        assert_eq!(store.load_outcome(), LoadOutcome::Loaded { records: 1 });
        assert_eq!(store.roles().await, vec!["pm".to_string()]);
    }

    #[tokio::test]
    async fn agent_context_applies_windows() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            history_limit: 2,
            team_limit: 1,
            ..StoreOptions::default()
        };
        let store = ContextStore::open(dir.path().join("m.jsonl"), options)
            .await
            .unwrap();
        for i in 0..3 {
            store.append("pm", &format!("p{i}"), "x").await.unwrap();
            store.append("qa", &format!("q{i}"), "y").await.unwrap();
        }
        store
            .set_context("release", serde_json::json!("v1"))
            .await
            .unwrap();

        let ctx = store.agent_context("pm").await;
        assert_eq!(ctx.own_history.len(), 2);
        assert_eq!(ctx.own_history[1].user_message, "p2");
        assert_eq!(ctx.team_history["qa"].len(), 1);
        assert_eq!(ctx.team_history["qa"][0].user_message, "q2");
        assert_eq!(ctx.shared["release"], serde_json::json!("v1"));
    }

    #[tokio::test]
    async fn torn_tail_does_not_swallow_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");
        {
            let store = open(&dir).await;
            store.append("writer", "first", "ok").await.unwrap();

            let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            std::io::Write::write_all(&mut raw, b"{\"kind\":\"entry\",\"role\":\"wri").unwrap();
            drop(raw);

            store.append("writer", "second", "acknowledged").await.unwrap();
        }

        let store = open(&dir).await;
        assert_eq!(store.load_outcome(), LoadOutcome::Loaded { records: 2 });
        let entries = store.read_recent("writer", 5).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].user_message, "second");
        assert_eq!(entries[1].agent_response, "acknowledged");
    }

    #[tokio::test]
    async fn zero_team_limit_still_sees_latest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            team_limit: 0,
            ..StoreOptions::default()
        };
        let store = ContextStore::open(dir.path().join("m.jsonl"), options)
            .await
            .unwrap();
        store.append("qa", "q0", "y").await.unwrap();
        store.append("qa", "q1", "y").await.unwrap();

        let ctx = store.agent_context("pm").await;
        assert_eq!(ctx.team_history["qa"].len(), 1);
        assert_eq!(ctx.team_history["qa"][0].user_message, "q1");
    }
}
