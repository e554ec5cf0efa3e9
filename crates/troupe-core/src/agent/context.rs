//! Turning shared memory into prompt text.

use crate::agent::identity::AgentIdentity;
use crate::memory::{AgentLogs, SharedContext};

/// What the agent is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Chat(&'a str),
    Task(&'a str),
}

impl Request<'_> {
    /// The text handed to the generator as the request body.
    pub fn framed(&self) -> String {
        match self {
            Request::Chat(message) => (*message).to_string(),
            Request::Task(task) => format!("Please execute this task: {task}"),
        }
    }
}

/// One line per teammate with their latest exchange, in role order.
///
/// The target's own log is skipped, as are roles with no entries. An empty
/// string means nobody else has said anything yet.
pub fn assemble_digest(team_history: &AgentLogs, target: &str) -> String {
    team_history
        .iter()
        .filter(|(role, _)| role.as_str() != target)
        .filter_map(|(role, entries)| {
            entries.last().map(|latest| {
                format!(
                    "{role} discussed: {} -> {}",
                    latest.user_message, latest.agent_response
                )
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the full prompt for one generation call.
pub fn build_prompt(
    identity: &AgentIdentity,
    digest: &str,
    shared: &SharedContext,
    request: Request<'_>,
) -> String {
    let name = identity.display_name();
    let mut parts = Vec::new();

    let mut who = format!("# {name}\n\nYou are the {name} on a software product team.");
    if !identity.goal.trim().is_empty() {
        who.push_str(&format!("\n\n## Goal\n{}", identity.goal.trim()));
    }
    if !identity.backstory.trim().is_empty() {
        who.push_str(&format!("\n\n## Background\n{}", identity.backstory.trim()));
    }
    parts.push(who);

    if digest.is_empty() {
        parts.push("## Team Context\nNo recent activity from other team members.".to_string());
    } else {
        parts.push(format!("## Team Context\n{digest}"));
    }

    if !shared.is_empty() {
        let facts = shared
            .iter()
            .map(|(key, value)| format!("- {key}: {}", render_value(value)))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("## Shared Facts\n{facts}"));
    }

    let heading = match request {
        Request::Chat(_) => "## Message",
        Request::Task(_) => "## Task",
    };
    parts.push(format!("{heading}\n{}", request.framed()));

    parts.push(format!(
        "Respond as the {name}. Stay within your area of expertise, build on what your \
         teammates have already said, and be specific."
    ));

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::memory::ConversationEntry;

    fn entry(user: &str, agent: &str) -> ConversationEntry {
        ConversationEntry {
            timestamp: Utc::now(),
            user_message: user.into(),
            agent_response: agent.into(),
        }
    }

    fn identity() -> AgentIdentity {
        AgentIdentity::new(
            "technicalWriter",
            "Technical Writer",
            "Write docs.",
            "Has written many manuals.",
        )
    }

    #[test]
    fn digest_is_deterministic_and_ordered() {
        let mut logs = AgentLogs::new();
        logs.insert("writer".into(), vec![entry("w", "x")]);
        logs.insert("architect".into(), vec![entry("old", "older"), entry("a", "b")]);

        let first = assemble_digest(&logs, "pm");
        assert_eq!(first, "architect discussed: a -> b\nwriter discussed: w -> x");
        assert_eq!(first, assemble_digest(&logs.clone(), "pm"));
    }

    #[test]
    fn digest_excludes_target_and_empty_roles() {
        let mut logs = AgentLogs::new();
        logs.insert("architect".into(), vec![entry("a", "b")]);
        logs.insert("silent".into(), Vec::new());
        logs.insert("writer".into(), vec![entry("w", "x")]);

        let digest = assemble_digest(&logs, "writer");
        assert_eq!(digest, "architect discussed: a -> b");
    }

    #[test]
    fn digest_empty_when_nobody_else_spoke() {
        let mut logs = AgentLogs::new();
        assert_eq!(assemble_digest(&logs, "writer"), "");
        logs.insert("writer".into(), vec![entry("w", "x")]);
        assert_eq!(assemble_digest(&logs, "writer"), "");
    }

    #[test]
    fn prompt_is_pure() {
        let mut shared = SharedContext::new();
        shared.insert("database".into(), serde_json::json!("postgres"));
        shared.insert("replicas".into(), serde_json::json!(3));
        let a = build_prompt(&identity(), "architect discussed: a -> b", &shared, Request::Chat("hi"));
        let b = build_prompt(&identity(), "architect discussed: a -> b", &shared, Request::Chat("hi"));
        assert_eq!(a, b);
        assert!(a.contains("architect discussed: a -> b"));
        assert!(a.contains("- database: postgres"));
        assert!(a.contains("- replicas: 3"));
        assert!(a.contains("## Message\nhi"));
        assert!(a.contains("Has written many manuals."));
    }

    #[test]
    fn prompt_without_context_uses_placeholder() {
        let prompt = build_prompt(&identity(), "", &SharedContext::new(), Request::Chat("hi"));
        assert!(prompt.contains("No recent activity from other team members."));
        assert!(!prompt.contains("## Shared Facts"));
    }

    #[test]
    fn task_request_is_framed() {
        let prompt = build_prompt(
            &identity(),
            "",
            &SharedContext::new(),
            Request::Task("Write the README."),
        );
        assert!(prompt.contains("## Task\nPlease execute this task: Write the README."));
    }
}
