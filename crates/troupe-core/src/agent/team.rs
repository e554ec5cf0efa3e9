use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::agent::identity::{AgentIdentity, RoleSpec};
use crate::agent::runtime::{AgentRuntime, TaskOutcome};
use crate::error::{Missing, TeamError, TeamResult};
use crate::llm::ResponseGenerator;
use crate::memory::ContextStore;
use crate::project::ProjectStore;

/// Every runtime, keyed by role, sharing one store, generator and project
/// workspace.
pub struct Team {
    agents: BTreeMap<String, Arc<AgentRuntime>>,
    standing_tasks: BTreeMap<String, String>,
    store: Arc<ContextStore>,
}

/// Shared-context key holding the last completed standing task of `role`.
pub fn task_result_key(role: &str) -> String {
    format!("task_result:{role}")
}

impl Team {
    pub fn assemble(
        roster: Vec<RoleSpec>,
        store: Arc<ContextStore>,
        generator: Arc<dyn ResponseGenerator>,
        projects: Arc<ProjectStore>,
        timeout: Duration,
    ) -> Self {
        let mut agents = BTreeMap::new();
        let mut standing_tasks = BTreeMap::new();
        for spec in roster {
            let role = spec.identity.role.clone();
            if agents.contains_key(&role) {
                warn!(role = %role, "Duplicate role in roster, keeping the first");
                continue;
            }
            if let Some(task) = spec.standing_task {
                standing_tasks.insert(role.clone(), task);
            }
            let runtime = AgentRuntime::new(
                spec.identity,
                store.clone(),
                generator.clone(),
                projects.clone(),
                timeout,
            );
            agents.insert(role, Arc::new(runtime));
        }
        info!(agents = agents.len(), "Team assembled");
        Self {
            agents,
            standing_tasks,
            store,
        }
    }

    pub fn get(&self, role: &str) -> TeamResult<Arc<AgentRuntime>> {
        self.agents
            .get(role)
            .cloned()
            .ok_or_else(|| TeamError::not_found(Missing::Agent, role))
    }

    pub fn roles(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn identities(&self) -> Vec<AgentIdentity> {
        self.agents
            .values()
            .map(|a| a.identity().clone())
            .collect()
    }

    pub fn standing_task(&self, role: &str) -> Option<&str> {
        self.standing_tasks.get(role).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Run each role's standing task, one after another, in role order.
    /// Roles without one are skipped. Completed output is kept in shared
    /// context under [`task_result_key`].
    pub async fn run_standing_tasks(&self) -> BTreeMap<String, TaskOutcome> {
        let mut results = BTreeMap::new();
        for (role, agent) in &self.agents {
            let Some(task) = self.standing_tasks.get(role) else {
                continue;
            };
            info!(role = %role, task = %task, "Running standing task");
            let outcome = agent.execute(task).await;
            if let TaskOutcome::Completed { output } = &outcome {
                let value = json!({ "task": task, "output": output });
                if let Err(e) = self.store.set_context(&task_result_key(role), value).await {
                    warn!(role = %role, "Failed to save task result: {e}");
                }
            }
            results.insert(role.clone(), outcome);
        }
        results
    }
}
