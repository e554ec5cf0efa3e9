use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::context::{assemble_digest, build_prompt, Request};
use crate::agent::identity::AgentIdentity;
use crate::error::{TeamError, TeamResult};
use crate::llm::{Generation, ResponseGenerator};
use crate::memory::ContextStore;
use crate::project::{
    draft_prompt, parse_project_draft, FileRecord, NewTask, Project, ProjectStore, Task,
    TaskStatus,
};

/// Speaker tag in an agent's private transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    System,
    Agent,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
}

/// Result of running a task. A failure is a value here, not an error, so a
/// batch of tasks can report every outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { output: String },
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

/// One team member.
///
/// Reads teammates' recent work from the shared store, asks the generator for
/// a reply, and records the exchange. Agents never talk to each other
/// directly.
pub struct AgentRuntime {
    identity: AgentIdentity,
    store: Arc<ContextStore>,
    generator: Arc<dyn ResponseGenerator>,
    projects: Arc<ProjectStore>,
    timeout: Duration,
    transcript: Mutex<Vec<TranscriptEntry>>,
}

impl AgentRuntime {
    pub fn new(
        identity: AgentIdentity,
        store: Arc<ContextStore>,
        generator: Arc<dyn ResponseGenerator>,
        projects: Arc<ProjectStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            store,
            generator,
            projects,
            timeout,
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn role(&self) -> &str {
        &self.identity.role
    }

    /// Prompt for `request`, built from one consistent read of shared memory.
    pub async fn prepare_prompt(&self, request: Request<'_>) -> String {
        let context = self.store.agent_context(self.role()).await;
        let digest = assemble_digest(&context.team_history, self.role());
        build_prompt(&self.identity, &digest, &context.shared, request)
    }

    async fn generate(&self, prompt: &str) -> TeamResult<Generation> {
        match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(TeamError::Timeout {
                role: self.identity.role.clone(),
                after: self.timeout,
            }),
        }
    }

    /// Answer a message and publish the exchange to shared memory.
    ///
    /// Nothing is recorded if generation fails or times out.
    pub async fn chat(&self, message: &str) -> TeamResult<Generation> {
        if message.trim().is_empty() {
            return Err(TeamError::InvalidInput("message must not be empty".into()));
        }
        let prompt = self.prepare_prompt(Request::Chat(message)).await;
        debug!(role = %self.identity.role, prompt_len = prompt.len(), "Chat prompt built");

        let generation = self.generate(&prompt).await?;
        self.store
            .append(&self.identity.role, message, &generation.text)
            .await?;

        self.add_conversation(TranscriptRole::User, message);
        self.add_conversation(TranscriptRole::Agent, &generation.text);
        info!(
            role = %self.identity.role,
            provider = %generation.provider,
            model = %generation.model,
            "Chat answered"
        );
        Ok(generation)
    }

    /// Run a task. The result stays in this agent's transcript and is not
    /// published to shared memory.
    pub async fn execute(&self, task: &str) -> TaskOutcome {
        let prompt = self.prepare_prompt(Request::Task(task)).await;
        match self.generate(&prompt).await {
            Ok(generation) => {
                self.add_conversation(TranscriptRole::System, &format!("Task: {task}"));
                self.add_conversation(TranscriptRole::Agent, &generation.text);
                info!(role = %self.identity.role, "Task completed");
                TaskOutcome::Completed {
                    output: generation.text,
                }
            }
            Err(e) => {
                warn!(role = %self.identity.role, "Task failed: {e}");
                TaskOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn transcript(&self) -> MutexGuard<'_, Vec<TranscriptEntry>> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_conversation(&self, role: TranscriptRole, content: &str) {
        self.transcript().push(TranscriptEntry {
            role,
            content: content.to_string(),
        });
    }

    pub fn get_conversations(&self) -> Vec<TranscriptEntry> {
        self.transcript().clone()
    }

    pub fn clear_conversations(&self) {
        self.transcript().clear();
    }

    // Project pass-throughs.

    pub fn create_project(&self, name: &str, description: &str) -> TeamResult<Project> {
        self.projects.create_project(name, description)
    }

    pub fn get_project(&self, name: &str) -> TeamResult<Project> {
        self.projects.get_project(name)
    }

    pub fn plan_project(&self, name: &str) -> TeamResult<Project> {
        self.projects.plan_project(name)
    }

    pub fn create_file(&self, project: &str, path: &str, content: &str) -> TeamResult<FileRecord> {
        self.projects.create_file(project, path, content)
    }

    pub fn read_file(&self, project: &str, path: &str) -> TeamResult<String> {
        self.projects.read_file(project, path)
    }

    pub fn update_file(&self, project: &str, path: &str, content: &str) -> TeamResult<FileRecord> {
        self.projects.update_file(project, path, content)
    }

    pub fn list_files(&self, project: &str, directory: &str) -> TeamResult<Vec<String>> {
        self.projects.list_files(project, directory)
    }

    pub fn add_task(&self, project: &str, task: NewTask) -> TeamResult<Task> {
        self.projects.add_task(project, task)
    }

    pub fn update_task_status(
        &self,
        project: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> TeamResult<Task> {
        self.projects.update_task_status(project, task_id, status)
    }

    pub fn get_tasks(&self, project: &str) -> TeamResult<Vec<Task>> {
        self.projects.get_tasks(project)
    }

    /// Tasks in the current project assigned to this role.
    pub fn my_tasks(&self) -> TeamResult<Vec<Task>> {
        let Some(project) = self.projects.current_project() else {
            return Ok(Vec::new());
        };
        Ok(self
            .projects
            .get_tasks(&project)?
            .into_iter()
            .filter(|t| t.assigned_to == self.identity.role)
            .collect())
    }

    /// Ask the generator to name a project described in free text, then
    /// create it. Output that does not parse strictly creates nothing.
    pub async fn propose_project(&self, message: &str) -> TeamResult<Project> {
        let generation = self.generate(&draft_prompt(message)).await?;
        let draft = parse_project_draft(&generation.text)?;
        let projects = self.projects.clone();
        let project = tokio::task::spawn_blocking(move || {
            projects.create_project(&draft.name, &draft.description)
        })
        .await
        .map_err(|e| TeamError::Persistence(format!("project task failed: {e}")))??;
        info!(role = %self.identity.role, project = %project.name, "Project proposed");
        Ok(project)
    }
}
