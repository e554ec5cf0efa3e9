use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agents: AgentsConfig,
    pub providers: ProvidersConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
    /// Team members. Empty means the built-in roster of eleven roles.
    pub roster: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    pub workspace: String,
    pub max_tokens: u64,
    pub temperature: f64,
    /// Upper bound for a single text-generation call.
    pub generation_timeout_secs: u64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.troupe/workspace".into(),
            max_tokens: 2048,
            temperature: 0.7,
            generation_timeout_secs: 120,
        }
    }
}

/// One team member as declared in config.json.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    pub role: String,
    #[serde(default)]
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standing_task: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub anthropic: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
    pub openrouter: Option<ProviderConfig>,
    pub deepseek: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
    pub mistral: Option<ProviderConfig>,
}

impl ProvidersConfig {
    /// Look up the settings block for a provider id.
    pub fn get(&self, provider: &str) -> Option<&ProviderConfig> {
        match provider {
            "anthropic" => self.anthropic.as_ref(),
            "openai" => self.openai.as_ref(),
            "ollama" => self.ollama.as_ref(),
            "openrouter" => self.openrouter.as_ref(),
            "deepseek" => self.deepseek.as_ref(),
            "groq" => self.groq.as_ref(),
            "gemini" => self.gemini.as_ref(),
            "mistral" => self.mistral.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    pub default_provider: String,
    /// Per-provider model lists. Empty means the built-in catalog.
    pub models: BTreeMap<String, ModelChoices>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "deepseek".into(),
            models: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelChoices {
    pub display_name: Option<String>,
    pub available: Vec<String>,
    pub current: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// Shared memory log. Relative paths resolve against the workspace.
    pub file: Option<String>,
    /// Entries of an agent's own history handed to its prompt builder.
    pub history_limit: usize,
    /// Entries per teammate considered when assembling cross-agent context.
    pub team_limit: usize,
    /// Appended records before the log is rewritten in compact form.
    pub compact_after: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            file: None,
            history_limit: 10,
            team_limit: 5,
            compact_after: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}
