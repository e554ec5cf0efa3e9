//! Which providers and models the team may use, and which are selected.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{info, warn};
use troupe_config::LlmConfig;

use crate::error::{Missing, TeamError, TeamResult};

#[derive(Debug, Clone)]
struct ProviderEntry {
    id: String,
    display_name: String,
    models: Vec<String>,
    current_model: String,
}

#[derive(Debug)]
struct CatalogState {
    providers: Vec<ProviderEntry>,
    current: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub id: String,
    pub display_name: String,
    pub models: Vec<String>,
    pub current_model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelList {
    pub provider: String,
    pub available: Vec<String>,
    pub current: String,
}

/// Runtime-switchable provider/model selection.
///
/// The generator reads the selection on every call, so a switch takes effect
/// for the next request without rebuilding anything.
#[derive(Debug)]
pub struct ProviderCatalog {
    state: RwLock<CatalogState>,
}

fn entry(id: &str, display_name: &str, models: &[&str], current: &str) -> ProviderEntry {
    ProviderEntry {
        id: id.into(),
        display_name: display_name.into(),
        models: models.iter().map(|m| m.to_string()).collect(),
        current_model: current.into(),
    }
}

fn builtin_entries() -> Vec<ProviderEntry> {
    vec![
        entry(
            "gemini",
            "Google Gemini",
            &["gemini-1.5-flash", "gemini-1.5-pro"],
            "gemini-1.5-flash",
        ),
        entry(
            "deepseek",
            "DeepSeek R1",
            &["deepseek-chat", "deepseek-coder"],
            "deepseek-chat",
        ),
        entry(
            "groq",
            "Meta Llama 3 (Groq)",
            &["llama3-8b-8192", "llama3-70b-8192"],
            "llama3-70b-8192",
        ),
        entry(
            "openrouter",
            "OpenRouter",
            &[
                "openrouter/auto",
                "anthropic/claude-3-opus",
                "anthropic/claude-3-sonnet",
            ],
            "openrouter/auto",
        ),
        entry(
            "openai",
            "OpenAI",
            &["o3-mini", "gpt-4o", "gpt-4-turbo"],
            "o3-mini",
        ),
    ]
}

impl ProviderCatalog {
    pub fn builtin(default_provider: &str) -> Self {
        Self::with_entries(builtin_entries(), default_provider)
    }

    /// Build from config; an empty `models` table means the built-in list.
    pub fn from_config(config: &LlmConfig) -> Self {
        if config.models.is_empty() {
            return Self::builtin(&config.default_provider);
        }
        let entries = config
            .models
            .iter()
            .filter(|(_, choices)| !choices.available.is_empty())
            .map(|(id, choices)| {
                let current = if choices.available.contains(&choices.current) {
                    choices.current.clone()
                } else {
                    choices.available[0].clone()
                };
                ProviderEntry {
                    id: id.clone(),
                    display_name: choices.display_name.clone().unwrap_or_else(|| id.clone()),
                    models: choices.available.clone(),
                    current_model: current,
                }
            })
            .collect();
        Self::with_entries(entries, &config.default_provider)
    }

    fn with_entries(providers: Vec<ProviderEntry>, default_provider: &str) -> Self {
        let current = if providers.iter().any(|p| p.id == default_provider) {
            default_provider.to_string()
        } else {
            let fallback = providers.first().map(|p| p.id.clone()).unwrap_or_default();
            warn!(
                requested = default_provider,
                using = %fallback,
                "Default provider is not in the catalog"
            );
            fallback
        };
        Self {
            state: RwLock::new(CatalogState { providers, current }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn providers(&self) -> Vec<ProviderSummary> {
        self.read()
            .providers
            .iter()
            .map(|p| ProviderSummary {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                models: p.models.clone(),
                current_model: p.current_model.clone(),
            })
            .collect()
    }

    pub fn models(&self, provider: &str) -> TeamResult<ModelList> {
        let state = self.read();
        let entry = find(&state, provider)?;
        Ok(ModelList {
            provider: entry.id.clone(),
            available: entry.models.clone(),
            current: entry.current_model.clone(),
        })
    }

    pub fn current_provider(&self) -> String {
        self.read().current.clone()
    }

    pub fn current_model(&self, provider: &str) -> TeamResult<String> {
        let state = self.read();
        Ok(find(&state, provider)?.current_model.clone())
    }

    /// Provider and model the next generation call will use.
    pub fn selection(&self) -> (String, String) {
        let state = self.read();
        let model = state
            .providers
            .iter()
            .find(|p| p.id == state.current)
            .map(|p| p.current_model.clone())
            .unwrap_or_default();
        (state.current.clone(), model)
    }

    pub fn set_provider(&self, provider: &str) -> TeamResult<()> {
        let mut state = self.write();
        find(&state, provider)?;
        state.current = provider.to_string();
        info!(provider, "Switched LLM provider");
        Ok(())
    }

    pub fn set_model(&self, provider: &str, model: &str) -> TeamResult<()> {
        let mut state = self.write();
        let entry = state
            .providers
            .iter_mut()
            .find(|p| p.id == provider)
            .ok_or_else(|| TeamError::not_found(Missing::Provider, provider))?;
        if !entry.models.iter().any(|m| m == model) {
            return Err(TeamError::not_found(Missing::Model, model));
        }
        entry.current_model = model.to_string();
        info!(provider, model, "Switched LLM model");
        Ok(())
    }

    /// Human-readable provider name, or the id itself when unknown.
    pub fn display_name(&self, provider: &str) -> String {
        self.read()
            .providers
            .iter()
            .find(|p| p.id == provider)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| provider.to_string())
    }
}

fn find<'a>(state: &'a CatalogState, provider: &str) -> TeamResult<&'a ProviderEntry> {
    state
        .providers
        .iter()
        .find(|p| p.id == provider)
        .ok_or_else(|| TeamError::not_found(Missing::Provider, provider))
}
