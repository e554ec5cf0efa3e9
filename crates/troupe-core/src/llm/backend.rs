use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
#[allow(deprecated)]
use rig::client::completion::CompletionModelHandle;
use rig::client::{CompletionClient, Nothing};
use rig::completion::{CompletionModel, CompletionRequest, Message};
use rig::message::{AssistantContent, Text, UserContent};
use rig::providers::{anthropic, deepseek, gemini, groq, mistral, ollama, openai, openrouter};
use rig::OneOrMany;
use tracing::{debug, info};
use troupe_config::{AgentDefaults, ProviderConfig, ProvidersConfig};

use super::{Generation, ProviderCatalog, ResponseGenerator};
use crate::error::{TeamError, TeamResult};

const VALID_PROVIDERS: &str =
    "anthropic, openai, ollama, openrouter, deepseek, groq, gemini, mistral";

/// Production generator backed by rig completion models.
///
/// Clients are built lazily per `(provider, model)` and reused. Missing
/// credentials surface as configuration errors on the first call that needs
/// them, not at startup.
#[allow(deprecated)]
pub struct RigGenerator {
    catalog: Arc<ProviderCatalog>,
    providers: ProvidersConfig,
    temperature: f64,
    max_tokens: u64,
    handles: Mutex<HashMap<(String, String), CompletionModelHandle<'static>>>,
}

#[allow(deprecated)]
impl RigGenerator {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        providers: ProvidersConfig,
        defaults: &AgentDefaults,
    ) -> Self {
        Self {
            catalog,
            providers,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handle_for(&self, provider: &str, model: &str) -> TeamResult<CompletionModelHandle<'static>> {
        let key = (provider.to_string(), model.to_string());
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handles.get(&key) {
            return Ok(handle.clone());
        }
        let handle = create_model_for(provider, model, &self.providers)?;
        handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Generate with an explicit provider and model, bypassing the catalog.
    pub async fn generate_with(
        &self,
        prompt: &str,
        provider: &str,
        model: &str,
    ) -> TeamResult<Generation> {
        let handle = self.handle_for(provider, model)?;

        let request = CompletionRequest {
            preamble: None,
            chat_history: OneOrMany::one(Message::User {
                content: OneOrMany::one(UserContent::Text(Text {
                    text: prompt.to_string(),
                })),
            }),
            documents: Vec::new(),
            tools: Vec::new(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            tool_choice: None,
            additional_params: None,
        };

        debug!(provider, model, prompt_len = prompt.len(), "Calling LLM");
        let response = handle
            .completion(request)
            .await
            .map_err(|e| TeamError::Generation(format!("{provider}/{model}: {e}")))?;

        let text: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect();

        if text.trim().is_empty() {
            return Err(TeamError::Generation(format!(
                "{provider}/{model} returned no text"
            )));
        }

        Ok(Generation {
            text,
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ResponseGenerator for RigGenerator {
    async fn generate(&self, prompt: &str) -> TeamResult<Generation> {
        let (provider, model) = self.catalog.selection();
        self.generate_with(prompt, &provider, &model).await
    }
}

fn resolve_api_key(provider_cfg: Option<&ProviderConfig>, env_var: &str) -> Option<String> {
    provider_cfg
        .and_then(|c| c.api_key.clone())
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
}

fn api_base(provider_cfg: Option<&ProviderConfig>) -> Option<String> {
    provider_cfg
        .and_then(|c| c.api_base.clone())
        .filter(|b| !b.is_empty())
}

fn missing_key(label: &str, id: &str, env_var: &str) -> TeamError {
    TeamError::Configuration(format!(
        "{label} provider selected but no API key found. \
         Set providers.{id}.apiKey in config.json or {env_var} env var."
    ))
}

fn client_error(label: &str, e: impl std::fmt::Display) -> TeamError {
    TeamError::Configuration(format!("Failed to create {label} client: {e}"))
}

/// Create a completion model for a specific provider + model combination.
#[allow(deprecated)]
fn create_model_for(
    provider: &str,
    model_name: &str,
    providers: &ProvidersConfig,
) -> TeamResult<CompletionModelHandle<'static>> {
    if provider.is_empty() {
        return Err(TeamError::Configuration(format!(
            "No provider selected. Valid providers: {VALID_PROVIDERS}"
        )));
    }
    if model_name.is_empty() {
        return Err(TeamError::Configuration(format!(
            "No model selected for provider '{provider}'."
        )));
    }

    let cfg = providers.get(provider);
    match provider {
        "anthropic" => {
            let key = resolve_api_key(cfg, "ANTHROPIC_API_KEY")
                .ok_or_else(|| missing_key("Anthropic", provider, "ANTHROPIC_API_KEY"))?;
            let client: anthropic::Client = anthropic::Client::builder()
                .api_key(&key)
                .build()
                .map_err(|e| client_error("Anthropic", e))?;
            let model = client.completion_model(model_name).with_prompt_caching();
            info!("Using Anthropic provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "openai" => {
            let key = resolve_api_key(cfg, "OPENAI_API_KEY")
                .ok_or_else(|| missing_key("OpenAI", provider, "OPENAI_API_KEY"))?;
            let mut builder = openai::CompletionsClient::builder().api_key(&key);
            if let Some(ref base) = api_base(cfg) {
                builder = builder.base_url(base);
                info!("Using OpenAI provider with custom base: {base}");
            }
            let client: openai::CompletionsClient =
                builder.build().map_err(|e| client_error("OpenAI", e))?;
            let model = client.completion_model(model_name);
            info!("Using OpenAI provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "ollama" => {
            let mut builder = ollama::Client::builder().api_key(Nothing);
            if let Some(ref base) = api_base(cfg) {
                builder = builder.base_url(base);
            }
            let client: ollama::Client = builder.build().map_err(|e| client_error("Ollama", e))?;
            let model = client.completion_model(model_name);
            info!("Using Ollama provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "openrouter" => {
            let key = resolve_api_key(cfg, "OPENROUTER_API_KEY")
                .ok_or_else(|| missing_key("OpenRouter", provider, "OPENROUTER_API_KEY"))?;
            let client: openrouter::Client =
                openrouter::Client::new(&key).map_err(|e| client_error("OpenRouter", e))?;
            let model = client.completion_model(model_name);
            info!("Using OpenRouter provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "deepseek" => {
            let key = resolve_api_key(cfg, "DEEPSEEK_API_KEY")
                .ok_or_else(|| missing_key("DeepSeek", provider, "DEEPSEEK_API_KEY"))?;
            let client: deepseek::Client =
                deepseek::Client::new(&key).map_err(|e| client_error("DeepSeek", e))?;
            let model = client.completion_model(model_name);
            info!("Using DeepSeek provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "groq" => {
            let key = resolve_api_key(cfg, "GROQ_API_KEY")
                .ok_or_else(|| missing_key("Groq", provider, "GROQ_API_KEY"))?;
            let client: groq::Client =
                groq::Client::new(&key).map_err(|e| client_error("Groq", e))?;
            let model = client.completion_model(model_name);
            info!("Using Groq provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "gemini" => {
            let key = resolve_api_key(cfg, "GEMINI_API_KEY")
                .ok_or_else(|| missing_key("Gemini", provider, "GEMINI_API_KEY"))?;
            let client: gemini::Client =
                gemini::Client::new(key).map_err(|e| client_error("Gemini", e))?;
            let model = client.completion_model(model_name);
            info!("Using Gemini provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "mistral" => {
            let key = resolve_api_key(cfg, "MISTRAL_API_KEY")
                .ok_or_else(|| missing_key("Mistral", provider, "MISTRAL_API_KEY"))?;
            let client: mistral::Client =
                mistral::Client::new(&key).map_err(|e| client_error("Mistral", e))?;
            let model = client.completion_model(model_name);
            info!("Using Mistral provider with model '{model_name}'");
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        other => Err(TeamError::Configuration(format!(
            "Unknown provider '{other}'. Valid providers: {VALID_PROVIDERS}"
        ))),
    }
}
