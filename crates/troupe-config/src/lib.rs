pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, find_config_path, load_config, memory_file, resolve_workspace,
    save_config,
};
pub use schema::{
    AgentDefaults, Config, GatewayConfig, LlmConfig, MemoryConfig, ModelChoices, ProviderConfig,
    ProvidersConfig, RoleConfig,
};
