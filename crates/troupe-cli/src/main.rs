use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use troupe_config::{find_config_path, load_config, memory_file, resolve_workspace, Config};
use troupe_core::agent::roster_from_config;
use troupe_core::{
    ContextStore, LoadOutcome, ProjectStore, ProviderCatalog, RigGenerator, StoreOptions,
    TaskOutcome, Team,
};
use troupe_gateway::AppState;

/// Render markdown text to the terminal using termimad.
fn render_markdown(text: &str) {
    let skin = termimad::MadSkin::default();
    skin.print_text(text);
}

#[derive(Parser)]
#[command(name = "troupe", about = "A team of role-playing agents with shared memory", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// Send one message to an agent
    Chat {
        /// Role name, e.g. chiefArchitect
        #[arg(short, long)]
        agent: String,

        #[arg(short, long)]
        message: String,
    },
    /// Have an agent execute a task
    Execute {
        #[arg(short, long)]
        agent: String,

        #[arg(short, long)]
        task: String,
    },
    /// Run every agent's standing task
    Run,
    /// List the team roster
    Agents,
    /// Show configuration and memory status
    Status,
    /// Initialize configuration and workspace
    Onboard {
        /// Skip interactive prompts and write defaults
        #[arg(long)]
        non_interactive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let base_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = format!("{base_filter},troupe_core::agent=debug");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(find_config_path);

    match cli.command {
        Commands::Onboard { non_interactive } => run_onboard(cli.config, non_interactive),
        Commands::Status => run_status(&config_path).await,
        Commands::Serve => {
            let (config, state) = load_state(&config_path).await?;
            troupe_gateway::serve(&config.gateway, state).await
        }
        Commands::Chat { agent, message } => {
            let (_, state) = load_state(&config_path).await?;
            let runtime = state.team.get(&agent)?;
            let generation = runtime.chat(&message).await?;
            println!(
                "{} ({} / {})",
                runtime.identity().display_name(),
                state.catalog.display_name(&generation.provider),
                generation.model
            );
            render_markdown(&generation.text);
            Ok(())
        }
        Commands::Execute { agent, task } => {
            let (_, state) = load_state(&config_path).await?;
            let runtime = state.team.get(&agent)?;
            let outcome = runtime.execute(&task).await;
            print_outcome(&agent, &outcome);
            Ok(())
        }
        Commands::Run => {
            let (_, state) = load_state(&config_path).await?;
            let results = state.team.run_standing_tasks().await;
            for (role, outcome) in &results {
                print_outcome(role, outcome);
            }
            Ok(())
        }
        Commands::Agents => {
            let (_, state) = load_state(&config_path).await?;
            for identity in state.team.identities() {
                println!("{} ({})", identity.display_name(), identity.role);
                println!("  Goal: {}", identity.goal);
                if let Some(task) = state.team.standing_task(&identity.role) {
                    println!("  Standing task: {task}");
                }
            }
            Ok(())
        }
    }
}

async fn load_state(config_path: &Path) -> Result<(Config, AppState)> {
    let config = load_config(config_path)?;
    let state = build_state(&config).await?;
    Ok((config, state))
}

/// Compose the shared store, provider catalog, generator, project store and
/// team from config.
async fn build_state(config: &Config) -> Result<AppState> {
    let workspace = resolve_workspace(&config.agents.defaults.workspace);
    std::fs::create_dir_all(&workspace)?;

    let store = Arc::new(
        ContextStore::open(
            memory_file(config, &workspace),
            StoreOptions::from_config(&config.memory),
        )
        .await?,
    );
    if let LoadOutcome::Recovered { discarded, kept } = store.load_outcome() {
        warn!(discarded, kept, "Shared memory was recovered from a damaged log");
    }

    let catalog = Arc::new(ProviderCatalog::from_config(&config.llm));
    let generator = Arc::new(RigGenerator::new(
        catalog.clone(),
        config.providers.clone(),
        &config.agents.defaults,
    ));
    let projects = Arc::new(ProjectStore::new(workspace.join("projects"))?);
    let timeout = Duration::from_secs(config.agents.defaults.generation_timeout_secs);

    let team = Team::assemble(
        roster_from_config(&config.agents.roster),
        store.clone(),
        generator,
        projects.clone(),
        timeout,
    );
    info!(agents = team.len(), workspace = %workspace.display(), "Team assembled");

    Ok(AppState {
        team: Arc::new(team),
        store,
        projects,
        catalog,
    })
}

fn print_outcome(role: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Completed { output } => {
            println!("## {role}");
            render_markdown(output);
        }
        TaskOutcome::Failed { reason } => {
            println!("## {role} (failed)");
            println!("{reason}");
        }
    }
    println!();
}

fn prompt_with_default(prompt: &str, default: &str) -> Result<String> {
    use std::io::{self, Write};
    print!("{prompt} [{default}]: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Initialize configuration and workspace.
fn run_onboard(config_arg: Option<PathBuf>, non_interactive: bool) -> Result<()> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let troupe_dir = home.join(".troupe");
    std::fs::create_dir_all(&troupe_dir)?;

    let config_path = config_arg.unwrap_or_else(|| troupe_dir.join("config.json"));
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
        println!("To reset, delete it and run `troupe onboard` again.");
    } else {
        let mut cfg = Config::default();
        if !non_interactive {
            println!("Interactive setup");
            cfg.agents.defaults.workspace =
                prompt_with_default("Workspace path", &cfg.agents.defaults.workspace)?;
            cfg.llm.default_provider =
                prompt_with_default("Default LLM provider", &cfg.llm.default_provider)?;
            let key = prompt_with_default(
                "API key for that provider (empty to use environment)",
                "",
            )?;
            if !key.is_empty() {
                set_api_key(&mut cfg, key);
            }
            let port = prompt_with_default("Gateway port", &cfg.gateway.port.to_string())?;
            cfg.gateway.port = port.parse().unwrap_or(cfg.gateway.port);
        }

        troupe_config::save_config(&config_path, &cfg)?;
        println!("Created config: {}", config_path.display());
    }

    let config = load_config(&config_path)?;
    let workspace = resolve_workspace(&config.agents.defaults.workspace);
    std::fs::create_dir_all(workspace.join("memory"))?;
    std::fs::create_dir_all(workspace.join("projects"))?;
    println!("Workspace: {}", workspace.display());

    println!();
    println!("Setup complete! Next steps:");
    println!(
        "  1. Edit {} to configure your LLM provider",
        config_path.display()
    );
    println!("  2. Run `troupe chat --agent chiefArchitect --message \"hello\"`");
    println!("  3. Run `troupe serve` to start the HTTP gateway");
    println!();

    Ok(())
}

fn set_api_key(cfg: &mut Config, key: String) {
    let providers = &mut cfg.providers;
    let slot = match cfg.llm.default_provider.as_str() {
        "anthropic" => &mut providers.anthropic,
        "openai" => &mut providers.openai,
        "ollama" => &mut providers.ollama,
        "openrouter" => &mut providers.openrouter,
        "deepseek" => &mut providers.deepseek,
        "groq" | "llama3" => &mut providers.groq,
        "gemini" => &mut providers.gemini,
        "mistral" => &mut providers.mistral,
        other => {
            println!("Unknown provider '{other}', key not saved");
            return;
        }
    };
    slot.get_or_insert_with(Default::default).api_key = Some(key);
}

/// Show configuration and shared-memory summary.
async fn run_status(config_path: &Path) -> Result<()> {
    println!("troupe status");
    println!();

    if config_path.exists() {
        println!("  Config:    {} (found)", config_path.display());
    } else {
        println!(
            "  Config:    {} (not found, run `troupe onboard`)",
            config_path.display()
        );
        return Ok(());
    }

    let config = load_config(config_path)?;
    let workspace = resolve_workspace(&config.agents.defaults.workspace);
    if workspace.exists() {
        println!("  Workspace: {} (found)", workspace.display());
    } else {
        println!("  Workspace: {} (not found)", workspace.display());
    }

    let catalog = ProviderCatalog::from_config(&config.llm);
    let (provider, model) = catalog.selection();
    println!("  Provider:  {}", catalog.display_name(&provider));
    println!("  Model:     {model}");
    println!(
        "  Gateway:   http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!();

    println!("  Providers:");
    for summary in catalog.providers() {
        let env_key = format!("{}_API_KEY", summary.id.to_uppercase());
        let configured = config
            .providers
            .get(&summary.id)
            .and_then(|p| p.api_key.as_deref())
            .is_some_and(|k| !k.is_empty())
            || std::env::var(&env_key).is_ok_and(|k| !k.is_empty());
        println!(
            "    {}: {}",
            summary.display_name,
            if configured { "configured" } else { "no API key" }
        );
    }
    println!();

    let memory_path = memory_file(&config, &workspace);
    if memory_path.exists() {
        let store = ContextStore::open(&memory_path, StoreOptions::from_config(&config.memory))
            .await?;
        let snapshot = store.snapshot().await;
        let entries: usize = snapshot.conversations.values().map(Vec::len).sum();
        println!("  Memory:    {}", memory_path.display());
        println!(
            "    {} agents, {} entries, {} shared facts",
            snapshot.conversations.len(),
            entries,
            snapshot.shared.len()
        );
    } else {
        println!("  Memory:    {} (empty)", memory_path.display());
    }

    println!(
        "  Roster:    {} agents",
        roster_from_config(&config.agents.roster).len()
    );

    Ok(())
}
