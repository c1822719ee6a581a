//! tool-agent CLI
//!
//! Wires the completion provider, the built-in local tools, and any
//! configured tool servers together, then runs one prompt through the
//! engine.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::tool::{DateTimeTool, GetWeatherTool};
use agent_core::{AgentBuilder, LlmProvider, ModelConfig};
use agent_mcp::{ServerConfig, run_with_servers};
use agent_openai::OpenAiProvider;

#[derive(Parser, Debug)]
#[command(
    name = "agent-cli",
    about = "Run one prompt through the tool-calling agent"
)]
struct Args {
    /// Prompt to send to the agent
    prompt: String,

    /// Model identifier
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,

    /// System prompt
    #[arg(long, default_value = "You are a helpful assistant")]
    system: String,

    /// JSON file holding an array of tool-server configurations
    #[arg(long)]
    servers: Option<PathBuf>,

    /// Maximum tool-call rounds before giving up
    #[arg(long, default_value_t = 10)]
    max_turns: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize the completion provider
    let provider = Arc::new(OpenAiProvider::from_env()?);
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to completion endpoint"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Completion endpoint not reachable - the run will likely fail");
        }
    }

    // Tool-server configurations, if any
    let servers: Vec<ServerConfig> = match &args.servers {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        }
        None => Vec::new(),
    };
    for server in &servers {
        tracing::info!(server = %server.describe(), "configured tool server");
    }

    let config = ModelConfig {
        model: args.model,
        max_turns: args.max_turns,
        ..ModelConfig::default()
    };

    let mut agent = AgentBuilder::new("agent-cli")
        .system(args.system)
        .provider(provider)
        .tool(GetWeatherTool)
        .tool(DateTimeTool)
        .config(config)
        .build()?;

    let result = if servers.is_empty() {
        agent.run(&args.prompt).await
    } else {
        run_with_servers(&mut agent, &servers, &args.prompt).await
    };

    match result {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}
