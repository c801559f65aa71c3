use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use promptdesk::agent::Agent;
use promptdesk::agent::oracle::{self, OllamaOracle};
use promptdesk::cli::{Cli, Commands};
use promptdesk::config::{Config, OracleBackend};
use promptdesk::google::{ClientFactory, GoogleClientFactory};
use promptdesk::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir().map(|p| p.as_path()))?;

    let config = Config::from_env().context("Failed to load configuration")?;
    let agent = Agent::new(Arc::from(oracle::from_config(&config)), &config);

    match cli.command {
        None => run_server(agent, &config, None).await,
        Some(Commands::Serve { bind, .. }) => run_server(agent, &config, bind).await,
        Some(Commands::Ask {
            domain,
            prompt,
            token,
            summarize,
        }) => {
            let clients = GoogleClientFactory::default().for_token(&token);
            let result = agent.handle(domain, &prompt, &clients).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if summarize && result.success {
                let payload = result.payload.unwrap_or_default();
                let text = agent
                    .summarize(Some(domain.as_str()), &payload)
                    .await
                    .context("Summary failed")?;
                println!("\n{}", text.trim());
            }
            Ok(())
        }
        Some(Commands::Context) => {
            println!("{}", serde_json::to_string_pretty(&agent.date_context())?);
            Ok(())
        }
    }
}

async fn run_server(agent: Agent, config: &Config, bind: Option<String>) -> Result<()> {
    if config.oracle_backend == OracleBackend::Ollama {
        let ollama = OllamaOracle::new(config.ollama_url.clone(), None);
        if !ollama.health_check().await {
            warn!(url = %config.ollama_url, "Ollama is not reachable; prompts will fail until it is");
        }
    }

    let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
    info!(backend = ?config.oracle_backend, model = %config.model, tz = %config.tz_name, "Starting server");

    let state = AppState {
        agent,
        factory: Arc::new(GoogleClientFactory::default()),
    };
    server::serve(state, &bind)
        .await
        .with_context(|| format!("Server on {} failed", bind))
}

/// Console logging, plus a daily-rolling file when `log_dir` is given.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("promptdesk=info"));
    let console = fmt::layer().with_writer(std::io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "promptdesk.log"));
    let file = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(Some(guard))
}
