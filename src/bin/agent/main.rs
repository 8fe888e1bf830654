use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dom_pilot::hands::DEFAULT_DEBUG_ENDPOINT;
use dom_pilot::{Agent, AgentConfig, Brain, ChromeSession, RunStatus};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Drive a Chrome tab toward a natural-language task.
#[derive(Debug, Parser)]
#[command(name = "agent", version, about)]
struct Cli {
    /// The task, e.g. "search for rust on baidu and take a screenshot".
    task: String,

    /// JSON file with agent settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Launch Chrome without a window.
    #[arg(long)]
    headless: bool,

    /// Attach to a Chrome started with remote debugging instead of launching one.
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_DEBUG_ENDPOINT)]
    attach: Option<String>,

    #[arg(long)]
    max_cycles: Option<u32>,

    /// Draw numbered boxes over interactive elements.
    #[arg(long)]
    highlight: bool,

    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli)?;
    let brain = Brain::from_env().context("reasoning engine is not configured")?;

    let attach = cli.attach.clone();
    let headless = cli.headless;
    let session = tokio::task::spawn_blocking(move || match attach {
        Some(endpoint) => ChromeSession::attach(&endpoint),
        None => ChromeSession::launch(headless),
    })
    .await
    .context("browser startup panicked")??;

    let mut agent = Agent::new(session, brain, config);
    let report = agent.run(&cli.task).await;

    info!(status = ?report.status, cycles = report.cycles, "run finished");
    for (i, entry) in report.history.entries().iter().enumerate() {
        println!("{:>3}. {}", i + 1, entry.describe());
    }
    match report.status {
        RunStatus::Completed => {
            println!("Completed after {} cycles.", report.cycles);
            if let Some(reason) = &report.reason {
                println!("Note: {reason}");
            }
            Ok(())
        }
        RunStatus::Failed | RunStatus::BudgetExhausted => anyhow::bail!(
            "run ended {:?}: {}",
            report.status,
            report.reason.as_deref().unwrap_or("no reason given")
        ),
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AgentConfig::new(),
    };
    if let Some(cycles) = cli.max_cycles {
        config = config.max_cycles(cycles);
    }
    if cli.highlight {
        config = config.highlight(true);
    }
    if let Some(dir) = &cli.screenshot_dir {
        config = config.screenshot_dir(dir);
    }
    config.validate()?;
    Ok(config)
}
