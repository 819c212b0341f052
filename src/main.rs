//! Trust Console CLI
//!
//! Live operator view of a trust scoring service.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use trust_console::{
    client::{ApiConfig, TrustApiClient, TrustSource},
    config::Config,
    console::{self, RenderOptions},
    core::{projection, ScoreMap},
    LiveSession, SharedTrustState, VERSION,
};

#[derive(Parser)]
#[command(name = "trust-console")]
#[command(version = VERSION)]
#[command(about = "Operator console for a trust scoring service", long_about = None)]
struct Cli {
    /// Trust service base URL (overrides config and environment)
    #[arg(long, global = true)]
    api: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow scores, the selected timeline and live events
    Watch {
        /// Agent to select at startup (defaults to the top-ranked agent)
        #[arg(long)]
        agent: Option<String>,

        /// Number of timeline points to show
        #[arg(long)]
        window: Option<usize>,

        /// Maximum ranking rows to show
        #[arg(long)]
        rows: Option<usize>,
    },

    /// Print the current score ranking once
    Scores,

    /// Print one agent's recent timeline
    Timeline {
        #[arg(long)]
        agent: String,

        /// Number of points to show, most recent first
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print recent trust events across all agents
    Events {
        #[arg(long, default_value = "25")]
        limit: usize,
    },

    /// Show trust service status
    Status,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trust_console=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(api) = cli.api {
        config.api_base_url = api;
    }
    config.validate()?;

    match cli.command {
        Commands::Watch {
            agent,
            window,
            rows,
        } => cmd_watch(&config, agent, window, rows).await,
        Commands::Scores => cmd_scores(&config).await,
        Commands::Timeline { agent, limit } => cmd_timeline(&config, &agent, limit).await,
        Commands::Events { limit } => cmd_events(&config, limit).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Config { save } => cmd_config(&config, save),
    }
}

async fn cmd_watch(
    config: &Config,
    agent: Option<String>,
    window: Option<usize>,
    rows: Option<usize>,
) -> anyhow::Result<()> {
    let window = window.unwrap_or(config.window_limit);
    let options = RenderOptions {
        timezone: config.display_tz()?,
        max_rows: rows,
    };

    let session = LiveSession::start(config)?;
    let state = session.state().clone();
    if let Some(agent) = agent {
        state.select_agent(agent);
    }

    let cancel = session.cancel_token();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())
        .context("Error setting Ctrl+C handler")?;

    let mut changes = state.subscribe();
    let mut channel = session.channel_status();
    let mut input = spawn_input_reader();

    loop {
        let frame = console::render_frame(
            &state.view(window),
            &state.recent_activity(5),
            *channel.borrow_and_update(),
            &options,
        );
        // Clear the screen and redraw from the top.
        print!("\x1b[2J\x1b[H{frame}");
        println!();
        println!("Type an agent id or ranking number to select it. Ctrl+C to quit.");

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = channel.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(line) = input.recv() => select_from_input(&state, line.trim()),
        }
    }

    let stats = state.stats().clone();
    session.shutdown().await;

    println!();
    println!("{}", stats.summary());
    Ok(())
}

/// Read operator input on a dedicated thread so a pending read never holds
/// up runtime shutdown.
fn spawn_input_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not read operator input: {e}");
                    break;
                }
            }
        }
    });
    rx
}

/// Interpret operator input as a 1-based ranking position or an agent id.
fn select_from_input(state: &SharedTrustState, input: &str) {
    if input.is_empty() {
        return;
    }

    let agent = match input.parse::<usize>() {
        Ok(position) if position > 0 => state
            .current_ranking()
            .into_iter()
            .nth(position - 1)
            .map(|row| row.agent),
        _ => Some(input.to_string()),
    };

    match agent {
        Some(agent) => state.select_agent(agent),
        None => tracing::warn!("No agent at ranking position {input}"),
    }
}

async fn cmd_scores(config: &Config) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let scores: ScoreMap = client.fetch_scores().await?;

    println!("Trust Score Table");
    println!("=================");
    print!("{}", console::render_ranking(&projection::rank(&scores), None, None));
    Ok(())
}

async fn cmd_timeline(config: &Config, agent: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let timeline = client.fetch_timeline(agent).await?;
    let window = projection::recent_window(&timeline, limit.unwrap_or(config.window_limit));

    println!("Timeline for {agent} ({} points total)", timeline.len());
    print!("{}", console::render_window(&window, config.display_tz()?));
    Ok(())
}

async fn cmd_events(config: &Config, limit: usize) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let events = client.fetch_events(limit).await?;

    if events.is_empty() {
        println!("No trust events recorded.");
        return Ok(());
    }

    println!("Recent Trust Events");
    println!("===================");
    print!("{}", console::render_events(&events, config.display_tz()?));
    Ok(())
}

async fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let client = api_client(config)?;

    println!("Trust Service Status");
    println!("====================");
    println!();
    println!("API: {}", client.config().base_url);
    println!("Live stream: {}", client.config().stream_url()?);
    println!();

    match client.fetch_status().await {
        Ok(status) => {
            println!("Kernel status: {}", status.status);
            if let Some(version) = status.version {
                println!("Kernel version: {version}");
            }
            if let Some(count) = status.adapters_registered {
                println!("Adapters registered: {count}");
            }
            for adapter in status.adapters {
                println!("  - {adapter}");
            }
            if let Some(ts) = status.timestamp {
                println!(
                    "Reported at: {}",
                    projection::format_timestamp(ts as i64, config.display_tz()?)
                );
            }
        }
        Err(e) => println!("Kernel status unavailable: {e}"),
    }
    Ok(())
}

fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        let path = config.save()?;
        println!();
        println!("Saved to {path:?}");
    }
    Ok(())
}

fn api_client(config: &Config) -> anyhow::Result<TrustApiClient> {
    Ok(TrustApiClient::new(ApiConfig::from_config(config))?)
}
