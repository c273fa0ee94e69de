//! statecast - report live game state to a collector from the command line
//!
//! This tool provides commands for:
//! - Streaming `key=value` state updates from stdin to the collector
//! - Checking reporter configuration and identity token
//! - Starting a browser authorization for the identity token
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/statecast/config.toml (~/.config/statecast/config.toml)
//! - Token: $XDG_DATA_HOME/statecast/token.json (~/.local/share/statecast/token.json)
//! - Logs: $XDG_STATE_HOME/statecast/statecast.log

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use statecast_core::{
    Authenticator, Config, DeliveryStatus, GameIdentity, StateReporter, TokenStore,
};

#[derive(Parser)]
#[command(name = "statecast")]
#[command(about = "Report live game state to a collector")]
#[command(version)]
struct Args {
    /// Write logs to the XDG state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read `key=value` lines from stdin and report them as game state
    Run {
        /// Numeric game id registered with the collector
        #[arg(long)]
        game_id: u64,

        /// Game display name
        #[arg(long)]
        name: String,

        /// Start a browser authorization before reporting
        #[arg(long)]
        authorize: bool,

        /// Stop when stdin closes instead of heartbeating until Ctrl-C
        #[arg(long)]
        exit_on_eof: bool,
    },

    /// Show reporter configuration and token status
    Status,

    /// Create an identity token if needed and print the authorization URL
    Authorize {
        /// Numeric game id registered with the collector
        #[arg(long)]
        game_id: u64,

        /// Game display name
        #[arg(long)]
        name: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging if verbose; the guard must outlive the command
    let _log_guard = if args.verbose {
        Some(
            statecast_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Run {
            game_id,
            name,
            authorize,
            exit_on_eof,
        } => cmd_run(&config, game_id, name, authorize, exit_on_eof),
        Command::Status => cmd_status(&config),
        Command::Authorize { game_id, name } => cmd_authorize(&config, game_id, name),
    }
}

fn load_token_store() -> Result<TokenStore> {
    let path = Config::token_path();
    TokenStore::load(&path).with_context(|| format!("failed to load token from {}", path.display()))
}

fn server_url(config: &Config) -> Result<&str> {
    config
        .reporter
        .base_url()
        .context("reporter.server_url is not set; run 'status' for details")
}

fn cmd_run(
    config: &Config,
    game_id: u64,
    name: String,
    authorize: bool,
    exit_on_eof: bool,
) -> Result<()> {
    let game = GameIdentity::new(game_id, name).context("invalid game identity")?;
    let auth = Arc::new(load_token_store()?);

    if authorize {
        let url = auth
            .begin_authorization(server_url(config)?, &game)
            .context("failed to start authorization")?;
        println!("Open this URL to authorize reporting:");
        println!("  {}", url);
    } else if auth.current_token().is_none() {
        println!("No identity token yet; state is held until one exists.");
        println!("Run with --authorize or use 'statecast authorize'.");
    }

    let reporter = StateReporter::new(&config.reporter, auth.clone())
        .context("failed to start state reporter")?;
    reporter
        .initialize(game)
        .context("failed to initialize state reporter")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    // stdin blocks, so read it on its own thread and poll from here
    let (lines_tx, lines_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if lines_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    let mut last_status = reporter.current_status();
    println!("Reporting state for game {} (status: {})", game_id, last_status);

    while running.load(Ordering::SeqCst) {
        match lines_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(line) => match parse_assignment(&line) {
                Some((key, value)) => reporter.merge_state([(key, value)]),
                None if line.trim().is_empty() => {}
                None => eprintln!("ignoring line without '=': {}", line),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if exit_on_eof {
                    break;
                }
                std::thread::sleep(Duration::from_millis(250));
            }
        }

        let status = reporter.current_status();
        if status != last_status {
            println!("Status: {}", describe_status(status));
            last_status = status;
        }
        if reporter.is_halted() {
            eprintln!("Collector does not know game {}; reporting stopped.", game_id);
            break;
        }
    }

    reporter.shutdown();
    println!("Stopped.");
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("statecast Reporter Configuration");
    println!("================================");
    println!();

    let reporter = &config.reporter;

    println!("Config file:     {}", Config::config_path().display());
    println!(
        "Server URL:      {}",
        reporter.server_url.as_deref().unwrap_or("<not set>")
    );

    if reporter.server_url.is_none() {
        println!();
        println!("Set the collector URL in config.toml:");
        println!();
        println!("  [reporter]");
        println!("  server_url = \"https://presence.example.com\"");
    }

    println!("State path:      {}", reporter.state_path);
    println!("Heartbeat:       {}ms", reporter.heartbeat_ms);
    println!("Connecting:      {}ms", reporter.connecting_heartbeat_ms);
    println!("Throttle:        {}ms", reporter.throttle_ms);
    println!("Request timeout: {}ms", reporter.request_timeout_ms);

    println!();
    match reporter.validate() {
        Ok(()) => println!("Config: valid"),
        Err(e) => println!("Config: invalid ({})", e),
    }

    let store = load_token_store()?;
    println!("Token file:      {}", Config::token_path().display());
    match (store.current_token(), store.token_created_at()) {
        (Some(token), created_at) => {
            println!("Token:           {}", mask_token(&token));
            if let Some(created_at) = created_at {
                println!("Created:         {}", created_at.to_rfc3339());
            }
        }
        (None, _) => println!("Token:           none (run 'authorize')"),
    }

    Ok(())
}

fn cmd_authorize(config: &Config, game_id: u64, name: String) -> Result<()> {
    let game = GameIdentity::new(game_id, name).context("invalid game identity")?;
    let store = load_token_store()?;
    let url = store
        .begin_authorization(server_url(config)?, &game)
        .context("failed to start authorization")?;

    println!("Open this URL to authorize reporting for {}:", game.name);
    println!("  {}", url);
    Ok(())
}

/// Split `key=value`, trimming whitespace around both halves
fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

fn describe_status(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Uninitialized => "waiting for first response",
        DeliveryStatus::Sending => "sending",
        DeliveryStatus::Unauthenticated => "not authorized (open the authorization URL)",
    }
}

fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}…", visible)
}
