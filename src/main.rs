#![forbid(unsafe_code)]

//! `trace-selector`: inspect, edit and watch a trace admission policy.
//!
//! Loads the selector configuration, opens the policy store it names and
//! runs one administrative command against it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use trace_selector::repository::location::ResourceBundle;
use trace_selector::repository::RepositoryListener;
use trace_selector::{AppError, ChangeEvent, Result, Selector, SelectorConfig, Severity};

/// Poll interval used by `watch` when the configuration disables polling.
const WATCH_FALLBACK_REFRESH_MS: u64 = 1000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "trace-selector",
    about = "Inspect and edit trace admission policy",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the policy store location.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate the policy and print `true` or `false`.
    Check {
        /// Event severity.
        severity: Severity,
        /// Classification key.
        key: String,
        /// Event value matched against the token's pattern.
        value: Option<String>,
    },

    /// Print the accepted token for a key.
    Get {
        /// Classification key.
        key: String,
    },

    /// List keys with an accepted token.
    Keys {
        /// Print `{key: token}` as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Record `SEVERITY[:value]` for a key.
    Set {
        /// Minimum severity.
        severity: Severity,
        /// Classification key.
        key: String,
        /// Value pattern.
        value: Option<String>,
    },

    /// Remove a key from the store.
    Remove {
        /// Classification key.
        key: String,
    },

    /// Poll the store and print every change event until interrupted.
    Watch {
        /// Poll interval in milliseconds.
        #[arg(long)]
        refresh_time: Option<u64>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => SelectorConfig::load_from_path(path)?,
        None => SelectorConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(url) = args.url {
        config.repository.url = Some(url);
    }
    if let Command::Watch { refresh_time } = &args.command {
        let configured = config.repository.refresh_time;
        let fallback = if configured == 0 {
            WATCH_FALLBACK_REFRESH_MS
        } else {
            configured
        };
        config.repository.refresh_time = refresh_time.unwrap_or(fallback);
    }

    let selector = config.build_selector(ResourceBundle::new());
    selector.open().await?;

    let outcome = execute(&selector, args.command).await;
    selector.close().await;
    outcome
}

async fn execute(selector: &impl Selector, command: Command) -> Result<()> {
    match command {
        Command::Check {
            severity,
            key,
            value,
        } => {
            println!("{}", selector.evaluate(severity, &key, value.as_deref()));
        }
        Command::Get { key } => match selector.get(&key) {
            Some(raw) => println!("{raw}"),
            None => {
                return Err(AppError::Repository(format!(
                    "no token recorded for '{key}'"
                )))
            }
        },
        Command::Keys { json } => {
            let keys = selector.keys();
            if json {
                let tokens: serde_json::Map<String, serde_json::Value> = keys
                    .into_iter()
                    .filter_map(|key| {
                        let raw = selector.get(&key)?;
                        Some((key, serde_json::Value::String(raw)))
                    })
                    .collect();
                println!("{}", serde_json::Value::Object(tokens));
            } else {
                for key in keys {
                    println!("{key}");
                }
            }
        }
        Command::Set {
            severity,
            key,
            value,
        } => {
            selector.set(severity, &key, value.as_deref())?;
            info!(key = %key, "token recorded");
        }
        Command::Remove { key } => {
            selector.remove(&key)?;
            info!(key = %key, "token removed");
        }
        Command::Watch { .. } => watch(selector).await?,
    }
    Ok(())
}

/// Print change events as JSON lines until a shutdown signal arrives.
async fn watch(selector: &impl Selector) -> Result<()> {
    let repository = selector
        .repository()
        .filter(|r| r.is_defined())
        .ok_or_else(|| AppError::Config("watch needs a store location".into()))?;

    let printer: Arc<dyn RepositoryListener> = Arc::new(|event: &ChangeEvent| {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "failed to encode change event"),
        }
    });
    let id = repository.add_listener(printer);
    info!(keys = selector.keys().len(), "watching policy store");

    shutdown_signal().await;
    info!("shutdown signal received");
    repository.remove_listener(id);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
