//! statusboardd — the statusboard daemon.
//!
//! Single binary that assembles every statusboard subsystem:
//! - Configuration store (JSON file)
//! - Upstream status prober
//! - Discord adapter
//! - Reconciler loop
//! - Admin API (when `STATUSBOARD_ADMIN_TOKEN` is set)
//! - Slash command endpoint (when `DISCORD_PUBLIC_KEY` is set)
//!
//! Slash commands are only registered when the daemon can answer them,
//! which requires the application's public key. Discord must be pointed at
//! `https://<host>/interactions` as the interactions endpoint URL.
//!
//! # Usage
//!
//! ```text
//! DISCORD_TOKEN=... DISCORD_APPLICATION_ID=... DISCORD_PUBLIC_KEY=... \
//!     statusboardd run --data-dir /var/lib/statusboard
//! statusboardd check --services services.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use statusboard_api::SignatureVerifier;
use statusboard_discord::{DiscordClient, DiscordConfig};
use statusboard_engine::{CachedResolver, CommandSurface, Reconciler, Renderer};
use statusboard_probe::{HttpProber, Prober, RetryPolicy, ServiceCatalog};
use statusboard_state::{ConfigStore, DEFAULT_REFRESH_INTERVAL};

const TOKEN_VAR: &str = "DISCORD_TOKEN";
const APPLICATION_VAR: &str = "DISCORD_APPLICATION_ID";
const PUBLIC_KEY_VAR: &str = "DISCORD_PUBLIC_KEY";
const ADMIN_TOKEN_VAR: &str = "STATUSBOARD_ADMIN_TOKEN";

#[derive(Parser)]
#[command(name = "statusboardd", about = "Service status board daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to Discord and keep every status board fresh.
    Run {
        /// Data directory for the configuration file.
        #[arg(long, default_value = "/var/lib/statusboard")]
        data_dir: PathBuf,

        /// Service catalog (TOML). The built-in catalog is used when omitted.
        #[arg(long)]
        services: Option<PathBuf>,

        /// Listen address for the admin API and the interactions endpoint.
        #[arg(long, default_value = "127.0.0.1:8787")]
        listen: SocketAddr,

        /// Seconds between reconciliation ticks.
        #[arg(long, default_value = "60")]
        tick_secs: u64,

        /// Refresh interval in minutes for boards created without one.
        #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL)]
        default_interval: u32,

        /// Do not overwrite the global slash commands on startup.
        #[arg(long)]
        skip_register: bool,
    },

    /// Probe every catalog service once and print the result.
    Check {
        /// Service catalog (TOML). The built-in catalog is used when omitted.
        #[arg(long)]
        services: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,statusboardd=debug,statusboard=debug")
            }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            data_dir,
            services,
            listen,
            tick_secs,
            default_interval,
            skip_register,
        } => {
            run(RunOptions {
                data_dir,
                services,
                listen,
                tick: Duration::from_secs(tick_secs.max(1)),
                default_interval,
                skip_register,
            })
            .await
        }
        Command::Check { services } => check(services.as_deref()).await,
    }
}

struct RunOptions {
    data_dir: PathBuf,
    services: Option<PathBuf>,
    listen: SocketAddr,
    tick: Duration,
    default_interval: u32,
    skip_register: bool,
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<ServiceCatalog> {
    match path {
        Some(path) => ServiceCatalog::from_file(path)
            .with_context(|| format!("loading service catalog {}", path.display())),
        None => Ok(ServiceCatalog::builtin()),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_env(name: &str) -> anyhow::Result<String> {
    optional_env(name).with_context(|| format!("{name} must be set"))
}

async fn check(services: Option<&Path>) -> anyhow::Result<()> {
    let catalog = load_catalog(services)?;
    let prober = HttpProber::from_catalog(&catalog)?;
    let snapshot = prober.probe().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run(opts: RunOptions) -> anyhow::Result<()> {
    info!("statusboard daemon starting");

    let token = required_env(TOKEN_VAR)?;
    let application_id = required_env(APPLICATION_VAR)?;
    let admin_token = optional_env(ADMIN_TOKEN_VAR);
    let verifier = optional_env(PUBLIC_KEY_VAR)
        .map(|key| SignatureVerifier::from_hex(&key))
        .transpose()
        .with_context(|| format!("parsing {PUBLIC_KEY_VAR}"))?;

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&opts.data_dir)
        .with_context(|| format!("creating data directory {}", opts.data_dir.display()))?;
    let config_path = opts.data_dir.join("statusboard.json");
    let store = ConfigStore::open(&config_path, opts.default_interval)?;
    info!(path = ?config_path, trackers = store.len(), "configuration loaded");

    let catalog = load_catalog(opts.services.as_deref())?;
    let prober = HttpProber::from_catalog(&catalog)?;
    info!(services = prober.services().len(), "prober initialized");

    let discord = Arc::new(DiscordClient::new(DiscordConfig::new(token, application_id))?);
    let login_policy =
        RetryPolicy::new(5, Duration::from_secs(1)).with_max_delay(Duration::from_secs(30));
    if let Err(e) = discord.connect(&login_policy).await {
        error!(error = %e, fatal = e.is_fatal(), "could not connect to discord");
        return Err(e.into());
    }
    if opts.skip_register {
        info!("slash command registration skipped");
    } else if verifier.is_none() {
        warn!("{PUBLIC_KEY_VAR} not set, slash commands disabled and not registered");
    } else if let Err(e) = discord.register_commands().await {
        warn!(error = %e, "slash command registration failed");
    }

    let reconciler = Arc::new(Reconciler::new(
        store,
        Arc::new(prober),
        discord.clone(),
        Arc::new(CachedResolver::new(discord.clone())),
        Renderer::new(&catalog.services),
    ));
    let commands = CommandSurface::new(reconciler.clone());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let tick = opts.tick;
    let reconcile_shutdown = shutdown_rx.clone();
    let reconcile_handle = tokio::spawn(async move {
        reconciler.run(tick, reconcile_shutdown).await;
    });

    let mut presence = discord.presence_feed();
    let mut presence_shutdown = shutdown_rx.clone();
    let presence_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = presence.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // No gateway session consumes the feed; the change is only logged.
                    if let Some(p) = *presence.borrow_and_update() {
                        info!(activity = p.activity(), "presence changed");
                    }
                }
                _ = presence_shutdown.changed() => break,
            }
        }
    });

    // ── HTTP surfaces ──────────────────────────────────────────

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    };

    let mut router = None;
    match admin_token {
        Some(admin_token) => {
            router = Some(statusboard_api::build_router(commands.clone(), &admin_token));
        }
        None => info!("{ADMIN_TOKEN_VAR} not set, admin API disabled"),
    }
    if let Some(verifier) = verifier {
        let interactions =
            statusboard_api::interactions_router(commands, verifier, discord.clone());
        router = Some(match router {
            Some(admin) => admin.merge(interactions),
            None => interactions,
        });
    }

    match router {
        Some(router) => {
            let listener = tokio::net::TcpListener::bind(opts.listen).await?;
            info!(addr = %opts.listen, "http listening");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        None => shutdown.await,
    }

    let _ = reconcile_handle.await;
    let _ = presence_handle.await;

    info!("statusboard daemon stopped");
    Ok(())
}
