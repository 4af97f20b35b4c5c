use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use relay::app;
use relay_core::config::Config;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Relay Mastodon notifications and weather reports to a OneBot (QQ) endpoint"
)]
struct Cli {
    /// TOML config file (default: $XDG_CONFIG_HOME/relay/config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forward new Mastodon notifications.
    Mastodon(RunArgs),
    /// Forward new AMap live-weather reports.
    Weather(RunArgs),
    /// Serve /health, /uptime, /cert and /whois.
    Lookup {
        /// Override `lookup.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load the configuration and report which modes are ready to run.
    CheckConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let shutdown = CancellationToken::new();

    match cli.command {
        Command::Mastodon(args) => {
            let notifier = app::mastodon_notifier(&config).context("mastodon mode")?;
            watch_signals(shutdown.clone());
            app::drive(notifier, config.notifier.interval(), args.once, shutdown).await?;
        }
        Command::Weather(args) => {
            let notifier = app::weather_notifier(&config).context("weather mode")?;
            watch_signals(shutdown.clone());
            app::drive(notifier, config.notifier.interval(), args.once, shutdown).await?;
        }
        Command::Lookup { bind } => {
            if let Some(bind) = bind {
                config.lookup.bind = bind;
            }
            watch_signals(shutdown.clone());
            relay_lookup::serve(&config.lookup, shutdown).await?;
        }
        Command::CheckConfig => check_config(&config, cli.config.as_deref()),
    }
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
            tracing::info!(path = %path.display(), "relay log started");
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn watch_signals(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot watch SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate => {}
        }
        tracing::info!("shutdown requested");
        shutdown.cancel();
    });
}

fn check_config(config: &Config, path: Option<&Path>) {
    match path {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: (default location, if present)"),
    }
    println!(
        "notifier: every {:?}, cursor in {}",
        config.notifier.interval(),
        config.notifier.state_file.display()
    );
    let policy = config.http.retry_policy();
    println!(
        "http: timeout {:?}, {} attempt(s), backoff {:?}..{:?}, retry on {:?} and 429",
        config.http.timeout(),
        policy.max_attempts,
        policy.base_delay,
        policy.max_delay,
        policy.retry_statuses
    );
    for (mode, ready) in app::readiness(config) {
        match ready {
            Ok(()) => println!("{mode}: ready"),
            Err(e) => println!("{mode}: not ready ({e})"),
        }
    }
    println!(
        "lookup: bind {}, cache ttl {:?}",
        config.lookup.bind,
        config.lookup.cache_ttl()
    );
}
