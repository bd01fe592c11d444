use std::{
    io::Read,
    path::{Path, PathBuf},
};

use clap::Parser;
use purgekeeper::{
    AppState,
    config::{self, PurgekeeperConfig},
    engine::{self, DeletionEngine, RoutineRegistry},
    observability, routes,
    store::create_store,
};
use tokio_util::sync::CancellationToken;

/// CLI arguments for purgekeeper
#[derive(Parser, Debug)]
#[command(version, about = "Purges old messages from chat channels", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "purgekeeper.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the deletion engine and admin API (default)
    Serve,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate a batch of `[days, channel]` pairs without starting anything
    CheckBatch {
        /// File holding the batch JSON; `-` reads stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output.unwrap_or(args.config), force);
        }
        Some(Command::CheckBatch { input }) => {
            run_check_batch(&input);
        }
        Some(Command::Serve) | None => {
            run_server(&args.config).await;
        }
    }
}

fn run_init(output_path: PathBuf, force: bool) {
    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, config::DEFAULT_CONFIG) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Set DISCORD_TOKEN, then run:");
    println!("  purgekeeper serve --config {}", output_path.display());
}

fn run_check_batch(input: &Path) {
    let contents = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map(|_| buf)
    } else {
        std::fs::read_to_string(input)
    };
    let contents = match contents {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to read {}: {}", input.display(), e);
            std::process::exit(1);
        }
    };

    let entries = match engine::parse_batch(&contents) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut invalid = 0;
    for (index, entry) in entries.iter().enumerate() {
        match entry {
            Ok(entry) => println!(
                "#{index}: channel {} older than {} days",
                entry.target, entry.max_age_days
            ),
            Err(e) => {
                invalid += 1;
                println!("#{index}: skipped ({e})");
            }
        }
    }
    println!("{} usable, {} skipped", entries.len() - invalid, invalid);
}

async fn run_server(config_path: &Path) {
    let config = match PurgekeeperConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    tracing::info!(
        config_file = %config_path.display(),
        "Starting purgekeeper"
    );

    let handles = match create_store(&config.store) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create message store");
            std::process::exit(1);
        }
    };
    tracing::info!(store = handles.store.name(), "Message store ready");

    let engine = DeletionEngine::new(config.engine.clone(), handles, RoutineRegistry::new());

    match engine.launch_startup(&config.startup).await {
        Ok(report) if !report.started.is_empty() || !report.skipped.is_empty() => {
            tracing::info!(
                started = report.started.len(),
                skipped = report.skipped.len(),
                "Startup deletions launched"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Startup deletions rejected"),
    }

    let shutdown = CancellationToken::new();
    let state = AppState {
        engine: engine.clone(),
        shutdown: shutdown.clone(),
    };

    if config.server.enabled {
        let app = routes::build_app(&config.server, state);
        let addr = std::net::SocketAddr::new(config.server.host, config.server.port);
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, error = %e, "Failed to bind admin API");
                std::process::exit(1);
            }
        };
        tracing::info!(%addr, "Admin API listening");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await
        {
            tracing::error!(error = %e, "Admin API stopped with an error");
        }
    } else {
        shutdown_signal(shutdown).await;
    }

    let halted = engine.shutdown(config.engine.shutdown_timeout()).await;
    tracing::info!(halted, "Shutdown complete");
}

/// Resolves on SIGINT, SIGTERM or when `shutdown` is cancelled.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    shutdown.cancel();
    tracing::info!("Shutdown signal received, halting deletion routines...");
}
