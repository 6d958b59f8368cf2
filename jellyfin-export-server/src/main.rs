//! # Jellyfin Export Server
//!
//! Keeps a Jellyfin-ready folder tree of hardlinks, copies or symlinks in
//! sync with the media stored on a drive.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use jellyfin_export_core::{
    database::{self, PoolConfig},
    lock::{InProcessLocks, LockProvider, RedisLocks},
};
use jellyfin_export_server::{
    AppState, create_app,
    infra::{
        app_state::Backends,
        config::Config,
        scheduler::{ABANDON_GRACE, maintain_queue},
        startup::{ProdStartupHooks, StartupHooks, seed_settings},
        workers::{WorkerPool, WorkerTick},
    },
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "jellyfin-export-server")]
#[command(about = "Keeps a Jellyfin export view in sync with a drive")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Number of queue workers (overrides config)
    #[arg(long, env = "EXPORT_WORKERS")]
    workers: Option<usize>,

    /// Skip migrations at startup
    #[arg(long, env = "SKIP_MIGRATIONS", default_value_t = false)]
    skip_migrations: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
    /// Run every queued job once, then exit
    Drain,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        match command {
            Command::Db(DbCommand::Migrate) => {
                run_db_migrate(&cli.serve).await?;
                return Ok(());
            }
            Command::Drain => {
                run_drain(&cli.serve).await?;
                return Ok(());
            }
        }
    }

    run_server(cli.serve).await
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut config = Config::from_env().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server_host = host;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,export::tree=info,export::jobs=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(config)
}

async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for migrations")?;
    let pool = database::connect(database_url, &pool_config(&config))
        .await
        .context("failed to connect to PostgreSQL")?;
    database::migrate(&pool).await.context("migrations failed")?;
    info!("Database migrations applied");
    Ok(())
}

fn pool_config(config: &Config) -> PoolConfig {
    PoolConfig {
        max_connections: config.db_max_connections,
        ..PoolConfig::default()
    }
}

async fn wire_backends(config: &Config, migrate: bool) -> anyhow::Result<Backends> {
    let locks: Arc<dyn LockProvider> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisLocks::connect(url)
                .await
                .context("failed to connect to Redis")?,
        ),
        None => Arc::new(InProcessLocks::new()),
    };

    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, running with in-memory storage");
        return Ok(Backends {
            locks,
            ..Backends::in_memory()
        });
    };

    let pool = database::connect(database_url, &pool_config(config))
        .await
        .context("failed to connect to PostgreSQL")?;
    if migrate {
        database::migrate(&pool).await.context("migrations failed")?;
    }
    if config.redis_url.is_none() {
        warn!("REDIS_URL not set, export locks only cover this process");
    }

    Ok(Backends::postgres(pool, locks))
}

async fn run_drain(args: &ServeArgs) -> anyhow::Result<()> {
    let config = Arc::new(load_runtime_config(args)?);
    let backends = wire_backends(&config, !args.skip_migrations).await?;
    let state = AppState::new(config, backends);
    seed_settings(&state).await?;
    maintain_queue(
        state.queue().as_ref(),
        ABANDON_GRACE,
        state.config().job_retention,
    )
    .await?;

    let ticks = WorkerPool::from_state(&state)
        .drain(&format!("drain-{}", std::process::id()))
        .await?;
    let failed = ticks
        .iter()
        .filter(|tick| matches!(tick, WorkerTick::Failed(..)))
        .count();
    info!(processed = ticks.len(), failed, "queue drained");
    Ok(())
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    run_server_with_hooks(args, &ProdStartupHooks).await
}

async fn run_server_with_hooks<H>(args: ServeArgs, hooks: &H) -> anyhow::Result<()>
where
    H: StartupHooks,
{
    let config = Arc::new(load_runtime_config(&args)?);
    let backends = wire_backends(&config, !args.skip_migrations).await?;
    let state = AppState::new(Arc::clone(&config), backends);

    hooks.run(&state).await?;

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    info!("Starting Jellyfin Export on {}", addr);

    let shutdown = state.shutdown.clone();
    let router = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Give running jobs a moment to record their outcome.
    tokio::time::sleep(Duration::from_millis(250)).await;
    Ok(())
}

async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    shutdown.cancel();
}
