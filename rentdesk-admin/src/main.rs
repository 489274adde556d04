//! rentdesk-admin - car-rental administration API server
//!
//! `rentdesk-admin serve` (the default) runs the HTTP service;
//! `rentdesk-admin create-superadmin` seeds the first admin account.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rentdesk_common::api::auth::load_shared_secret;
use rentdesk_common::config::{CliOverrides, ServiceConfig, CONFIG_FILE_ENV, ROOT_FOLDER_ENV};
use rentdesk_admin::{build_router, db, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rentdesk-admin", version, about = "Car-rental administration API")]
struct Cli {
    /// Folder holding rentdesk.db
    #[arg(long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(long, env = CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Default tracing level; RUST_LOG directives take precedence
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Create a superadmin account
    CreateSuperadmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        root_folder: cli.root_folder.clone(),
        config_file: cli.config.clone(),
        bind_address: cli.bind.clone(),
        port: cli.port,
        log_level: cli.log_level.clone(),
    };
    let config = ServiceConfig::resolve(&overrides).context("Failed to resolve configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(
                    config
                        .log_level
                        .parse()
                        .unwrap_or_else(|_| tracing::Level::INFO.into()),
                )
                .from_env_lossy(),
        )
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting RentDesk admin (rentdesk-admin) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    config.ensure_root_folder()?;
    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match db::init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::CreateSuperadmin {
            email,
            display_name,
        } => {
            let admin = db::bootstrap_superadmin(&pool, &email, &display_name).await?;
            println!("{}", admin.id);
            Ok(())
        }
        Command::Serve => serve(config, pool).await,
    }
}

async fn serve(config: ServiceConfig, pool: sqlx::SqlitePool) -> Result<()> {
    let shared_secret = load_shared_secret(&pool)
        .await
        .context("Failed to load shared secret")?;
    if shared_secret == 0 {
        warn!("API signature checks disabled (shared_secret = 0)");
    } else {
        info!("✓ Loaded shared secret for API authentication");
    }

    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
        .fetch_one(&pool)
        .await?;
    if admins == 0 {
        warn!("No admin accounts yet; run `rentdesk-admin create-superadmin` to add one");
    }

    info!(
        "Business timezone UTC{:+}, request skew window {}ms",
        config.business_tz.offset_hours(),
        config.request_max_skew_ms
    );

    let state = AppState::new(pool, shared_secret)
        .with_business_tz(config.business_tz)
        .with_max_skew_ms(config.request_max_skew_ms);
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("rentdesk-admin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("rentdesk-admin stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Never resolve; keep serving
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
