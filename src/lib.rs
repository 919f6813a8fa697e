pub mod api;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod workspace;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::Config;

/// Translatarr - Multi-user web front end for PDF translation
#[derive(Parser)]
#[command(name = "translatarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server (default)
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Reset a user's password from the terminal
    ResetPassword {
        /// Username of the account to reset
        username: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,

        Some(Commands::Init) => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Edit config.toml and run again.");
            } else {
                println!("Config file already exists.");
            }
            Ok(())
        }

        Some(Commands::ResetPassword { username }) => reset_password(config, &username).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        "Translatarr v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let port = config.server.port;
    let state = api::create_app_state(config).await?;
    let app = api::router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 Web Server running at http://0.0.0.0:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }
}

/// Terminal-only escape hatch for a locked-out account. Reads the new
/// password from stdin so it never appears in shell history.
async fn reset_password(config: Config, username: &str) -> anyhow::Result<()> {
    use crate::services::identity::validate_password;

    let store = db::Store::new(&config.general.database_path, config.security.clone()).await?;

    let Some(user) = store.get_user_by_username(username).await? else {
        anyhow::bail!("User '{username}' not found");
    };

    println!("New password for '{}':", user.username);
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let password = input.trim();

    if let Err(e) = validate_password(password) {
        anyhow::bail!("{e}");
    }

    store.update_user_password(username, password).await?;
    println!("✓ Password updated for '{username}'");

    Ok(())
}
