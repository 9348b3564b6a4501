//! farmhub-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `FARMHUB_*` environment variables, opens the SQLite store and serves the
//! API over HTTP.
//!
//! # Bootstrapping an administrator
//!
//! Register an account through `POST /auth/register`, then promote it:
//!
//! ```text
//! farmhub-server --grant-admin <username>
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use farmhub_api::{AppState, ServerConfig};
use farmhub_core::{store::MarketStore, user::UserType};
use farmhub_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Farmhub marketplace API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Promote the named account to administrator and exit.
  #[arg(long, value_name = "USERNAME")]
  grant_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FARMHUB"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  anyhow::ensure!(!server_cfg.jwt_secret.is_empty(), "jwt_secret must not be empty");

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(username) = cli.grant_admin {
    return grant_admin(&store, &username).await;
  }

  let state = AppState {
    store:  Arc::new(store),
    tokens: Arc::new(server_cfg.token_issuer()),
  };

  let app = farmhub_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn grant_admin(store: &SqliteStore, username: &str) -> anyhow::Result<()> {
  let user = store
    .find_user_by_username(username)
    .await?
    .with_context(|| format!("no account named {username:?}"))?;
  let user = store.set_user_type(user.id, UserType::Admin).await?;
  tracing::info!(user_id = user.id, username = %user.username, "granted administrator role");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
