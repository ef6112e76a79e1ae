//! wolfe-daemon entry point.
//!
//! Loads config, wires the lock service, audit log and safety controls,
//! starts the elector loop and serves the operator API until ctrl-c.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use wolfe_audit::{AuditKey, AuditLog};
use wolfe_config::LockBackend;
use wolfe_daemon::{routes, state::AppState};
use wolfe_execution::{AdapterSlot, ExecutorMode, ModalAdapter, PaperVenue};
use wolfe_lock::{LockService, MemoryLockService};

/// Comma-separated YAML layers, earliest first.
const ENV_CONFIG_PATHS: &str = "WOLFE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/base.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let settings = loaded.settings()?;
    let secrets = wolfe_config::resolve_secrets(&settings)?;
    info!(
        node_id = %settings.node_id,
        mode = %settings.executor_mode,
        config_hash = %loaded.config_hash,
        "config loaded"
    );
    if secrets.dash_token.is_none() {
        warn!(env = %settings.daemon.token_env, "no dashboard token; operator routes will refuse all requests");
    }

    let audit_key = match secrets.audit_key.as_deref() {
        Some(k) => AuditKey::parse(k).context("audit key unusable")?,
        None => {
            warn!(env = %settings.audit.key_env, "no audit key; using an ephemeral key, logs will be unreadable after restart");
            AuditKey::generate()
        }
    };
    let audit = Arc::new(AuditLog::open(&settings.audit.dir, &audit_key)?);

    let svc: Arc<dyn LockService> = match settings.lock.backend {
        LockBackend::Memory => {
            warn!("in-memory lock service: single-node only");
            Arc::new(MemoryLockService::new())
        }
        LockBackend::Postgres => {
            let url = secrets
                .database_url
                .as_deref()
                .context("database url not resolved")?;
            let pool = wolfe_db::connect(url).await?;
            wolfe_db::migrate(&pool).await?;
            Arc::new(wolfe_db::PgLockService::new(pool))
        }
    };

    let adapters = AdapterSlot::new();
    let mode: ExecutorMode = settings.executor_mode.parse()?;
    if mode != ExecutorMode::Live {
        adapters.register(Arc::new(ModalAdapter::new("paper", mode, PaperVenue::new())));
    }

    let shared = Arc::new(AppState::assemble(
        &settings,
        &secrets,
        svc,
        audit,
        adapters,
    )?);
    shared.elector.spawn();

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = settings
        .daemon
        .addr
        .parse()
        .with_context(|| format!("invalid daemon.addr {:?}", settings.daemon.addr))?;
    info!("wolfe-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    shared.elector.stop().await;
    info!("wolfe-daemon stopped");
    Ok(())
}

fn load_config() -> Result<wolfe_config::LoadedConfig> {
    let raw = std::env::var(ENV_CONFIG_PATHS).ok();
    let paths: Vec<&str> = match raw.as_deref() {
        Some(list) => list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect(),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => vec![DEFAULT_CONFIG_PATH],
        None => vec![],
    };
    if paths.is_empty() {
        warn!("no config files; using defaults and WOLFE__* overrides");
        return wolfe_config::load_layered_yaml_with_env(&[], std::env::vars());
    }
    wolfe_config::load_layered_yaml(&paths)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
