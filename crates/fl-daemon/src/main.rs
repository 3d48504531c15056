//! fl-daemon entry point.
//!
//! This file is thin: it sets up tracing, loads configuration, picks the
//! store backend, starts the background loops, wires middleware and serves
//! HTTP. Handlers live in `routes.rs`; shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use fl_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, resolve_secrets,
    Consumer, LoadedConfig, UnusedKeyPolicy,
};
use fl_daemon::{routes, state};
use fl_db::PgStore;
use fl_lifecycle::SystemClock;
use fl_testkit::MemoryStore;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let report = report_unused_keys(Consumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "CONFIG_UNUSED_KEYS");
    }
    let cfg = loaded.settings()?;
    let settings = state::lifecycle_settings(&cfg);
    let secrets = resolve_secrets(&loaded.config_json, false)?;
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    let clock = Arc::new(SystemClock);
    let shared = match secrets.database_url.as_deref() {
        Some(url) => {
            let pool = fl_db::connect(url).await?;
            let db = fl_db::status(&pool).await?;
            if !db.has_shipments_table {
                bail!(
                    "database named by {} has no schema; run `fl db migrate --yes` first",
                    secrets.database_url_env
                );
            }
            info!(env = %secrets.database_url_env, "using postgres store");
            Arc::new(state::AppState::new(
                Arc::new(PgStore::new(pool)),
                clock,
                settings,
                "postgres",
                Some(loaded.config_hash.clone()),
            ))
        }
        None => {
            warn!(
                env = %secrets.database_url_env,
                "database url not set; state is in memory and lost on exit"
            );
            Arc::new(state::AppState::new(
                Arc::new(MemoryStore::new()),
                clock,
                settings,
                "memory",
                Some(loaded.config_hash.clone()),
            ))
        }
    };

    state::spawn_heartbeat(
        shared.bus.clone(),
        Duration::from_secs(cfg.daemon.heartbeat_secs),
    );
    state::spawn_offroute_tick(
        Arc::clone(&shared),
        Duration::from_secs(cfg.offroute.tick_interval_secs),
    );
    state::spawn_reservation_sweep(
        Arc::clone(&shared),
        Duration::from_secs(cfg.reservation.sweep_interval_secs),
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("fl-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `FL_CONFIG` is a comma-separated list of YAML layers, base first. Without
/// it every setting takes its default.
fn load_config() -> anyhow::Result<LoadedConfig> {
    match std::env::var("FL_CONFIG") {
        Ok(raw) if !raw.trim().is_empty() => {
            let paths: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            load_layered_yaml(&paths)
        }
        _ => load_layered_yaml_from_strings(&[]),
    }
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("FL_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
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
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}
