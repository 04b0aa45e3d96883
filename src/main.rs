//! Raclette kiosk binary: one competition controller behind a small REST + SSE surface.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raclette_back::{
    config::{AppConfig, StoreKind},
    dao::{
        competition_store::{CompetitionStore, memory::MemoryCompetitionStore},
        session_store::FileSessionStore,
    },
    routes,
    services::competition_service,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store(config.store).await?;
    let sessions = Arc::new(FileSessionStore::new(config.session_path.clone()));
    info!(path = %sessions.path().display(), "using session file");

    let app_state = AppState::new(config, store, sessions);
    if competition_service::restore_session(&app_state).await {
        info!("resumed returning player");
    }

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Build the competition store selected in the configuration.
async fn build_store(kind: StoreKind) -> anyhow::Result<Arc<dyn CompetitionStore>> {
    match kind {
        StoreKind::Memory => {
            info!("using in-memory competition store; players are not shared between kiosks");
            Ok(Arc::new(MemoryCompetitionStore::new()))
        }
        StoreKind::Couch => connect_couch().await,
    }
}

#[cfg(feature = "couch-store")]
/// Connect to CouchDB, retrying with exponential backoff until it answers.
async fn connect_couch() -> anyhow::Result<Arc<dyn CompetitionStore>> {
    use std::time::Duration;

    use raclette_back::dao::competition_store::couchdb::{CouchCompetitionStore, CouchConfig};
    use tokio::time::sleep;
    use tracing::warn;

    let config = CouchConfig::from_env().context("reading CouchDB settings")?;
    let initial_delay = Duration::from_millis(1000);
    let max_delay = Duration::from_secs(10);
    let mut delay = initial_delay;

    loop {
        match CouchCompetitionStore::connect(config.clone()).await {
            Ok(store) => {
                info!(
                    base_url = %config.base_url,
                    database = %config.database,
                    "connected to CouchDB"
                );
                return Ok(Arc::new(store));
            }
            Err(err) => {
                // Could not reach CouchDB at all: wait and retry with
                // exponential backoff.
                warn!(
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "CouchDB connection attempt failed"
                );
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

#[cfg(not(feature = "couch-store"))]
async fn connect_couch() -> anyhow::Result<Arc<dyn CompetitionStore>> {
    anyhow::bail!("this build has no CouchDB support; enable the `couch-store` feature")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
