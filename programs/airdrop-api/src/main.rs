use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use airdrop_api::config::Config;
use airdrop_api::store::{AirdropStore, MemoryStore, PgStore};
use airdrop_api::{router, AppState};

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("airdrop_api=info,tower_http=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let addr = config.bind_addr();

    let (store, pg): (Arc<dyn AirdropStore>, Option<PgStore>) = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url, &config)
                .await
                .context("failed to connect to postgres")?;
            pg.init_schema().await.context("failed to initialise schema")?;
            (Arc::new(pg.clone()), Some(pg))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let state = AppState::new(store, config);
    let limiter = state.limiter.clone();
    let pruner = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });

    let app = router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "airdrop api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    pruner.abort();
    if let Some(pg) = pg {
        pg.close().await;
    }
    info!("airdrop api stopped");
    Ok(())
}
