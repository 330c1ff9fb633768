use std::net::SocketAddr;
use std::time::{Duration, Instant};

use paper_assist::{app, build_state, AppConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG; defaults to info.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    let state = build_state(&config)?;

    // Expired rate-limit windows are dropped in the background so idle
    // clients do not pin memory until the store fills up.
    let limiter = state.limiter.clone();
    let sweep_every = Duration::from_secs(config.rate_limit_sweep_secs);
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep(Instant::now());
            if removed > 0 {
                tracing::debug!(removed, remaining = limiter.len(), "rate limit sweep");
            }
        }
    });

    let app = app(state);
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
