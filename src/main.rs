use anyhow::Context;
use logbatch::api::{ingest_router, query_router, IngestState, QueryState};
use logbatch::backend::{open_stores, parse_dsn};
use logbatch::batcher::Batcher;
use logbatch::config::ServerConfig;
use logbatch::init::init_tracing;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;
    init_tracing(&config.log).context("failed to install tracing subscriber")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        http_addr = %config.http_addr,
        ingest_addr = %config.ingest_addr,
        flush_size = config.batcher.flush_size,
        flush_interval_ms = config.batcher.flush_interval.as_millis() as u64,
        queue_capacity = config.batcher.queue_capacity(),
        delivery = ?config.batcher.delivery,
        "starting logbatch-server"
    );

    let backend = parse_dsn(&config.database_url).context("invalid DATABASE_URL")?;
    let stores = open_stores(&backend, config.retention_days)
        .await
        .context("failed to open storage")?;
    tracing::info!(backend = ?backend.kind, "storage ready");

    let (batcher, handle) = Batcher::new(stores.writer, config.batcher.clone());
    let batcher_task = tokio::spawn(batcher.run(CancellationToken::new()));

    let ingest_listener = bind(&config.ingest_addr).await?;
    let query_listener = bind(&config.http_addr).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let signal = shutdown_signal().await;
            tracing::info!(signal, "shutdown signal received");
            shutdown.cancel();
        }
    });

    let ingest = axum::serve(ingest_listener, ingest_router(IngestState::new(handle.clone())))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let query = axum::serve(query_listener, query_router(QueryState::new(stores.reader)))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let served = tokio::try_join!(
        async { ingest.await.context("ingestion listener failed") },
        async { query.await.context("query listener failed") },
    );

    // Listeners are down, so nothing submits any more; drain what is queued.
    handle.close().await;
    let stats = batcher_task.await.context("batcher task panicked")?;

    tracing::info!(
        submitted = stats.submitted,
        written = stats.written_records,
        failed = stats.failed_records,
        lost = stats.lost_records,
        "shutdown complete"
    );
    served.map(|_| ())
}

async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr().context("listener has no local address")?;
    tracing::info!(addr, %local, "listening");
    Ok(listener)
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}
