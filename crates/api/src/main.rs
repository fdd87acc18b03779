use std::sync::Arc;

use anyhow::Context;

use podqueue_api::app::{AppServices, build_app, services};
use podqueue_infra::AppConfig;
use podqueue_infra::workers::{WorkerPool, WorkerPoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    podqueue_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let broker = services::build_broker(&config.broker).context("failed to set up broker")?;

    let pool = if config.worker.workers > 0 {
        let executor = Arc::new(services::build_executor(&config.worker));
        let pool_config = WorkerPoolConfig {
            queue: config.queue.clone(),
            workers: config.worker.workers,
            ..Default::default()
        };
        Some(WorkerPool::spawn(broker.clone(), executor, pool_config))
    } else {
        tracing::info!("no workers configured; running submission endpoint only");
        None
    };

    let app = build_app(Arc::new(AppServices::new(broker, config.queue.clone())));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    if let Some(pool) = pool {
        pool.shutdown().await;
    }

    Ok(())
}
