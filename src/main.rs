use std::sync::Arc;
use std::time::Duration;

use courier_dispatch::api;
use courier_dispatch::config::Config;
use courier_dispatch::engine::effects::{run_effect_worker, EffectWorker};
use courier_dispatch::error::DispatchError;
use courier_dispatch::service::DispatchService;
use courier_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let collaborator_timeout = Duration::from_millis(config.collaborator_timeout_ms);
    let http_port = config.http_port;

    let (app_state, effect_rx) = AppState::new(config);
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_effect_worker(
        EffectWorker {
            notifier: shared_state.notifier.clone(),
            back_office: shared_state.back_office.clone(),
            metrics: shared_state.metrics.clone(),
            collaborator_timeout,
        },
        effect_rx,
    ));

    let service = DispatchService::new(shared_state);
    let app = api::rest::router(service);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| DispatchError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| DispatchError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
