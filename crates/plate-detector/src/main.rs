use anyhow::{Context, Result};
use plate_detector::{api, PlateDetector, PlateServiceState, ServiceConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _logging = telemetry::init_with_service("plate-detector");

    info!("Starting plate detector service...");

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;
    info!(
        bind = %config.bind_addr,
        input_size = config.detector.input_size,
        backends = ?config.detector.backends,
        "Plate detector configuration"
    );

    let detector = PlateDetector::from_config(&config.detector);
    info!(
        candidates = detector.loader().candidates().len(),
        "Model candidate locations resolved"
    );
    let state = PlateServiceState::new(detector);

    if config.preload_model {
        let preload = state.clone();
        tokio::spawn(async move {
            // Failure is logged by preload; the first request retries
            let _ = preload.preload().await;
        });
    }

    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Plate detector listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Plate detector stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
