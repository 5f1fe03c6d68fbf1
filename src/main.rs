use std::process::ExitCode;

use bob_apiserver::lifecycle::{signals, startup};
use bob_apiserver::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    tracing::info!("bob-apiserver v{} starting", env!("CARGO_PKG_VERSION"));

    // A shutdown request during startup drops the startup future, abandoning
    // in-flight connection attempts and timers.
    let deployment = tokio::select! {
        result = startup::run() => match result {
            Ok(deployment) => deployment,
            // Already reported by the orchestrator.
            Err(_) => return ExitCode::FAILURE,
        },
        _ = signals::shutdown_signal() => {
            tracing::warn!("Shutdown requested during startup");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = deployment.shutdown_handle();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });

    match deployment.wait().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Service stopped with error");
            ExitCode::FAILURE
        }
    }
}
