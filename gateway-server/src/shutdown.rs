use std::error::Error;
use std::future;

/// Resolves once the process receives `SIGINT` or `SIGTERM`.
///
/// If a handler cannot be installed, the corresponding signal is never reported.
pub async fn signal() {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            gateway_log::error!(
                error = &error as &dyn Error,
                "failed to listen for SIGINT"
            );
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                gateway_log::error!(
                    error = &error as &dyn Error,
                    "failed to listen for SIGTERM"
                );
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        _ = interrupt => gateway_log::info!("SIGINT received, exiting"),
        _ = terminate => gateway_log::info!("SIGTERM received, draining requests"),
    }
}
