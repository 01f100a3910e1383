//! Process shutdown: signal handling and the hard drain deadline.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::cache::CacheCoordinator;

/// Exit status when in-flight requests outlive the grace period.
pub const DRAIN_ABORTED_EXIT_CODE: i32 = 1;

/// Resolves on Ctrl-C or SIGTERM.
pub async fn signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Waits out the grace period, then closes the cache backend and returns the
/// exit status for an aborted drain.
pub async fn drain_deadline(grace: Duration, cache: CacheCoordinator) -> i32 {
    tokio::time::sleep(grace).await;
    warn!(
        grace_seconds = grace.as_secs(),
        "graceful shutdown deadline elapsed, closing cache and exiting"
    );
    cache.shutdown().await;
    DRAIN_ABORTED_EXIT_CODE
}

/// Signal future for `with_graceful_shutdown`. Once a signal arrives the
/// drain deadline is armed; it terminates the process if draining stalls.
pub async fn graceful(grace: Duration, cache: CacheCoordinator) {
    signal().await;

    info!(
        grace_seconds = grace.as_secs(),
        "shutdown requested, draining connections"
    );
    tokio::spawn(async move {
        let code = drain_deadline(grace, cache).await;
        std::process::exit(code);
    });
}
