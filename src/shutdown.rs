//! Cooperative shutdown helpers shared by the background loops

use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// True once shutdown has been requested
pub fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration` unless shutdown is signalled first
///
/// Returns true if the sleep completed, false if shutdown was requested.
/// A dropped sender counts as shutdown.
pub async fn interruptible_sleep(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if is_shutdown(shutdown) {
        return false;
    }

    tokio::select! {
        changed = shutdown.changed() => match changed {
            Ok(()) => {
                let stop = *shutdown.borrow();
                if stop {
                    debug!("Shutdown signal received during sleep");
                }
                !stop
            }
            Err(_) => false,
        },
        _ = tokio::time::sleep(duration) => true,
    }
}
