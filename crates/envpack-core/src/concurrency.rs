use envpack_runtime::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C to `cancel`. The first signal cancels the running job so it
/// can clean up; a second one exits immediately.
pub fn install_signal_handler(cancel: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        cancel.cancel();
        eprintln!("\ncancellation requested, cleaning up (press Ctrl-C again to force)...");
    });
    if let Err(e) = result {
        tracing::debug!("signal handler not installed: {e}");
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_shutdown_without_signal() {
        install_signal_handler(CancelToken::new());
        assert!(!shutdown_requested());
    }
}
