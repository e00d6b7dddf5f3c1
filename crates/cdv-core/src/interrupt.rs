//! Ctrl-C while a turn is in flight.
//!
//! Children run in their own process group, so the terminal's SIGINT only
//! reaches codriver. Anything long-running awaits these helpers and unwinds
//! itself (killing its process group first) instead of dying with the
//! default signal action.

use std::future::Future;

/// Resolves on the next Ctrl-C. Never resolves if the handler cannot be
/// installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for interrupt");
        futures::future::pending::<()>().await;
    }
}

/// Run `work` to completion, or return `None` if Ctrl-C arrives first.
/// `work` is dropped on interrupt.
pub async fn or_interrupt<F: Future>(work: F) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        () = ctrl_c() => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_work_is_returned() {
        assert_eq!(or_interrupt(async { 7 }).await, Some(7));
    }
}
