//! OS signals that stop a running application.

use std::fmt;

use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C / SIGINT.
    Interrupt,
    /// SIGTERM (unix only).
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        })
    }
}

/// Resolve with the first stop signal received.
///
/// Handlers are installed before waiting, so a platform that refuses one
/// reports it immediately instead of never stopping.
pub async fn next_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use signal::unix::{signal as unix_signal, SignalKind};
        let mut terminate = unix_signal(SignalKind::terminate())?;
        let mut interrupt = unix_signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
            _ = interrupt.recv() => Ok(ShutdownSignal::Interrupt),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

/// Cancel `token` on the first stop signal. Returns early, without
/// cancelling, when the token is cancelled by someone else.
pub async fn cancel_on_signal(token: CancellationToken) {
    let received = tokio::select! {
        _ = token.cancelled() => return,
        received = next_signal() => received,
    };
    match received {
        Ok(sig) => tracing::info!(signal = %sig, "stopping application"),
        Err(e) => {
            // keep Ctrl+C working even when the full handler set is unavailable
            tracing::warn!(error = %e, "signal handlers unavailable; waiting for Ctrl+C only");
            tokio::select! {
                _ = token.cancelled() => return,
                _ = signal::ctrl_c() => tracing::info!(signal = %ShutdownSignal::Interrupt, "stopping application"),
            }
        }
    }
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn signals_print_their_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn no_signal_no_cancel() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn(cancel_on_signal(token.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!token.is_cancelled());
        assert!(!waiter.is_finished());
        waiter.abort();
    }

    #[tokio::test]
    async fn external_cancel_releases_the_waiter() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn(cancel_on_signal(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
