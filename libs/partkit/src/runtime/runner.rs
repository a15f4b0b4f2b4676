//! PartKit runner.
//!
//! Phase order: **resolve → connect → start → wait → cancel**.
//! Resolution errors are logged and returned untouched; the caller is expected
//! to exit. Shutdown can be driven by OS signals, an external
//! `CancellationToken`, or an arbitrary future.

use std::{future::Future, pin::Pin};

use tokio_util::sync::CancellationToken;

use crate::application::Application;
use crate::part::{AnyPart, PartKey};
use crate::resolver::resolve_application;
use crate::runtime::shutdown;

/// How the runner should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

pub struct RunOptions {
    pub shutdown: ShutdownOptions,
}

/// Full cycle: resolve every part, start the application, wait for shutdown.
pub async fn run(
    parts: Vec<AnyPart>,
    app: &impl PartKey<Application>,
    opts: RunOptions,
) -> anyhow::Result<()> {
    let application = match resolve_application(&parts, app).await {
        Ok(application) => application,
        Err(e) => {
            tracing::error!(error = %e, "part resolution failed; refusing to start");
            return Err(e.into());
        }
    };

    let cancel = application.cancellation_token();
    match opts.shutdown {
        ShutdownOptions::Signals => {
            tokio::spawn(shutdown::cancel_on_signal(cancel.clone()));
        }
        ShutdownOptions::Token(external) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                external.cancelled().await;
                tracing::info!("shutdown: external token cancelled");
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
    }

    if let Err(e) = application.start().await {
        tracing::error!(error = %e, "application start failed");
        application.shutdown();
        return Err(e);
    }

    tracing::info!(application = %application.name(), "application running");
    cancel.cancelled().await;
    tracing::info!(application = %application.name(), "application stopped");
    Ok(())
}
