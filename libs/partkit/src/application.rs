//! The composition root: a part whose output exposes the startup triggers.

use tokio_util::sync::CancellationToken;

use crate::part::Part;
use crate::trigger::Trigger;

/// Output of the application part.
///
/// Persistence adapters listen on [`on_connect`](Self::on_connect); resource
/// servers and wire adapters listen on [`on_start`](Self::on_start). Adapters
/// that keep running (HTTP servers) stop when the cancellation token fires.
#[derive(Debug)]
pub struct Application {
    name: String,
    connect: Trigger<()>,
    start: Trigger<()>,
    cancel: CancellationToken,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            connect: Trigger::new(format!("{name}.connect")),
            start: Trigger::new(format!("{name}.start")),
            cancel: CancellationToken::new(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on_connect(&self) -> &Trigger<()> {
        &self.connect
    }

    pub fn on_start(&self) -> &Trigger<()> {
        &self.start
    }

    /// Fire `connect`, then `start`.
    pub async fn start(&self) -> anyhow::Result<()> {
        tracing::info!(application = %self.name, "Phase: connect");
        self.connect.fire(()).await?;
        tracing::info!(application = %self.name, "Phase: start");
        self.start.fire(()).await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Declare the application part. It has no dependencies; every part that
/// needs the startup triggers depends on it.
pub fn application_part(name: impl Into<String>) -> Part<Application> {
    let name = name.into();
    let app_name = name.clone();
    Part::new(name, [], move |_| {
        let app_name = app_name.clone();
        async move { Ok(Application::new(app_name)) }
    })
}
