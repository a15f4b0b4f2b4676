//! Resource server: owns the endpoint and adapter lists of one application.
//!
//! Nothing here is process-global, so several applications can run side by
//! side. `start` pushes every endpoint into every adapter and then starts the
//! adapters; anything registered afterwards is propagated immediately.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use partkit::{Application, Part, PartKey, Registry};

use crate::endpoint::Endpoint;

/// Transport binding for endpoints (HTTP, RPC frameworks, test harnesses).
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Expose an endpoint. May be called before and after `start`.
    fn add_endpoint(&self, endpoint: Arc<Endpoint>);

    /// Bind the transport. Long-running servers should spawn and return.
    async fn start(&self) -> anyhow::Result<()>;
}

pub type SharedAdapter = Arc<dyn Adapter>;

#[derive(Default)]
struct Inner {
    endpoints: Registry<Arc<Endpoint>>,
    adapters: Registry<SharedAdapter>,
    // held while registering so a registration never races `start`
    started: Mutex<bool>,
}

#[derive(Clone, Default)]
pub struct ResourceServer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResourceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceServer")
            .field("endpoints", &self.inner.endpoints.len())
            .field("adapters", &self.inner.adapters.len())
            .field("started", &self.is_started())
            .finish()
    }
}

impl ResourceServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        *self.inner.started.lock()
    }

    pub fn create_endpoint(&self, name: impl Into<String>) -> Arc<Endpoint> {
        let endpoint = Arc::new(Endpoint::new(name));
        self.add_endpoint(Arc::clone(&endpoint));
        endpoint
    }

    pub fn add_endpoint(&self, endpoint: Arc<Endpoint>) {
        let started = self.inner.started.lock();
        tracing::debug!(endpoint = %endpoint.name(), late = *started, "registering endpoint");
        self.inner.endpoints.register(Arc::clone(&endpoint));
        if *started {
            for adapter in self.inner.adapters.snapshot() {
                adapter.add_endpoint(Arc::clone(&endpoint));
            }
        }
    }

    /// Register an adapter. After `start` it receives every endpoint and is
    /// started right away.
    pub async fn create_adapter(&self, adapter: SharedAdapter) -> anyhow::Result<()> {
        let late = {
            let started = self.inner.started.lock();
            tracing::debug!(adapter = %adapter.name(), late = *started, "registering adapter");
            self.inner.adapters.register(Arc::clone(&adapter));
            if *started {
                for endpoint in self.inner.endpoints.snapshot() {
                    adapter.add_endpoint(endpoint);
                }
            }
            *started
        };
        if late {
            adapter.start().await?;
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.inner.endpoints.snapshot()
    }

    pub fn adapters(&self) -> Vec<SharedAdapter> {
        self.inner.adapters.snapshot()
    }

    /// Push every endpoint into every adapter, then start the adapters in
    /// registration order. A second call is a no-op.
    pub async fn start(&self) -> anyhow::Result<()> {
        let adapters = {
            let mut started = self.inner.started.lock();
            if *started {
                return Ok(());
            }
            *started = true;
            let endpoints = self.inner.endpoints.snapshot();
            let adapters = self.inner.adapters.snapshot();
            for adapter in &adapters {
                for endpoint in &endpoints {
                    adapter.add_endpoint(Arc::clone(endpoint));
                }
            }
            adapters
        };

        for adapter in adapters {
            tracing::info!(adapter = %adapter.name(), "starting adapter");
            adapter.start().await?;
        }
        Ok(())
    }
}

/// Resource server part; starts the server when the application fires `start`.
pub fn resource_server_part(
    name: impl Into<String>,
    app: &impl PartKey<Application>,
) -> Part<ResourceServer> {
    let app = app.token().clone();
    Part::new(name, [app.dep()], move |deps| {
        let app = app.clone();
        async move {
            let application = deps.get(&app)?;
            let server = ResourceServer::new();
            let starting = server.clone();
            application.on_start().on_fn("resource-server", move |_| {
                let server = starting.clone();
                async move { server.start().await }
            });
            Ok(server)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        starts: Mutex<u32>,
    }

    #[async_trait]
    impl Adapter for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn add_endpoint(&self, endpoint: Arc<Endpoint>) {
            self.seen.lock().push(endpoint.name().to_string());
        }

        async fn start(&self) -> anyhow::Result<()> {
            *self.starts.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_pushes_endpoints_then_starts_adapters() {
        let server = ResourceServer::new();
        let adapter = Arc::new(Recorder::default());
        server.create_endpoint("a");
        server.create_adapter(adapter.clone()).await.unwrap();
        server.create_endpoint("b");
        assert!(adapter.seen.lock().is_empty());

        server.start().await.unwrap();
        server.start().await.unwrap();
        assert_eq!(*adapter.seen.lock(), vec!["a", "b"]);
        assert_eq!(*adapter.starts.lock(), 1);
    }

    #[tokio::test]
    async fn late_registrations_propagate() {
        let server = ResourceServer::new();
        let early = Arc::new(Recorder::default());
        server.create_adapter(early.clone()).await.unwrap();
        server.create_endpoint("a");
        server.start().await.unwrap();

        server.create_endpoint("late");
        assert_eq!(*early.seen.lock(), vec!["a", "late"]);

        let late = Arc::new(Recorder::default());
        server.create_adapter(late.clone()).await.unwrap();
        assert_eq!(*late.seen.lock(), vec!["a", "late"]);
        assert_eq!(*late.starts.lock(), 1);
    }

    #[tokio::test]
    async fn servers_are_independent() {
        let one = ResourceServer::new();
        let two = ResourceServer::new();
        one.create_endpoint("only-here");
        assert_eq!(one.endpoints().len(), 1);
        assert!(two.endpoints().is_empty());
    }
}
