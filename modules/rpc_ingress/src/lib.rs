//! HTTP adapter for the resource server.
//!
//! Queries answer `GET`, mutations answer `POST`, subscriptions stream as
//! server-sent events. Endpoints are looked up per request, so endpoints
//! and operations registered after the listener is up are served as well.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use partkit_server::{Adapter, Endpoint};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub mod config;
mod error;
mod parts;
mod web;

pub use config::RpcIngressConfig;
pub use parts::rpc_ingress_part;

const REQUEST_ID_HEADER: &str = "x-request-id";
const ADAPTER_NAME: &str = "rpc_ingress";

pub struct RpcIngress {
    config: Arc<RpcIngressConfig>,
    routes: Arc<web::Routes>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RpcIngress {
    /// `cancel` stops the listener and closes open subscription streams.
    pub fn new(config: RpcIngressConfig, cancel: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            routes: Arc::new(web::Routes {
                endpoints: Default::default(),
                cancel,
            }),
            local_addr: Mutex::new(None),
        }
    }

    pub fn config(&self) -> Arc<RpcIngressConfig> {
        Arc::clone(&self.config)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .routes
            .endpoints
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Router with the full middleware stack.
    pub fn router(&self) -> Router {
        let config = self.config();

        let procedures = Router::new()
            .route(
                "/{endpoint}/{operation}",
                get(web::get_operation).post(web::post_operation),
            )
            .with_state(Arc::clone(&self.routes));

        let mut router = Router::new().route("/health", get(web::health_check));
        router = match config.mount_point() {
            Some(prefix) => router.nest(&prefix, procedures),
            None => router.merge(procedures),
        };

        // outermost last: request id, trace, timeout, body limit, cors
        if config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }
        let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
        router
            .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_secs,
            )))
            .layer(
                TraceLayer::new_for_http().make_span_with(
                    |req: &axum::http::Request<axum::body::Body>| {
                        let rid = req
                            .headers()
                            .get(REQUEST_ID_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("n/a");
                        tracing::info_span!(
                            "rpc_request",
                            method = %req.method(),
                            path = %req.uri().path(),
                            request_id = %rid,
                        )
                    },
                ),
            )
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(PropagateRequestIdLayer::new(x_request_id))
    }
}

#[async_trait]
impl Adapter for RpcIngress {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn add_endpoint(&self, endpoint: Arc<Endpoint>) {
        tracing::debug!(endpoint = %endpoint.name(), "endpoint exposed over HTTP");
        self.routes
            .endpoints
            .insert(endpoint.name().to_string(), endpoint);
    }

    /// Bind, then serve in the background until cancelled.
    async fn start(&self) -> anyhow::Result<()> {
        let config = self.config();
        let addr: SocketAddr = config
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", config.bind_addr))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let bound = listener.local_addr()?;
        *self.local_addr.lock() = Some(bound);
        tracing::info!(%bound, prefix = %config.path_prefix, "HTTP server bound");

        let router = self.router();
        let cancel = self.routes.cancel.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                cancel.cancelled().await;
                tracing::info!("HTTP server shutting down gracefully (cancellation)");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "HTTP server terminated");
            }
        });
        Ok(())
    }
}
