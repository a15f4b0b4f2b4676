use std::sync::Arc;

use partkit::{Application, Part, PartKey};
use partkit_server::ResourceServer;

use crate::{RpcIngress, RpcIngressConfig};

/// HTTP ingress part. Registers itself as an adapter of `server`, so it binds
/// when the server starts and stops with the application.
pub fn rpc_ingress_part(
    name: impl Into<String>,
    app: &impl PartKey<Application>,
    server: &impl PartKey<ResourceServer>,
    config: RpcIngressConfig,
) -> Part<Arc<RpcIngress>> {
    let app = app.token().clone();
    let server = server.token().clone();
    Part::new(name, [app.dep(), server.dep()], move |deps| {
        let app = app.clone();
        let server = server.clone();
        let config = config.clone();
        async move {
            let application = deps.get(&app)?;
            let server = deps.get(&server)?;
            let ingress = Arc::new(RpcIngress::new(config, application.cancellation_token()));
            server.create_adapter(ingress.clone()).await?;
            Ok(ingress)
        }
    })
}
