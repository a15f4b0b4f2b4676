//! Part graph of the server binary.

use std::sync::Arc;

use partkit::{application_part, AnyPart, Application, Part};
use partkit_bootstrap::{part_config, AppConfig, AppConfigProvider, ConfigProvider, StoreKind};
use partkit_server::{
    resource_part, resource_server_part, OperationError, Resource, ResourceDef,
};
use partkit_store::{memory_store_part, sql_store_part, Field, SharedStore};
use rpc_ingress::{rpc_ingress_part, RpcIngress, RpcIngressConfig};
use serde::Deserialize;

pub const INGRESS_PART: &str = "rpc_ingress";
pub const PEOPLE_PART: &str = "people";

/// `parts.people` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeopleConfig {
    /// When set, every call must carry `authorization` equal to this value.
    pub secret: Option<String>,
}

pub fn people_def() -> ResourceDef {
    ResourceDef::new(PEOPLE_PART)
        .field("name", Field::string().length(80))
        .field("age", Field::integer().size(32).nullable())
        .field("email", Field::string().unique().nullable())
}

fn store_part(config: &AppConfig, app: &Part<Application>) -> anyhow::Result<Part<SharedStore>> {
    Ok(match config.store.kind {
        StoreKind::Memory => memory_store_part("store"),
        StoreKind::Sqlite => {
            let dsn = config.store.resolved_dsn(&config.home_dir())?;
            sql_store_part("store", app, dsn)
        }
    })
}

fn ingress_config(config: &AppConfig, provider: &dyn ConfigProvider) -> anyhow::Result<RpcIngressConfig> {
    let mut ingress: RpcIngressConfig = part_config(provider, INGRESS_PART)?;
    // server.host/port apply unless the part pins its own address
    let pinned = provider
        .get_part_config(INGRESS_PART)
        .and_then(|raw| raw.get("bind_addr"))
        .is_some();
    if !pinned {
        ingress.bind_addr = config.bind_addr();
    }
    Ok(ingress)
}

/// Guard every people operation with the configured secret.
fn people_auth_part(people: &Part<Resource>, secret: String) -> Part<()> {
    let people = people.clone();
    Part::new("people-auth", [people.dep()], move |deps| {
        let people = people.clone();
        let secret = secret.clone();
        async move {
            let resource = deps.get(&people)?;
            resource.before_each("authorize", move |req| {
                let granted = req.str("authorization") == Some(secret.as_str());
                async move {
                    if granted {
                        Ok(req)
                    } else {
                        Err(OperationError::Unauthorized("bad or missing token".into()).into())
                    }
                }
            });
            Ok(())
        }
    })
}

/// The server's parts, with typed handles to the ones callers look up.
pub struct ServerParts {
    pub app: Part<Application>,
    pub ingress: Part<Arc<RpcIngress>>,
    pub people: Part<Resource>,
    pub all: Vec<AnyPart>,
}

pub fn build_parts(config: &AppConfig) -> anyhow::Result<ServerParts> {
    let provider = AppConfigProvider::new(config.clone());

    let app = application_part("partkit-server");
    let store = store_part(config, &app)?;
    let server = resource_server_part("resource-server", &app);
    let ingress = rpc_ingress_part(
        INGRESS_PART,
        &app,
        &server,
        ingress_config(config, &provider)?,
    );

    let people_cfg: PeopleConfig = part_config(&provider, PEOPLE_PART)?;
    let mut def = people_def();
    if people_cfg.secret.is_some() {
        def = def.require_authorization();
    }
    let people = resource_part(def, &store, &server);

    let mut all = vec![
        app.erase(),
        store.erase(),
        server.erase(),
        ingress.erase(),
        people.erase(),
    ];
    if let Some(secret) = people_cfg.secret {
        all.push(people_auth_part(&people, secret).erase());
    }
    tracing::debug!(count = all.len(), "part graph assembled");
    Ok(ServerParts {
        app,
        ingress,
        people,
        all,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use partkit::Resolver;
    use partkit_server::{Operation, Response};
    use serde_json::json;

    fn test_config(parts: serde_json::Value) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.port = 0;
        if let serde_json::Value::Object(map) = parts {
            config.parts = map.into_iter().collect();
        }
        config
    }

    #[test]
    fn ingress_follows_server_address_unless_pinned() {
        let config = test_config(json!({}));
        let provider = AppConfigProvider::new(config.clone());
        assert_eq!(ingress_config(&config, &provider).unwrap().bind_addr, "127.0.0.1:0");

        let config = test_config(json!({"rpc_ingress": {"bind_addr": "0.0.0.0:7000"}}));
        let provider = AppConfigProvider::new(config.clone());
        assert_eq!(ingress_config(&config, &provider).unwrap().bind_addr, "0.0.0.0:7000");
    }

    #[test]
    fn unknown_people_keys_are_rejected() {
        let config = test_config(json!({"people": {"secert": "x"}}));
        assert!(build_parts(&config).is_err());
    }

    #[tokio::test]
    async fn server_graph_starts_and_serves_people() {
        let graph = build_parts(&test_config(json!({}))).unwrap();
        assert_eq!(graph.all.len(), 5);

        let outputs = Resolver::new(graph.all.clone()).resolve().await.unwrap();
        let application = outputs.get(&graph.app).unwrap();
        let ingress = outputs.get(&graph.ingress).unwrap();
        assert!(ingress.local_addr().is_none());

        application.start().await.unwrap();
        assert!(ingress.local_addr().is_some());
        assert_eq!(ingress.endpoint_names(), vec![PEOPLE_PART]);
        application.shutdown();
    }

    #[tokio::test]
    async fn people_hook_checks_the_secret() {
        let config = test_config(json!({"people": {"secret": "s3cret"}}));
        let graph = build_parts(&config).unwrap();
        assert_eq!(graph.all.len(), 6);
        let outputs = Resolver::new(graph.all.clone()).resolve().await.unwrap();

        let people = outputs.get(&graph.people).unwrap();
        let Some(Operation::Query(count)) = people.operation("count") else {
            panic!("count is a query");
        };

        let denied = count.invoke(json!({"authorization": "nope"})).await;
        let err = denied.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OperationError>(),
            Some(OperationError::Unauthorized(_))
        ));

        let allowed = count.invoke(json!({"authorization": "s3cret"})).await.unwrap();
        assert_eq!(allowed, Response::ok(json!(0)));
    }
}
