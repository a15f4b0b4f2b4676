//! CRUD resources: a collection plus an endpoint whose operations are typed
//! from the collection's fields.
//!
//! | operation | kind     | input                                  | output          |
//! |-----------|----------|----------------------------------------|-----------------|
//! | `create`  | mutation | `{data}`                               | document        |
//! | `update`  | mutation | `{id, data}`                           | document        |
//! | `delete`  | mutation | `{id}`                                 | `{id}`          |
//! | `get`     | query    | `{id}`                                 | document        |
//! | `find`    | query    | `{where?, order?, limit?, offset?}`    | `[document]`    |
//! | `count`   | query    | `{where?}`                             | integer         |
//!
//! Lookups by `id` that miss answer `Response::Error("Not found")`; store
//! errors are reported as `Response::Error` with their message. With
//! `require_authorization` every input requires an `authorization` string;
//! checking it is left to `before` hooks on the operations.

use std::sync::Arc;

use futures::future::BoxFuture;
use partkit::{Part, PartKey};
use partkit_store::{
    find_by_id, values_from_json, values_to_json, Collection, CollectionDef, DocumentRef,
    DocumentStore, Field, FieldMap, FindOptions, SharedStore, SortingRule, StoreError, Where,
};
use serde_json::{json, Value as Json};

use crate::endpoint::Endpoint;
use crate::operation::{create_mutation, create_query, Operation, Request, Response};
use crate::schemas;
use crate::server::ResourceServer;

pub const NOT_FOUND: &str = "Not found";

#[derive(Clone, Debug)]
pub struct ResourceDef {
    pub name: String,
    pub fields: FieldMap,
    pub require_authorization: bool,
}

impl ResourceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: FieldMap::new(),
            require_authorization: false,
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn require_authorization(mut self) -> Self {
        self.require_authorization = true;
        self
    }
}

#[derive(Clone)]
pub struct Resource {
    pub collection: Arc<dyn Collection>,
    pub endpoint: Arc<Endpoint>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("collection", &self.collection.name())
            .field("endpoint", &self.endpoint.name())
            .finish()
    }
}

impl Resource {
    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.endpoint.operation(name)
    }

    /// Attach the same `before` hook to every operation of the resource.
    pub fn before_each<F, Fut>(&self, name: &str, hook: F)
    where
        F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Request>> + Send + 'static,
    {
        for operation in self.endpoint.operations() {
            operation.before_fn(name, hook.clone());
        }
    }
}

/// Declare the collection, then register its endpoint on `server`.
pub async fn create_resource(
    store: &dyn DocumentStore,
    server: &ResourceServer,
    def: ResourceDef,
) -> anyhow::Result<Resource> {
    let collection = store
        .create_collection(CollectionDef {
            name: def.name.clone(),
            fields: def.fields.clone(),
        })
        .await?;

    let endpoint = Arc::new(Endpoint::new(def.name.clone()));
    for operation in operations(&collection, &def) {
        endpoint.add(operation);
    }
    server.add_endpoint(Arc::clone(&endpoint));
    tracing::info!(
        resource = %def.name,
        fields = def.fields.len(),
        authorization = def.require_authorization,
        "resource registered"
    );

    Ok(Resource {
        collection,
        endpoint,
    })
}

/// Part wrapper of [`create_resource`].
pub fn resource_part(
    def: ResourceDef,
    store: &impl PartKey<SharedStore>,
    server: &impl PartKey<ResourceServer>,
) -> Part<Resource> {
    let store = store.token().clone();
    let server = server.token().clone();
    Part::new(def.name.clone(), [store.dep(), server.dep()], move |deps| {
        let (store, server, def) = (store.clone(), server.clone(), def.clone());
        async move {
            let store = deps.get(&store)?;
            let server = deps.get(&server)?;
            create_resource(&**store, &server, def).await
        }
    })
}

fn operations(collection: &Arc<dyn Collection>, def: &ResourceDef) -> Vec<Operation> {
    let fields = &def.fields;
    let guard = |schema: Json| {
        if def.require_authorization {
            schemas::with_authorization(schema)
        } else {
            schema
        }
    };
    let document = schemas::document_schema(fields);

    vec![
        create_mutation(
            "create",
            guard(schemas::input(vec![("data", schemas::data_schema(fields, false))])),
            document.clone(),
            handler(collection, create),
        ),
        create_mutation(
            "update",
            guard(schemas::input(vec![
                ("id", schemas::id_schema()),
                ("data", schemas::data_schema(fields, true)),
            ])),
            document.clone(),
            handler(collection, update),
        ),
        create_mutation(
            "delete",
            guard(schemas::input(vec![("id", schemas::id_schema())])),
            schemas::input(vec![("id", schemas::id_schema())]),
            handler(collection, delete),
        ),
        create_query(
            "get",
            guard(schemas::input(vec![("id", schemas::id_schema())])),
            document.clone(),
            handler(collection, get),
        ),
        create_query(
            "find",
            guard(schemas::find_input(fields)),
            json!({"type": "array", "items": document}),
            handler(collection, find),
        ),
        create_query(
            "count",
            guard(schemas::count_input(fields)),
            json!({"type": "integer", "minimum": 0}),
            handler(collection, count),
        ),
    ]
}

type Outcome = Result<Json, Failure>;

/// Why an operation could not produce data; both become `Response::Error`.
enum Failure {
    NotFound,
    Store(String),
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Failure::NotFound,
            other => Failure::Store(other.to_string()),
        }
    }
}

impl From<partkit_store::ValidationError> for Failure {
    fn from(err: partkit_store::ValidationError) -> Self {
        Failure::Store(err.to_string())
    }
}

impl From<partkit_store::FilterError> for Failure {
    fn from(err: partkit_store::FilterError) -> Self {
        Failure::Store(err.to_string())
    }
}

fn handler<F, Fut>(
    collection: &Arc<dyn Collection>,
    op: F,
) -> impl Fn(Request) -> BoxFuture<'static, anyhow::Result<Response>> + Send + Sync + 'static
where
    F: Fn(Arc<dyn Collection>, Json) -> Fut + Copy + Send + Sync + 'static,
    Fut: std::future::Future<Output = Outcome> + Send + 'static,
{
    let collection = Arc::clone(collection);
    move |request: Request| -> BoxFuture<'static, anyhow::Result<Response>> {
        let collection = Arc::clone(&collection);
        Box::pin(async move {
            let response = match op(collection, request.input).await {
                Ok(data) => Response::Ok(data),
                Err(Failure::NotFound) => Response::error(NOT_FOUND),
                Err(Failure::Store(message)) => {
                    tracing::debug!(error = %message, "operation failed");
                    Response::Error(Json::String(message))
                }
            };
            Ok(response)
        })
    }
}

fn id_of(input: &Json) -> String {
    input
        .get("id")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn lookup(collection: &dyn Collection, input: &Json) -> Result<DocumentRef, Failure> {
    find_by_id(collection, &id_of(input))
        .await?
        .ok_or(Failure::NotFound)
}

async fn create(collection: Arc<dyn Collection>, input: Json) -> Outcome {
    let values = values_from_json(&collection.fields(), &input["data"])?;
    let doc = collection.create(values).await?;
    Ok(values_to_json(&doc.get().await?))
}

async fn update(collection: Arc<dyn Collection>, input: Json) -> Outcome {
    let doc = lookup(collection.as_ref(), &input).await?;
    let values = values_from_json(&collection.fields(), &input["data"])?;
    doc.update(values).await?;
    Ok(values_to_json(&doc.get().await?))
}

async fn delete(collection: Arc<dyn Collection>, input: Json) -> Outcome {
    let doc = lookup(collection.as_ref(), &input).await?;
    doc.delete().await?;
    Ok(json!({ "id": doc.id() }))
}

async fn get(collection: Arc<dyn Collection>, input: Json) -> Outcome {
    let doc = lookup(collection.as_ref(), &input).await?;
    Ok(values_to_json(&doc.get().await?))
}

fn filter_of(collection: &dyn Collection, input: &Json) -> Result<Option<Where>, Failure> {
    match input.get("where") {
        None | Some(Json::Null) => Ok(None),
        Some(w) => Ok(Some(Where::from_json(&collection.fields(), w)?)),
    }
}

async fn find(collection: Arc<dyn Collection>, input: Json) -> Outcome {
    let mut options = FindOptions::new();
    options.filter = filter_of(collection.as_ref(), &input)?;
    if let Some(order) = input.get("order") {
        options.order = SortingRule::list_from_json(&collection.fields(), order)?;
    }
    options.limit = input.get("limit").and_then(Json::as_u64);
    options.offset = input.get("offset").and_then(Json::as_u64);

    let mut documents = Vec::new();
    for doc in collection.find(options).await? {
        match doc.get().await {
            Ok(values) => documents.push(values_to_json(&values)),
            // deleted between find and read
            Err(StoreError::NotFound { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(Json::Array(documents))
}

async fn count(collection: Arc<dyn Collection>, input: Json) -> Outcome {
    let filter = filter_of(collection.as_ref(), &input)?;
    Ok(json!(collection.count(filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use partkit_store::{MemoryStore, ValueSchema};

    async fn people(require_authorization: bool) -> Resource {
        let mut def = ResourceDef::new("people")
            .field("name", Field::string())
            .field("age", Field::integer().nullable());
        if require_authorization {
            def = def.require_authorization();
        }
        create_resource(&MemoryStore::new(), &ResourceServer::new(), def)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn generates_every_operation() {
        let resource = people(false).await;
        let names: Vec<(String, &str)> = resource
            .endpoint
            .operations()
            .iter()
            .map(|o| (o.name().to_string(), o.kind().as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("create".to_string(), "mutation"),
                ("update".to_string(), "mutation"),
                ("delete".to_string(), "mutation"),
                ("get".to_string(), "query"),
                ("find".to_string(), "query"),
                ("count".to_string(), "query"),
            ]
        );
    }

    #[tokio::test]
    async fn authorization_is_required_by_every_input() {
        let resource = people(true).await;
        for op in resource.endpoint.operations() {
            let required = op.input_schema().to_json_schema()["required"].clone();
            assert!(
                required.as_array().unwrap().contains(&json!("authorization")),
                "{}",
                op.name()
            );
        }
        let open = people(false).await;
        let schema = open.operation("count").unwrap().input_schema().to_json_schema();
        assert!(schema["properties"].get("authorization").is_none());
    }
}
