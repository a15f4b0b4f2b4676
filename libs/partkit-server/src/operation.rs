//! Operation kinds exposed by endpoints.
//!
//! An operation pairs input/output schemas with a hookable handler. Wire
//! adapters match exhaustively on [`Operation`] and call [`Procedure::invoke`]
//! or [`Subscription::subscribe`]; both validate around the handler chain.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use partkit::Function;
use partkit_store::{JsonSchema, ValueSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

/// Handler input. Hooks may rewrite it before the handler sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub input: Json,
}

impl Request {
    pub fn new(input: Json) -> Self {
        Self { input }
    }

    /// String member of the input object.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Json::as_str)
    }
}

/// Handler outcome, serialized as `{"type": "ok" | "error", "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Response {
    Ok(Json),
    Error(Json),
}

impl Response {
    pub fn ok(data: impl Into<Json>) -> Self {
        Self::Ok(data.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(Json::String(message.into()))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

/// Errors a hook may abort a handler chain with.
///
/// Anything else aborting a chain is treated as an internal failure by adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

pub type SharedSchema = Arc<dyn ValueSchema>;

/// Stream of events produced by a subscription.
pub type EventStream = BoxStream<'static, Response>;

/// Request/response operation: the payload of queries and mutations.
#[derive(Clone, Debug)]
pub struct Procedure {
    name: Arc<str>,
    input_schema: SharedSchema,
    output_schema: SharedSchema,
    handler: Function<Request, Response>,
}

impl Procedure {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        input_schema: impl ValueSchema + 'static,
        output_schema: impl ValueSchema + 'static,
        handler: F,
    ) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        let name: String = name.into();
        Self {
            handler: Function::new(name.clone(), handler),
            name: Arc::from(name),
            input_schema: Arc::new(input_schema),
            output_schema: Arc::new(output_schema),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_schema(&self) -> &SharedSchema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &SharedSchema {
        &self.output_schema
    }

    /// The hookable handler. Hooks attached here apply to every adapter.
    pub fn handler(&self) -> &Function<Request, Response> {
        &self.handler
    }

    /// Validate the input, run the handler chain and validate its output.
    ///
    /// Invalid input and invalid output both come back as
    /// [`Response::Error`]; only an aborted hook chain yields `Err`.
    pub async fn invoke(&self, input: Json) -> anyhow::Result<Response> {
        let outcome = self.input_schema.validate(&input);
        if !outcome.success {
            tracing::debug!(operation = %self.name, issues = %outcome.message(), "rejected input");
            return Ok(Response::error(outcome.message()));
        }

        let response = self.handler.call(Request::new(input)).await?;
        Ok(check_output(&self.name, &self.output_schema, response))
    }
}

fn check_output(name: &str, schema: &SharedSchema, response: Response) -> Response {
    let Response::Ok(data) = &response else {
        return response;
    };
    let outcome = schema.validate(data);
    if outcome.success {
        response
    } else {
        tracing::error!(operation = %name, issues = %outcome.message(), "handler produced invalid output");
        Response::error("invalid output")
    }
}

/// Streaming operation.
#[derive(Clone, Debug)]
pub struct Subscription {
    name: Arc<str>,
    input_schema: SharedSchema,
    output_schema: SharedSchema,
    handler: Function<Request, EventStream>,
}

impl Subscription {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        input_schema: impl ValueSchema + 'static,
        output_schema: impl ValueSchema + 'static,
        handler: F,
    ) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EventStream>> + Send + 'static,
    {
        let name: String = name.into();
        Self {
            handler: Function::new(name.clone(), handler),
            name: Arc::from(name),
            input_schema: Arc::new(input_schema),
            output_schema: Arc::new(output_schema),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_schema(&self) -> &SharedSchema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &SharedSchema {
        &self.output_schema
    }

    pub fn handler(&self) -> &Function<Request, EventStream> {
        &self.handler
    }

    /// Open the event stream. Invalid input yields a single error event;
    /// events failing the output schema are replaced by error events.
    pub async fn subscribe(&self, input: Json) -> anyhow::Result<EventStream> {
        let outcome = self.input_schema.validate(&input);
        if !outcome.success {
            return Ok(stream::once(async move { Response::error(outcome.message()) }).boxed());
        }

        let events = self.handler.call(Request::new(input)).await?;
        let name = Arc::clone(&self.name);
        let schema = Arc::clone(&self.output_schema);
        Ok(events
            .map(move |event| check_output(&name, &schema, event))
            .boxed())
    }
}

/// Tagged union of the operation kinds an endpoint can hold.
#[derive(Clone, Debug)]
pub enum Operation {
    Query(Procedure),
    Mutation(Procedure),
    Subscription(Subscription),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::Query(p) | Operation::Mutation(p) => p.name(),
            Operation::Subscription(s) => s.name(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Query(_) => OperationKind::Query,
            Operation::Mutation(_) => OperationKind::Mutation,
            Operation::Subscription(_) => OperationKind::Subscription,
        }
    }

    pub fn input_schema(&self) -> &SharedSchema {
        match self {
            Operation::Query(p) | Operation::Mutation(p) => p.input_schema(),
            Operation::Subscription(s) => s.input_schema(),
        }
    }

    pub fn output_schema(&self) -> &SharedSchema {
        match self {
            Operation::Query(p) | Operation::Mutation(p) => p.output_schema(),
            Operation::Subscription(s) => s.output_schema(),
        }
    }

    /// Attach a hook that sees (and may rewrite or reject) every request.
    pub fn before(&self, name: impl Into<String>, hook: Function<Request, Request>) -> &Self {
        match self {
            Operation::Query(p) | Operation::Mutation(p) => {
                p.handler().before(name, hook);
            }
            Operation::Subscription(s) => {
                s.handler().before(name, hook);
            }
        }
        self
    }

    /// Closure form of [`before`](Self::before).
    pub fn before_fn<F, Fut>(&self, name: impl Into<String>, f: F) -> &Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Request>> + Send + 'static,
    {
        let name = name.into();
        self.before(name.clone(), Function::new(name, f))
    }
}

pub fn create_query<F, Fut>(
    name: impl Into<String>,
    input_schema: impl Into<JsonSchema>,
    output_schema: impl Into<JsonSchema>,
    handler: F,
) -> Operation
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    Operation::Query(Procedure::new(
        name,
        input_schema.into(),
        output_schema.into(),
        handler,
    ))
}

pub fn create_mutation<F, Fut>(
    name: impl Into<String>,
    input_schema: impl Into<JsonSchema>,
    output_schema: impl Into<JsonSchema>,
    handler: F,
) -> Operation
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    Operation::Mutation(Procedure::new(
        name,
        input_schema.into(),
        output_schema.into(),
        handler,
    ))
}

pub fn create_subscription<F, Fut>(
    name: impl Into<String>,
    input_schema: impl Into<JsonSchema>,
    output_schema: impl Into<JsonSchema>,
    handler: F,
) -> Operation
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<EventStream>> + Send + 'static,
{
    Operation::Subscription(Subscription::new(
        name,
        input_schema.into(),
        output_schema.into(),
        handler,
    ))
}
