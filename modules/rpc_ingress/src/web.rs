//! Request handlers.
//!
//! - `GET  {prefix}/{endpoint}/{operation}?input=<json>`: query, or subscription as SSE
//! - `POST {prefix}/{endpoint}/{operation}` with the input as JSON body: mutation
//!
//! A missing input is `null`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use dashmap::DashMap;
use futures::StreamExt;
use partkit_server::{Endpoint, Operation};
use serde::Deserialize;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use crate::error;

/// State shared by the handlers and the adapter.
#[derive(Default)]
pub struct Routes {
    pub endpoints: DashMap<String, Arc<Endpoint>>,
    pub cancel: CancellationToken,
}

impl Routes {
    fn lookup(&self, endpoint: &str, operation: &str) -> Result<Operation, HttpResponse> {
        // clone out so no DashMap guard is held across an await
        let found = self
            .endpoints
            .get(endpoint)
            .map(|e| Arc::clone(e.value()))
            .and_then(|e| e.operation(operation));
        found.ok_or_else(|| {
            error::error(
                StatusCode::NOT_FOUND,
                format!("unknown procedure '{endpoint}.{operation}'"),
            )
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct InputParams {
    input: Option<String>,
}

fn parse_input(raw: Option<&[u8]>) -> Result<Json, HttpResponse> {
    match raw {
        None => Ok(Json::Null),
        Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Json::Null),
        Some(bytes) => serde_json::from_slice(bytes).map_err(|e| {
            error::error(StatusCode::BAD_REQUEST, format!("input is not valid JSON: {e}"))
        }),
    }
}

fn wrong_method(procedure: &str, kind: &str) -> HttpResponse {
    error::error(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("'{procedure}' is a {kind}"),
    )
}

pub async fn get_operation(
    State(routes): State<Arc<Routes>>,
    Path((endpoint, operation)): Path<(String, String)>,
    Query(params): Query<InputParams>,
) -> HttpResponse {
    let procedure = format!("{endpoint}.{operation}");
    let op = match routes.lookup(&endpoint, &operation) {
        Ok(op) => op,
        Err(resp) => return resp,
    };
    let input = match parse_input(params.input.as_deref().map(str::as_bytes)) {
        Ok(input) => input,
        Err(resp) => return resp,
    };

    match op {
        Operation::Query(query) => error::outcome(&procedure, query.invoke(input).await),
        Operation::Subscription(subscription) => match subscription.subscribe(input).await {
            Ok(events) => {
                tracing::debug!(%procedure, "subscription opened");
                let stream = events
                    .map(|event| {
                        let frame = serde_json::to_string(&event)
                            .unwrap_or_else(|_| r#"{"type":"error","data":"unserializable event"}"#.into());
                        Ok::<_, Infallible>(Event::default().data(frame))
                    })
                    .take_until(routes.cancel.clone().cancelled_owned());
                Sse::new(stream)
                    .keep_alive(KeepAlive::default())
                    .into_response()
            }
            Err(err) => error::outcome(&procedure, Err(err)),
        },
        Operation::Mutation(_) => wrong_method(&procedure, "mutation"),
    }
}

pub async fn post_operation(
    State(routes): State<Arc<Routes>>,
    Path((endpoint, operation)): Path<(String, String)>,
    body: Bytes,
) -> HttpResponse {
    let procedure = format!("{endpoint}.{operation}");
    let op = match routes.lookup(&endpoint, &operation) {
        Ok(op) => op,
        Err(resp) => return resp,
    };
    let input = match parse_input(Some(body.as_ref())) {
        Ok(input) => input,
        Err(resp) => return resp,
    };

    match op {
        Operation::Mutation(mutation) => error::outcome(&procedure, mutation.invoke(input).await),
        Operation::Query(_) => wrong_method(&procedure, "query"),
        Operation::Subscription(_) => wrong_method(&procedure, "subscription"),
    }
}

pub async fn health_check() -> impl IntoResponse {
    "ok"
}
