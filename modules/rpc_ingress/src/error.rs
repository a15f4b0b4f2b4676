//! Mapping of operation outcomes onto HTTP responses.
//!
//! Every body keeps the `{"type": "ok" | "error", "data": ...}` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Json;
use partkit_server::{OperationError, Response};

pub fn status_of(response: &Response) -> StatusCode {
    match response {
        Response::Ok(_) => StatusCode::OK,
        Response::Error(_) => StatusCode::BAD_REQUEST,
    }
}

pub fn reply(status: StatusCode, response: Response) -> HttpResponse {
    (status, Json(response)).into_response()
}

pub fn error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    reply(status, Response::error(message))
}

/// Status and body for a finished invocation. A chain aborted with an
/// [`OperationError`] keeps its message; anything else is an internal error.
pub fn outcome(procedure: &str, result: anyhow::Result<Response>) -> HttpResponse {
    match result {
        Ok(response) => reply(status_of(&response), response),
        Err(err) => match err.downcast_ref::<OperationError>() {
            Some(op @ OperationError::Unauthorized(_)) => {
                error(StatusCode::UNAUTHORIZED, op.to_string())
            }
            Some(op @ OperationError::Forbidden(_)) => error(StatusCode::FORBIDDEN, op.to_string()),
            Some(op @ OperationError::InvalidInput(_)) => {
                error(StatusCode::BAD_REQUEST, op.to_string())
            }
            None => {
                tracing::error!(procedure, error = %err, "operation failed");
                error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statuses() {
        assert_eq!(outcome("p", Ok(Response::ok(json!(1)))).status(), StatusCode::OK);
        assert_eq!(
            outcome("p", Ok(Response::error("Not found"))).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            outcome("p", Err(OperationError::Unauthorized("x".into()).into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            outcome("p", Err(OperationError::Forbidden("x".into()).into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            outcome("p", Err(anyhow::anyhow!("db down"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
