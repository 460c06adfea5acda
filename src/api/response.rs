//! Status codes and JSON bodies for gateway responses.

use crate::gateway::{
    domain::{ExecutionOutcome, ExecutionStatus},
    services::GatewayError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Error body returned for every non-2xx response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
    #[serde(flatten)]
    breakdown: Option<&'a ExecutionOutcome>,
}

/// A request that produced no execution outcome.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    /// Malformed request input.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            message: message.into(),
        }
    }

    /// Returns the HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the stable error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Inactive { .. } => StatusCode::CONFLICT,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if let GatewayError::Internal(_) = &err {
            error!(error = %err, "gateway request failed");
            "the gateway could not complete the request".to_owned()
        } else {
            err.to_string()
        };
        Self {
            status,
            kind: err.kind(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind,
            message: self.message,
            breakdown: None,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps an execution outcome to its response.
///
/// Completed executions return 200 with the outcome itself; failed and
/// timed-out executions return 502 and 504 with the breakdown flattened into
/// the error body.
#[must_use]
pub fn outcome_response(outcome: &ExecutionOutcome) -> Response {
    let (status, kind, message) = match outcome.status {
        ExecutionStatus::Completed => return (StatusCode::OK, Json(outcome)).into_response(),
        ExecutionStatus::Failed => (
            StatusCode::BAD_GATEWAY,
            "failed",
            "one or more bindings failed",
        ),
        ExecutionStatus::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            "the endpoint deadline expired",
        ),
    };
    let body = ErrorBody {
        kind,
        message: message.to_owned(),
        breakdown: Some(outcome),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::domain::{EndpointStatus, ExecutionId};
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn outcome(status: ExecutionStatus) -> ExecutionOutcome {
        ExecutionOutcome {
            status,
            bindings: BTreeMap::new(),
            trace_id: "0".repeat(32),
            execution_id: ExecutionId::new(),
            endpoint_id: None,
            latency_ms: 0,
        }
    }

    #[rstest]
    #[case(ExecutionStatus::Completed, StatusCode::OK)]
    #[case(ExecutionStatus::Failed, StatusCode::BAD_GATEWAY)]
    #[case(ExecutionStatus::Timeout, StatusCode::GATEWAY_TIMEOUT)]
    fn execution_status_selects_http_status(
        #[case] status: ExecutionStatus,
        #[case] expected: StatusCode,
    ) {
        assert_eq!(outcome_response(&outcome(status)).status(), expected);
    }

    #[test]
    fn inactive_endpoint_is_a_conflict() {
        let err = ApiError::from(GatewayError::Inactive {
            name: "weather".to_owned(),
            status: EndpointStatus::Draft,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "inactive");
    }
}
