//! Inbound HTTP surface.
//!
//! `POST /gateway/{*path}` runs the endpoint published at `path` with the
//! request body as caller input. Execution failures keep their per-binding
//! breakdown in the error body. `GET /healthz` reports liveness.

mod response;

use crate::gateway::{
    domain::{ExecutionId, ExecutionOutcome},
    ports::{EndpointRepository, ExecutionRecordRepository},
    services::{ExecutionEngine, GatewayResult},
};
use crate::tool_registry::ports::{CatalogRepository, ServerRepository, ToolTransport};
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mockable::Clock;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

pub use response::{ApiError, outcome_response};

/// Header carrying a caller-chosen execution identifier.
pub const EXECUTION_ID_HEADER: &str = "x-execution-id";

/// Runs endpoints on behalf of the HTTP layer.
#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    /// Executes the endpoint addressed by `target`.
    async fn invoke(
        &self,
        target: &str,
        payload: Value,
        execution_id: Option<ExecutionId>,
    ) -> GatewayResult<ExecutionOutcome>;
}

#[async_trait]
impl<E, S, K, R, T, C> EndpointInvoker for ExecutionEngine<E, S, K, R, T, C>
where
    E: EndpointRepository,
    S: ServerRepository,
    K: CatalogRepository,
    R: ExecutionRecordRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    async fn invoke(
        &self,
        target: &str,
        payload: Value,
        execution_id: Option<ExecutionId>,
    ) -> GatewayResult<ExecutionOutcome> {
        self.execute(target, payload, execution_id).await
    }
}

#[derive(Clone)]
struct AppState {
    invoker: Arc<dyn EndpointInvoker>,
}

/// Builds the gateway router.
#[must_use]
pub fn router(invoker: Arc<dyn EndpointInvoker>) -> Router {
    Router::new()
        .route("/gateway/{*path}", post(invoke_endpoint))
        .route("/healthz", get(healthz))
        .with_state(AppState { invoker })
}

async fn invoke_endpoint(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let execution_id = match execution_id(&headers) {
        Ok(execution_id) => execution_id,
        Err(err) => return err.into_response(),
    };
    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(err) => return err.into_response(),
    };
    match state.invoker.invoke(&path, payload, execution_id).await {
        Ok(outcome) => outcome_response(&outcome),
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn execution_id(headers: &HeaderMap) -> Result<Option<ExecutionId>, ApiError> {
    let Some(raw) = headers.get(EXECUTION_ID_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|text| Uuid::parse_str(text.trim()).ok())
        .map(|uuid| Some(ExecutionId::from_uuid(uuid)))
        .ok_or_else(|| ApiError::invalid_request(format!("{EXECUTION_ID_HEADER} must be a UUID")))
}

fn parse_payload(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::invalid_request(format!("request body is not valid JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::adapters::memory::{InMemoryEndpointRepository, InMemoryRecordStore};
    use crate::gateway::services::{
        AddBindingRequest, CreateEndpointRequest, EndpointComposer, GatewayError, TargetSpec,
    };
    use crate::tool_registry::adapters::memory::{InMemoryCatalog, InMemoryServerRegistry};
    use crate::tool_registry::adapters::{ScriptedResponse, ScriptedToolTransport};
    use crate::tool_registry::domain::{
        CatalogEntry, ServerName, ServerTransport, ToolDefinition, ToolServer,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mockable::DefaultClock;
    use mockall::mock;
    use rstest::rstest;
    use tower::ServiceExt;

    mock! {
        Invoker {}

        #[async_trait]
        impl EndpointInvoker for Invoker {
            async fn invoke(
                &self,
                target: &str,
                payload: Value,
                execution_id: Option<ExecutionId>,
            ) -> GatewayResult<ExecutionOutcome>;
        }
    }

    /// Weather endpoint at `/gateway/weather` backed by a scripted transport.
    async fn weather_app(transport: Arc<ScriptedToolTransport>) -> Router {
        let clock = Arc::new(DefaultClock);
        let servers = Arc::new(InMemoryServerRegistry::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let endpoints = Arc::new(InMemoryEndpointRepository::new());
        let server = ToolServer::new(
            ServerName::new("weather_tools").expect("valid name"),
            ServerTransport::request_response("http://localhost:9000/rpc").expect("valid url"),
            &DefaultClock,
        );
        servers.register(&server).await.expect("server registered");
        let definition = ToolDefinition::new("geocode", json!({})).expect("valid definition");
        let entry = CatalogEntry::discovered(server.id(), &definition, &DefaultClock);
        catalog.upsert(&entry).await.expect("entry stored");

        let composer =
            EndpointComposer::new(Arc::clone(&endpoints), Arc::clone(&catalog), Arc::clone(&clock));
        let endpoint = composer
            .create_endpoint(CreateEndpointRequest::new("weather", "weather"))
            .await
            .expect("endpoint created");
        composer
            .add_binding(
                endpoint.id(),
                AddBindingRequest::new(TargetSpec::Catalog(entry.id()), "geo", 0)
                    .map("city", "input.city"),
            )
            .await
            .expect("binding added");
        composer.activate(endpoint.id()).await.expect("activated");

        let engine = ExecutionEngine::new(
            endpoints,
            servers,
            catalog,
            Arc::new(InMemoryRecordStore::new()),
            transport,
            clock,
        );
        router(Arc::new(engine))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .expect("valid request")
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body readable")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completed_execution_returns_breakdown() {
        let transport = Arc::new(ScriptedToolTransport::new());
        transport
            .push_response("geocode", ScriptedResponse::Success(json!({"lat": 48.85})))
            .expect("response queued");
        let app = weather_app(transport).await;
        let execution_id = Uuid::new_v4();

        let response = app
            .oneshot(
                Request::post("/gateway/weather")
                    .header(EXECUTION_ID_HEADER, execution_id.to_string())
                    .body(Body::from(r#"{"city": "Paris"}"#))
                    .expect("valid request"),
            )
            .await
            .expect("request handled");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["bindings"]["geo"]["output"], json!({"lat": 48.85}));
        assert_eq!(body["executionId"], json!(execution_id.to_string()));
        assert!(body["traceId"].is_string());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_execution_is_bad_gateway_with_breakdown() {
        let transport = Arc::new(ScriptedToolTransport::new());
        transport
            .push_response("geocode", ScriptedResponse::ToolError("city unknown".to_owned()))
            .expect("response queued");
        let app = weather_app(transport).await;

        let response = app
            .oneshot(post_json("/gateway/weather", r#"{"city": "Atlantis"}"#))
            .await
            .expect("request handled");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = read_json(response).await;
        assert_eq!(body["kind"], "failed");
        assert_eq!(
            body["bindings"]["geo"]["error"]["kind"],
            "tool_execution_error"
        );
    }

    #[rstest]
    #[case("/gateway/nowhere", "{}", StatusCode::NOT_FOUND, "not_found")]
    #[case("/gateway/weather", "{not json", StatusCode::BAD_REQUEST, "invalid_request")]
    #[tokio::test(flavor = "multi_thread")]
    async fn request_errors_are_structured(
        #[case] uri: &str,
        #[case] body: &str,
        #[case] status: StatusCode,
        #[case] kind: &str,
    ) {
        let app = weather_app(Arc::new(ScriptedToolTransport::new())).await;

        let response = app.oneshot(post_json(uri, body)).await.expect("request handled");

        assert_eq!(response.status(), status);
        let body = read_json(response).await;
        assert_eq!(body["kind"], kind);
        assert!(body["message"].is_string());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_execution_id_is_rejected_before_invocation() {
        let mut invoker = MockInvoker::new();
        invoker.expect_invoke().times(0);
        let app = router(Arc::new(invoker));

        let response = app
            .oneshot(
                Request::post("/gateway/weather")
                    .header(EXECUTION_ID_HEADER, "not-a-uuid")
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("request handled");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[case(GatewayError::RateLimited("weather".to_owned()), StatusCode::TOO_MANY_REQUESTS, "rate_limited")]
    #[case(
        GatewayError::internal(std::io::Error::other("disk full")),
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error"
    )]
    #[tokio::test(flavor = "multi_thread")]
    async fn gateway_errors_map_to_status_codes(
        #[case] error: GatewayError,
        #[case] status: StatusCode,
        #[case] kind: &str,
    ) {
        let mut invoker = MockInvoker::new();
        invoker
            .expect_invoke()
            .withf(|target, payload, _| target == "weather" && *payload == json!({}))
            .return_once(move |_, _, _| Err(error));
        let app = router(Arc::new(invoker));

        let response = app
            .oneshot(post_json("/gateway/weather", ""))
            .await
            .expect("request handled");

        assert_eq!(response.status(), status);
        assert_eq!(read_json(response).await["kind"], kind);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn healthz_reports_ok() {
        let app = router(Arc::new(MockInvoker::new()));
        let response = app
            .oneshot(
                Request::get("/healthz")
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("request handled");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({"status": "ok"}));
    }
}
