//! JSON-RPC over HTTP, answered either directly or as a server-sent event
//! stream.

use super::{jsonrpc, sse};
use crate::tool_registry::{
    domain::{
        HttpTransportConfig, ServerHealthSnapshot, ServerTransport, ToolDefinition, ToolServer,
    },
    ports::{ToolCall, ToolOutput, ToolTransport, ToolTransportError, ToolTransportResult},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Default request timeout for listing and probing.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport for `request_response` and `server_push_stream` servers.
#[derive(Debug, Clone)]
pub struct HttpToolTransport {
    client: reqwest::Client,
    degraded_latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyMode {
    Json,
    EventStream,
}

impl HttpToolTransport {
    /// Creates a transport that reports probes slower than
    /// `degraded_latency` as `degraded`.
    #[must_use]
    pub fn new(degraded_latency: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            degraded_latency,
        }
    }

    fn endpoint(server: &ToolServer) -> ToolTransportResult<(&HttpTransportConfig, ReplyMode)> {
        match server.transport() {
            ServerTransport::RequestResponse(config) => Ok((config, ReplyMode::Json)),
            ServerTransport::ServerPushStream(config) => Ok((config, ReplyMode::EventStream)),
            ServerTransport::ProcessPipe(_) => Err(ToolTransportError::UnsupportedTransport {
                server_id: server.id(),
                reason: "process-pipe servers are not reachable over HTTP".to_owned(),
            }),
        }
    }

    fn post(
        &self,
        server: &ToolServer,
        config: &HttpTransportConfig,
        mode: ReplyMode,
        body: &Value,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let accept = match mode {
            ReplyMode::Json => "application/json",
            ReplyMode::EventStream => "text/event-stream",
        };
        let mut request = self
            .client
            .post(config.url())
            .timeout(timeout)
            .header(ACCEPT, accept)
            .json(body);
        for (name, value) in server.auth().http_headers() {
            request = request.header(name, value);
        }
        request
    }

    async fn round_trip(
        &self,
        server: &ToolServer,
        method: &str,
        params: Value,
        call_id: &str,
        timeout: Duration,
    ) -> ToolTransportResult<Value> {
        let (config, mode) = Self::endpoint(server)?;
        let body = jsonrpc::request(call_id, method, params);
        let response = self
            .post(server, config, mode, &body, timeout)
            .send()
            .await
            .map_err(|err| map_request_error(server, &err))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ToolTransportError::Unreachable {
                server_id: server.id(),
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(jsonrpc::protocol(server.id(), format!("HTTP {status}")));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        if is_event_stream {
            let reply = sse::first_matching(response.bytes_stream(), |event| {
                jsonrpc::is_reply_to(event, call_id)
            })
            .await
            .map_err(|err| map_request_error(server, &err))?;
            return reply.ok_or_else(|| {
                jsonrpc::protocol(server.id(), "event stream ended without a reply")
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| jsonrpc::protocol(server.id(), err.to_string()))
    }
}

impl Default for HttpToolTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000))
    }
}

fn map_request_error(server: &ToolServer, err: &reqwest::Error) -> ToolTransportError {
    if err.is_timeout() {
        return ToolTransportError::TimedOut(server.id());
    }
    ToolTransportError::Unreachable {
        server_id: server.id(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl ToolTransport for HttpToolTransport {
    async fn list_tools(&self, server: &ToolServer) -> ToolTransportResult<Vec<ToolDefinition>> {
        let call_id = Uuid::new_v4().to_string();
        let reply = self
            .round_trip(
                server,
                jsonrpc::METHOD_LIST_TOOLS,
                json!({}),
                &call_id,
                DEFAULT_REQUEST_TIMEOUT,
            )
            .await?;
        let result = jsonrpc::into_result(server.id(), reply)?
            .map_err(|failure| jsonrpc::protocol(server.id(), failure.message))?;
        jsonrpc::parse_tool_listing(server.id(), &result)
    }

    async fn invoke(&self, server: &ToolServer, call: &ToolCall) -> ToolTransportResult<ToolOutput> {
        let params = json!({"name": call.tool_name, "arguments": call.arguments});
        let reply = self
            .round_trip(
                server,
                jsonrpc::METHOD_CALL_TOOL,
                params,
                &call.call_id,
                call.timeout,
            )
            .await?;
        jsonrpc::parse_tool_reply(server.id(), &call.tool_name, reply)
    }

    async fn probe(&self, server: &ToolServer) -> ToolTransportResult<ServerHealthSnapshot> {
        let call_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let reply = self
            .round_trip(
                server,
                jsonrpc::METHOD_PING,
                json!({}),
                &call_id,
                DEFAULT_REQUEST_TIMEOUT,
            )
            .await?;
        let elapsed = started.elapsed();
        let checked_at = Utc::now();

        if let Err(failure) = jsonrpc::into_result(server.id(), reply)? {
            return Ok(ServerHealthSnapshot::unhealthy(checked_at, failure.message));
        }
        if elapsed > self.degraded_latency {
            return Ok(ServerHealthSnapshot::degraded(
                checked_at,
                format!("probe took {}ms", elapsed.as_millis()),
            ));
        }
        Ok(ServerHealthSnapshot::healthy(checked_at))
    }

    async fn cancel(&self, server: &ToolServer, call_id: &str) -> ToolTransportResult<()> {
        let (config, _) = Self::endpoint(server)?;
        let body = jsonrpc::cancellation(call_id);
        let result = self
            .post(server, config, ReplyMode::Json, &body, DEFAULT_REQUEST_TIMEOUT)
            .send()
            .await;
        if let Err(err) = result {
            debug!(server = %server.name(), call_id, error = %err, "cancellation notice not delivered");
        }
        Ok(())
    }
}
