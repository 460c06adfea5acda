//! Scripted in-memory transport for tests and local orchestration flows.

use crate::tool_registry::{
    domain::{ServerHealthSnapshot, ServerId, ServerName, ToolDefinition, ToolServer},
    ports::{ToolCall, ToolOutput, ToolTransport, ToolTransportError, ToolTransportResult},
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Scripted outcome for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// The tool succeeds with this payload.
    Success(Value),
    /// The tool reports an application-level error.
    ToolError(String),
}

/// In-memory transport adapter.
///
/// Tool listings are keyed by server name; invocations pop scripted
/// responses per tool name and fall back to echoing the arguments. Every
/// invocation is counted so tests can assert that no call was attempted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedToolTransport {
    state: Arc<RwLock<ScriptedTransportState>>,
}

#[derive(Debug, Default)]
struct ScriptedTransportState {
    tool_catalogs: HashMap<ServerName, Vec<ToolDefinition>>,
    unhealthy_servers: HashMap<ServerId, String>,
    unreachable_servers: HashSet<ServerId>,
    responses: HashMap<String, VecDeque<ScriptedResponse>>,
    delays: HashMap<String, Duration>,
    health_check_delays: HashMap<ServerId, Duration>,
    invocations: Vec<ToolCall>,
    cancellations: Vec<String>,
}

fn lock_error(err: impl ToString) -> ToolTransportError {
    ToolTransportError::runtime(std::io::Error::other(err.to_string()))
}

impl ScriptedToolTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a tool listing with a server name, replacing any previous
    /// listing.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_tool_catalog(
        &self,
        server_name: ServerName,
        tools: Vec<ToolDefinition>,
    ) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.tool_catalogs.insert(server_name, tools);
        Ok(())
    }

    /// Makes probes of a server report `unhealthy`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_unhealthy(
        &self,
        server_id: ServerId,
        message: impl Into<String>,
    ) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state
            .unhealthy_servers
            .insert(server_id, message.into().trim().to_owned());
        Ok(())
    }

    /// Makes every operation against a server fail as unreachable.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_unreachable(&self, server_id: ServerId) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.unreachable_servers.insert(server_id);
        Ok(())
    }

    /// Queues a scripted response for the next invocation of `tool_name`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn push_response(
        &self,
        tool_name: impl Into<String>,
        response: ScriptedResponse,
    ) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state
            .responses
            .entry(tool_name.into())
            .or_default()
            .push_back(response);
        Ok(())
    }

    /// Delays every invocation of `tool_name`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_delay(&self, tool_name: impl Into<String>, delay: Duration) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.delays.insert(tool_name.into(), delay);
        Ok(())
    }

    /// Pauses health checks of a server before they answer.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_health_check_delay(
        &self,
        server_id: ServerId,
        delay: Duration,
    ) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.health_check_delays.insert(server_id, delay);
        Ok(())
    }

    /// Returns every invocation attempted so far, in order.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn invocations(&self) -> ToolTransportResult<Vec<ToolCall>> {
        Ok(self.state.read().map_err(lock_error)?.invocations.clone())
    }

    /// Returns the number of invocations of `tool_name`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn invocation_count(&self, tool_name: &str) -> ToolTransportResult<usize> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .invocations
            .iter()
            .filter(|call| call.tool_name == tool_name)
            .count())
    }

    /// Returns call identifiers passed to [`ToolTransport::cancel`].
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn cancellations(&self) -> ToolTransportResult<Vec<String>> {
        Ok(self.state.read().map_err(lock_error)?.cancellations.clone())
    }

    fn ensure_reachable(&self, server: &ToolServer) -> ToolTransportResult<()> {
        let state = self.state.read().map_err(lock_error)?;
        if state.unreachable_servers.contains(&server.id()) {
            return Err(ToolTransportError::Unreachable {
                server_id: server.id(),
                reason: "connection refused".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ToolTransport for ScriptedToolTransport {
    async fn list_tools(&self, server: &ToolServer) -> ToolTransportResult<Vec<ToolDefinition>> {
        self.ensure_reachable(server)?;
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .tool_catalogs
            .get(server.name())
            .cloned()
            .unwrap_or_default())
    }

    async fn invoke(&self, server: &ToolServer, call: &ToolCall) -> ToolTransportResult<ToolOutput> {
        self.ensure_reachable(server)?;
        let (response, delay) = {
            let mut state = self.state.write().map_err(lock_error)?;
            state.invocations.push(call.clone());
            let response = state
                .responses
                .get_mut(&call.tool_name)
                .and_then(VecDeque::pop_front);
            (response, state.delays.get(&call.tool_name).copied())
        };

        if let Some(pause) = delay {
            tokio::time::sleep(pause).await;
        }

        match response {
            Some(ScriptedResponse::Success(content)) => Ok(ToolOutput::new(content)),
            Some(ScriptedResponse::ToolError(message)) => Err(ToolTransportError::ToolFailed {
                tool_name: call.tool_name.clone(),
                message,
            }),
            None => Ok(ToolOutput::new(json!({
                "tool": call.tool_name,
                "arguments": call.arguments,
            }))),
        }
    }

    async fn probe(&self, server: &ToolServer) -> ToolTransportResult<ServerHealthSnapshot> {
        self.ensure_reachable(server)?;
        let delay = {
            let state = self.state.read().map_err(lock_error)?;
            state.health_check_delays.get(&server.id()).copied()
        };
        if let Some(pause) = delay {
            tokio::time::sleep(pause).await;
        }

        let state = self.state.read().map_err(lock_error)?;
        let checked_at = Utc::now();
        if let Some(message) = state.unhealthy_servers.get(&server.id()) {
            return Ok(ServerHealthSnapshot::unhealthy(checked_at, message.clone()));
        }
        Ok(ServerHealthSnapshot::healthy(checked_at))
    }

    async fn cancel(&self, _server: &ToolServer, call_id: &str) -> ToolTransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.cancellations.push(call_id.to_owned());
        Ok(())
    }
}
