//! Newline-delimited JSON-RPC over a child process's stdio.

use super::jsonrpc;
use crate::tool_registry::{
    domain::{
        ProcessPipeConfig, ServerHealthSnapshot, ServerId, ServerTransport, ToolDefinition,
        ToolServer,
    },
    ports::{ToolCall, ToolOutput, ToolTransport, ToolTransportError, ToolTransportResult},
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type SessionSlot = Arc<tokio::sync::Mutex<Option<PipeSession>>>;

/// Transport for servers launched as local child processes.
///
/// One child is kept per server and reused across calls. Calls to the same
/// server are serialized. A call abandoned mid-flight kills the child; the
/// next call spawns a fresh one.
#[derive(Debug)]
pub struct ProcessPipeTransport {
    sessions: Mutex<HashMap<ServerId, SessionSlot>>,
    degraded_latency: Duration,
}

#[derive(Debug)]
struct PipeSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl PipeSession {
    fn spawn(server: &ToolServer, config: &ProcessPipeConfig) -> ToolTransportResult<Self> {
        let mut command = Command::new(config.command());
        command
            .args(config.args())
            .envs(config.env())
            .envs(server.auth().environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(directory) = config.working_directory() {
            command.current_dir(directory);
        }

        let mut child = command.spawn().map_err(|err| ToolTransportError::Unreachable {
            server_id: server.id(),
            reason: format!("failed to spawn '{}': {err}", config.command()),
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(jsonrpc::protocol(server.id(), "child stdio was not captured"));
        };
        debug!(server = %server.name(), command = config.command(), "spawned tool process");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn send(&mut self, server_id: ServerId, message: &Value) -> ToolTransportResult<()> {
        let mut line = message.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| broken_pipe(server_id, &err))?;
        self.stdin
            .flush()
            .await
            .map_err(|err| broken_pipe(server_id, &err))
    }

    async fn receive(&mut self, server_id: ServerId, id: &str) -> ToolTransportResult<Value> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|err| broken_pipe(server_id, &err))?
                .ok_or_else(|| ToolTransportError::Unreachable {
                    server_id,
                    reason: "tool process closed its output".to_owned(),
                })?;
            let Ok(message) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            if jsonrpc::is_reply_to(&message, id) {
                return Ok(message);
            }
        }
    }

    fn kill(&mut self) {
        if let Err(err) = self.child.start_kill() {
            debug!(error = %err, "tool process already exited");
        }
    }
}

fn broken_pipe(server_id: ServerId, err: &std::io::Error) -> ToolTransportError {
    ToolTransportError::Unreachable {
        server_id,
        reason: err.to_string(),
    }
}

/// Kills the session unless the exchange ran to completion.
struct InFlight<'slot> {
    slot: &'slot mut Option<PipeSession>,
    finished: bool,
}

impl InFlight<'_> {
    fn session(&mut self) -> ToolTransportResult<&mut PipeSession> {
        self.slot
            .as_mut()
            .ok_or_else(|| ToolTransportError::runtime(std::io::Error::other("session vanished")))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(mut session) = self.slot.take() {
            session.kill();
        }
    }
}

impl ProcessPipeTransport {
    /// Creates a transport that reports probes slower than
    /// `degraded_latency` as `degraded`.
    #[must_use]
    pub fn new(degraded_latency: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            degraded_latency,
        }
    }

    fn config(server: &ToolServer) -> ToolTransportResult<&ProcessPipeConfig> {
        match server.transport() {
            ServerTransport::ProcessPipe(config) => Ok(config),
            ServerTransport::RequestResponse(_) | ServerTransport::ServerPushStream(_) => {
                Err(ToolTransportError::UnsupportedTransport {
                    server_id: server.id(),
                    reason: "network servers are not reachable over a process pipe".to_owned(),
                })
            }
        }
    }

    fn slot(&self, server_id: ServerId) -> ToolTransportResult<SessionSlot> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|err| ToolTransportError::runtime(std::io::Error::other(err.to_string())))?;
        Ok(Arc::clone(sessions.entry(server_id).or_default()))
    }

    async fn round_trip(
        &self,
        server: &ToolServer,
        method: &str,
        params: Value,
        call_id: &str,
        timeout: Duration,
    ) -> ToolTransportResult<Value> {
        let config = Self::config(server)?;
        let slot = self.slot(server.id())?;
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = Some(PipeSession::spawn(server, config)?);
        }

        let mut in_flight = InFlight {
            slot: &mut *guard,
            finished: false,
        };
        let request = jsonrpc::request(call_id, method, params);
        let exchange = async {
            let session = in_flight.session()?;
            session.send(server.id(), &request).await?;
            session.receive(server.id(), call_id).await
        };
        let reply = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ToolTransportError::TimedOut(server.id()))
            .and_then(|reply| reply);
        if reply.is_ok() {
            in_flight.finished = true;
        } else {
            warn!(server = %server.name(), method, "tool process exchange failed; session reset");
        }
        reply
    }
}

impl Default for ProcessPipeTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000))
    }
}

#[async_trait]
impl ToolTransport for ProcessPipeTransport {
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
        Self::config(server)?;
        let slot = self.slot(server.id())?;
        // A busy slot means another exchange owns the pipe; the abandoned
        // call already killed its child.
        let Ok(mut guard) = slot.try_lock() else {
            return Ok(());
        };
        if let Some(session) = guard.as_mut() {
            let notice = jsonrpc::cancellation(call_id);
            if let Err(err) = session.send(server.id(), &notice).await {
                debug!(server = %server.name(), call_id, error = %err, "cancellation notice not delivered");
            }
        }
        Ok(())
    }
}
