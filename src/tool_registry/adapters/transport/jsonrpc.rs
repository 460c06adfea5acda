//! JSON-RPC 2.0 framing shared by the network and process transports.

use crate::tool_registry::{
    domain::{ServerId, ToolDefinition},
    ports::{ToolOutput, ToolTransportError, ToolTransportResult},
};
use serde_json::{Value, json};

pub(super) const METHOD_LIST_TOOLS: &str = "tools/list";
pub(super) const METHOD_CALL_TOOL: &str = "tools/call";
pub(super) const METHOD_PING: &str = "ping";
pub(super) const METHOD_CANCELLED: &str = "notifications/cancelled";

/// Builds a request envelope.
pub(super) fn request(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Builds a notification envelope (no reply expected).
pub(super) fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

/// Builds the cancellation notification for an in-flight call.
pub(super) fn cancellation(call_id: &str) -> Value {
    notification(
        METHOD_CANCELLED,
        json!({"requestId": call_id, "reason": "gateway deadline exceeded"}),
    )
}

/// Returns whether an incoming message answers the request with `id`.
pub(super) fn is_reply_to(message: &Value, id: &str) -> bool {
    message.get("id").and_then(Value::as_str) == Some(id)
}

/// Application-level failure carried in a JSON-RPC `error` member.
pub(super) struct RpcFailure {
    pub(super) message: String,
}

/// Splits a reply envelope into its `result` or `error` member.
pub(super) fn into_result(
    server_id: ServerId,
    reply: Value,
) -> ToolTransportResult<Result<Value, RpcFailure>> {
    let Value::Object(mut envelope) = reply else {
        return Err(protocol(server_id, "reply is not a JSON object"));
    };

    if let Some(error) = envelope.remove("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error")
            .to_owned();
        return Ok(Err(RpcFailure { message }));
    }

    envelope
        .remove("result")
        .map(Ok)
        .ok_or_else(|| protocol(server_id, "reply carries neither result nor error"))
}

/// Decodes a `tools/list` result.
pub(super) fn parse_tool_listing(
    server_id: ServerId,
    result: &Value,
) -> ToolTransportResult<Vec<ToolDefinition>> {
    let tools = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| protocol(server_id, "tool listing lacks a 'tools' array"))?;

    tools
        .iter()
        .map(|tool| parse_tool(server_id, tool))
        .collect()
}

fn parse_tool(server_id: ServerId, tool: &Value) -> ToolTransportResult<ToolDefinition> {
    let name = tool
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| protocol(server_id, "listed tool lacks a name"))?;
    let input_schema = tool
        .get("inputSchema")
        .cloned()
        .unwrap_or_else(|| json!({"type": "object"}));
    let capabilities = tool
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut definition = ToolDefinition::new(name, input_schema)
        .and_then(|definition| definition.with_capabilities(capabilities))
        .map_err(|err| protocol(server_id, err.to_string()))?;
    if let Some(description) = tool.get("description").and_then(Value::as_str) {
        definition = definition.with_description(description);
    }
    if let Some(output_schema) = tool.get("outputSchema") {
        definition = definition.with_output_schema(output_schema.clone());
    }
    Ok(definition)
}

/// Decodes a `tools/call` reply into output or a tool failure.
pub(super) fn parse_tool_reply(
    server_id: ServerId,
    tool_name: &str,
    reply: Value,
) -> ToolTransportResult<ToolOutput> {
    let result = into_result(server_id, reply)?.map_err(|failure| {
        ToolTransportError::ToolFailed {
            tool_name: tool_name.to_owned(),
            message: failure.message,
        }
    })?;

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(ToolTransportError::ToolFailed {
            tool_name: tool_name.to_owned(),
            message: error_text(&result),
        });
    }

    let content = result
        .get("structuredContent")
        .or_else(|| result.get("content"))
        .cloned()
        .unwrap_or(Value::Null);
    let output = ToolOutput::new(content);
    Ok(match result.get("usage") {
        Some(usage) => output.with_resource_usage(usage.clone()),
        None => output,
    })
}

fn error_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|parts| parts.iter().find_map(|part| part.get("text")))
        .and_then(Value::as_str)
        .unwrap_or("tool reported an error")
        .to_owned()
}

pub(super) fn protocol(server_id: ServerId, reason: impl Into<String>) -> ToolTransportError {
    ToolTransportError::Protocol {
        server_id,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_reads_schemas_and_capabilities() {
        let result = json!({
            "tools": [{
                "name": "geocode",
                "description": "City to coordinates",
                "inputSchema": {"type": "object", "properties": {"city": {"type": "string"}}},
                "outputSchema": {"type": "object"},
                "capabilities": ["Geo"]
            }]
        });

        let tools = parse_tool_listing(ServerId::new(), &result).expect("valid listing");

        let tool = tools.first().expect("one tool");
        assert_eq!(tool.name(), "geocode");
        assert_eq!(tool.description(), "City to coordinates");
        assert_eq!(tool.capabilities(), ["geo"]);
        assert!(tool.output_schema().is_some());
    }

    #[test]
    fn listing_without_tools_array_is_a_protocol_error() {
        let result = parse_tool_listing(ServerId::new(), &json!({"items": []}));
        assert!(matches!(result, Err(ToolTransportError::Protocol { .. })));
    }

    #[test]
    fn structured_content_wins_over_content() {
        let reply = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {"content": [{"type": "text"}], "structuredContent": {"lat": 48.85}}
        });

        let output = parse_tool_reply(ServerId::new(), "geocode", reply).expect("success");

        assert_eq!(output.content, json!({"lat": 48.85}));
    }

    #[test]
    fn is_error_flag_becomes_tool_failure() {
        let reply = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {"isError": true, "content": [{"type": "text", "text": "unknown city"}]}
        });

        let result = parse_tool_reply(ServerId::new(), "geocode", reply);

        assert!(matches!(
            result,
            Err(ToolTransportError::ToolFailed { ref message, .. }) if message == "unknown city"
        ));
    }

    #[test]
    fn rpc_error_member_becomes_tool_failure() {
        let reply = json!({"jsonrpc": "2.0", "id": "1", "error": {"code": -32000, "message": "boom"}});
        let result = parse_tool_reply(ServerId::new(), "geocode", reply);
        assert!(matches!(result, Err(ToolTransportError::ToolFailed { .. })));
    }
}
