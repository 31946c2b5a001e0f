use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// One tool call surfaced by an agent reply, joined with its result when the
/// runtime streamed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: Value,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCall {
    tool_call_id: String,
    tool_name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResult {
    tool_call_id: String,
    #[serde(default)]
    result: Value,
}

/// Parsed agent response: accumulated text plus tool invocations, and the
/// assistant turn in wire shape ready to be appended to the chat history.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub content: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub assistant_message: Option<Value>,
}

/// Parse the Bitte runtime's line-oriented streaming format:
/// `0:` text deltas, `9:` tool calls, `a:` tool results. Lines that do not
/// parse are skipped, matching how the runtime interleaves frames we do not
/// consume.
pub fn parse_stream(body: &str, agent_id: &str) -> AgentReply {
    let mut content = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();
    let mut results: HashMap<String, Value> = HashMap::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("0:") {
            match serde_json::from_str::<Value>(rest) {
                Ok(Value::String(chunk)) => content.push_str(&chunk),
                _ => debug!("Skipping unparseable text frame"),
            }
        } else if let Some(rest) = line.strip_prefix("9:") {
            match serde_json::from_str::<ToolCall>(rest) {
                Ok(call) => calls.push(call),
                Err(e) => debug!("Skipping unparseable tool call: {}", e),
            }
        } else if let Some(rest) = line.strip_prefix("a:") {
            match serde_json::from_str::<ToolResult>(rest) {
                Ok(result) => {
                    results.insert(result.tool_call_id, result.result);
                }
                Err(e) => debug!("Skipping unparseable tool result: {}", e),
            }
        }
    }

    let tool_invocations: Vec<ToolInvocation> = calls
        .into_iter()
        .map(|call| {
            let (result, state) = match results.remove(&call.tool_call_id) {
                Some(result) => (result, "completed".to_string()),
                None => (Value::Null, "pending".to_string()),
            };
            ToolInvocation {
                tool_call_id: call.tool_call_id,
                tool_name: call.tool_name,
                args: call.args,
                result,
                state,
            }
        })
        .collect();

    let assistant_message = if !content.is_empty() || !tool_invocations.is_empty() {
        Some(json!({
            "id": format!("msg-{}", Uuid::new_v4()),
            "role": "assistant",
            "content": content,
            "parts": [{ "type": "text", "text": content }],
            "toolInvocations": tool_invocations,
            "annotations": [{ "agentId": agent_id }],
        }))
    } else {
        None
    };

    AgentReply {
        content,
        tool_invocations,
        assistant_message,
    }
}

/// A user turn in the wire shape the agent endpoints expect.
pub fn user_message(text: &str, agent_id: &str) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "role": "user",
        "content": text,
        "toolInvocations": [],
        "annotations": [{ "agentId": agent_id }],
        "parts": [{ "type": "text", "text": text }],
    })
}
