//! Language-model boundary.
//!
//! [`ChatModel`] is the only thing the workflow knows about a model. The
//! bundled [`OpenAiChat`] speaks the OpenAI-compatible chat-completions wire
//! format over a blocking HTTP client.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::message::{Message, Role, ToolCall};
use crate::tools::{HttpError, ToolSpec, post_json};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("http: {0}")]
    Http(#[from] HttpError),
    #[error("could not decode model response: {0}")]
    Decode(String),
    #[error("model returned no choices")]
    EmptyResponse,
}

/// One external model call: instruction + ordered messages (+ tools) in,
/// one assistant message out. No retries happen at this layer.
pub trait ChatModel: Send + Sync {
    fn complete(
        &self,
        instruction: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError>;
}

/// Chat-completions client for OpenAI and compatible servers.
pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, instruction: &str, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": wire_messages(instruction, messages),
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }
}

impl ChatModel for OpenAiChat {
    fn complete(
        &self,
        instruction: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(instruction, messages, tools);

        tracing::debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion request");
        let response = post_json(&url, Some(&self.api_key), &body, self.timeout)?;
        parse_completion(response)
    }
}

/// Convert the log into chat-completions messages.
///
/// Tool calls that never got a tool result (the sub-loop bound stopped them)
/// are left out of the request, since the API rejects unanswered calls. The
/// stored log keeps them.
pub fn wire_messages(instruction: &str, messages: &[Message]) -> Vec<Value> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(json!({"role": "system", "content": instruction}));

    for m in messages {
        let value = match m.role {
            Role::System => json!({"role": "system", "content": m.content}),
            Role::Human => json!({"role": "user", "content": m.content}),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content,
            }),
            Role::Assistant => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .filter(|c| answered.contains(c.id.as_str()))
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.arguments.to_string()},
                        })
                    })
                    .collect();
                if calls.is_empty() {
                    json!({"role": "assistant", "content": m.content})
                } else {
                    json!({"role": "assistant", "content": m.content, "tool_calls": calls})
                }
            }
        };
        out.push(value);
    }
    out
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn parse_completion(value: Value) -> Result<Message, ModelError> {
    let completion: Completion =
        serde_json::from_value(value).map_err(|e| ModelError::Decode(e.to_string()))?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse)?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|c| {
            // Malformed argument JSON is passed through as a string; the tool
            // rejects it and the model sees the diagnostic.
            let arguments = serde_json::from_str(&c.function.arguments)
                .unwrap_or(Value::String(c.function.arguments));
            ToolCall::new(c.id, c.function.name, arguments)
        })
        .collect();

    Ok(Message::assistant_with_tools(
        choice.message.content.unwrap_or_default(),
        tool_calls,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_answer() {
        let msg = parse_completion(json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        }))
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "hello");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn parses_tool_calls_with_null_content() {
        let msg = parse_completion(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "web_search", "arguments": "{\"query\":\"debris\"}"}
                }]
            }}]
        }))
        .unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "call_1");
        assert_eq!(msg.tool_calls[0].arguments, json!({"query": "debris"}));
    }

    #[test]
    fn malformed_arguments_pass_through_as_string() {
        let msg = parse_completion(json!({
            "choices": [{"message": {"tool_calls": [{
                "id": "c", "function": {"name": "web_search", "arguments": "{oops"}
            }]}}]
        }))
        .unwrap();
        assert_eq!(msg.tool_calls[0].arguments, json!("{oops"));
    }

    #[test]
    fn no_choices_is_an_error() {
        let err = parse_completion(json!({"choices": []})).err().unwrap();
        assert!(matches!(err, ModelError::EmptyResponse));
    }

    #[test]
    fn wire_messages_map_roles() {
        let wire = wire_messages(
            "be brief",
            &[
                Message::human("Theme: x"),
                Message::assistant_with_tools(
                    "",
                    vec![ToolCall::new("c1", "web_search", json!({"query": "x"}))],
                ),
                Message::tool("c1", "[1] ..."),
                Message::assistant("done"),
            ],
        );
        assert_eq!(wire[0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], "{\"query\":\"x\"}");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "c1");
        assert_eq!(wire[4], json!({"role": "assistant", "content": "done"}));
    }

    #[test]
    fn unanswered_tool_calls_are_dropped_from_request() {
        let wire = wire_messages(
            "sys",
            &[Message::assistant_with_tools(
                "thinking",
                vec![ToolCall::new("c9", "web_search", json!({"query": "x"}))],
            )],
        );
        assert_eq!(wire[1], json!({"role": "assistant", "content": "thinking"}));
    }

    #[test]
    fn request_body_includes_tools_and_temperature() {
        let chat = OpenAiChat::new("key", "gpt-test")
            .with_base_url("http://localhost:9/v1/")
            .with_temperature(0.0);
        let body = chat.request_body(
            "sys",
            &[],
            &[ToolSpec {
                name: "web_search".into(),
                description: "d".into(),
                parameters: json!({"type": "object"}),
            }],
        );
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert_eq!(chat.base_url, "http://localhost:9/v1");
    }

    #[test]
    fn request_body_omits_empty_tools() {
        let body = OpenAiChat::new("key", "m").request_body("sys", &[], &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
    }
}
