use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool invocation requested by an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One conversation turn. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::with_role(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// An assistant turn that asks for tools to be run.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// A tool result, correlated to the request by `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The two independently ordered conversation logs of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Research,
    Analysis,
}

/// Append-only, ordered sequence of messages.
///
/// Entries can only be appended. Steps hand the runtime new messages; nothing
/// removes, reorders or replaces what is already there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog(Vec<Message>);

impl MessageLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn append(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.0.extend(messages);
    }

    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.0
    }

    /// The last `n` messages (or all of them if there are fewer).
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        Self(messages)
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_keeps_prior_order() {
        let mut log = MessageLog::new();
        log.push(Message::human("a"));
        log.append(vec![Message::assistant("b"), Message::assistant("c")]);

        let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn tail_shorter_than_log() {
        let log = MessageLog::from(vec![
            Message::human("1"),
            Message::human("2"),
            Message::human("3"),
            Message::human("4"),
        ]);
        let tail: Vec<&str> = log.tail(3).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(tail, vec!["2", "3", "4"]);
        assert_eq!(log.tail(10).len(), 4);
    }

    #[test]
    fn tool_message_carries_call_id() {
        let msg = Message::tool("call_1", "result");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn empty_tool_calls_are_not_serialized() {
        let value = serde_json::to_value(Message::human("hi")).unwrap();
        assert_eq!(value, json!({"role": "human", "content": "hi"}));
    }

    #[test]
    fn assistant_with_tools_roundtrips_through_json() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("c1", "web_search", json!({"query": "x"}))],
        );
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        assert!(back.has_tool_calls());
    }
}
