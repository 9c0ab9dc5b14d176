use std::sync::Arc;

use crate::llm::ChatModel;
use crate::message::{Message, Role};
use crate::step::StepError;
use crate::tools::ToolRegistry;

/// Wraps one external model call: a fixed role instruction plus a lane's
/// messages (and optionally a bound tool set) in, one assistant message out.
///
/// Failures are not retried here; they surface as [`StepError::Model`] and the
/// enclosing step decides what to do.
#[derive(Clone)]
pub struct AgentStep {
    model: Arc<dyn ChatModel>,
}

impl AgentStep {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn invoke(
        &self,
        instruction: &str,
        messages: &[Message],
        tools: Option<&ToolRegistry>,
    ) -> Result<Message, StepError> {
        let specs = tools.map(ToolRegistry::specs).unwrap_or_default();
        let mut reply = self.model.complete(instruction, messages, &specs)?;

        if reply.role != Role::Assistant {
            return Err(StepError::invalid(format!(
                "model replied with role '{}', expected assistant",
                reply.role.as_str()
            )));
        }

        // Calls to tools the step never bound cannot be honored.
        if tools.is_none() && reply.has_tool_calls() {
            tracing::warn!(
                calls = reply.tool_calls.len(),
                "model requested tools on a step without tool access; ignoring"
            );
            reply.tool_calls.clear();
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use crate::message::ToolCall;
    use crate::tools::ToolSpec;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<(String, usize, usize)>>,
        reply: Message,
    }

    impl ChatModel for Recording {
        fn complete(
            &self,
            instruction: &str,
            messages: &[Message],
            tools: &[ToolSpec],
        ) -> Result<Message, ModelError> {
            self.seen
                .lock()
                .unwrap()
                .push((instruction.to_string(), messages.len(), tools.len()));
            Ok(self.reply.clone())
        }
    }

    struct Failing;
    impl ChatModel for Failing {
        fn complete(&self, _: &str, _: &[Message], _: &[ToolSpec]) -> Result<Message, ModelError> {
            Err(ModelError::EmptyResponse)
        }
    }

    fn with_reply(reply: Message) -> Arc<Recording> {
        Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply,
        })
    }

    #[test]
    fn passes_instruction_messages_and_tools() {
        let model = with_reply(Message::assistant("ok"));
        let agent = AgentStep::new(model.clone());
        let tools = ToolRegistry::new().register(crate::tools::SearchTool::unavailable());

        let reply = agent
            .invoke("sys", &[Message::human("a"), Message::human("b")], Some(&tools))
            .unwrap();

        assert_eq!(reply.content, "ok");
        assert_eq!(
            model.seen.lock().unwrap()[0],
            ("sys".to_string(), 2, 1)
        );
    }

    #[test]
    fn tool_calls_dropped_without_bound_tools() {
        let model = with_reply(Message::assistant_with_tools(
            "",
            vec![ToolCall::new("c", "web_search", serde_json::json!({}))],
        ));
        let reply = AgentStep::new(model).invoke("sys", &[], None).unwrap();
        assert!(!reply.has_tool_calls());
    }

    #[test]
    fn non_assistant_reply_is_invalid() {
        let model = with_reply(Message::human("hijack"));
        let err = AgentStep::new(model).invoke("sys", &[], None).err().unwrap();
        assert!(matches!(err, StepError::Invalid(_)));
    }

    #[test]
    fn model_failure_propagates() {
        let err = AgentStep::new(Arc::new(Failing))
            .invoke("sys", &[], None)
            .err()
            .unwrap();
        assert!(matches!(err, StepError::Model(ModelError::EmptyResponse)));
    }
}
