use serde::{Deserialize, Serialize};

use crate::message::{Lane, Message, MessageLog};

/// The human decision recorded at the approval gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    #[default]
    Unset,
    Approve,
    Retry,
    Reject,
}

impl ApprovalDecision {
    /// Normalize a raw resume value. Anything unrecognized is a rejection.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "y" | "approve" => Self::Approve,
            "retry" => Self::Retry,
            _ => Self::Reject,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Approve => "approve",
            Self::Retry => "retry",
            Self::Reject => "reject",
        }
    }
}

/// Everything threaded through one business-analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub research_messages: MessageLog,
    pub analysis_messages: MessageLog,
    pub loop_count: u32,
    /// Name of the step currently (or last) executing. Diagnostic only.
    pub current_step: String,
    pub approval_decision: ApprovalDecision,
    pub final_report: String,
}

impl RunState {
    pub fn for_theme(theme: &str) -> Self {
        let mut state = Self::default();
        state
            .research_messages
            .push(Message::human(format!("Theme: {theme}")));
        state
    }

    pub fn log(&self, lane: Lane) -> &MessageLog {
        match lane {
            Lane::Research => &self.research_messages,
            Lane::Analysis => &self.analysis_messages,
        }
    }

    /// Merge a step's partial update. Messages are appended, never replaced.
    pub fn apply(&mut self, update: StateUpdate) {
        self.research_messages.append(update.research);
        self.analysis_messages.append(update.analysis);
        if let Some(count) = update.loop_count {
            self.loop_count = count;
        }
        if let Some(decision) = update.approval_decision {
            self.approval_decision = decision;
        }
        if let Some(report) = update.final_report {
            self.final_report = report;
        }
    }
}

/// A step's partial update of [`RunState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub research: Vec<Message>,
    pub analysis: Vec<Message>,
    pub loop_count: Option<u32>,
    pub approval_decision: Option<ApprovalDecision>,
    pub final_report: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, lane: Lane, message: Message) -> Self {
        match lane {
            Lane::Research => self.research.push(message),
            Lane::Analysis => self.analysis.push(message),
        }
        self
    }

    pub fn append_all(mut self, lane: Lane, messages: impl IntoIterator<Item = Message>) -> Self {
        match lane {
            Lane::Research => self.research.extend(messages),
            Lane::Analysis => self.analysis.extend(messages),
        }
        self
    }

    pub fn loop_count(mut self, count: u32) -> Self {
        self.loop_count = Some(count);
        self
    }

    pub fn approval_decision(mut self, decision: ApprovalDecision) -> Self {
        self.approval_decision = Some(decision);
        self
    }

    pub fn final_report(mut self, report: impl Into<String>) -> Self {
        self.final_report = Some(report.into());
        self
    }
}
