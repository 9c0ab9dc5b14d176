//! Payloads describing a pending human decision.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};
use crate::tools::text::truncate_with_ellipsis;

/// How many of the most recent analysis messages the approval preview shows.
pub const PREVIEW_MESSAGES: usize = 3;
/// Per-message character cap in the approval preview.
pub const PREVIEW_CHARS: usize = 1200;

pub const APPROVAL_QUESTION: &str = "Approve the work so far and generate the final report?";
pub const APPROVAL_OPTIONS: [&str; 3] = ["y", "retry", "n"];

/// What a suspended run is waiting for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptPayload {
    pub kind: String,
    pub question: String,
    pub options: Vec<String>,
    pub analysis_preview: Vec<PreviewEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub role: Role,
    pub content: String,
}

impl InterruptPayload {
    /// The approval request shown before the final report is written.
    pub fn approval_request(analysis: &[Message]) -> Self {
        let start = analysis.len().saturating_sub(PREVIEW_MESSAGES);
        let analysis_preview = analysis[start..]
            .iter()
            .map(|m| PreviewEntry {
                role: m.role,
                content: truncate_with_ellipsis(&m.content, PREVIEW_CHARS),
            })
            .collect();

        Self {
            kind: "approval_request".to_string(),
            question: APPROVAL_QUESTION.to_string(),
            options: APPROVAL_OPTIONS.iter().map(|s| s.to_string()).collect(),
            analysis_preview,
        }
    }
}
