use crate::ctx::Ctx;
use crate::interrupt::InterruptPayload;
use crate::llm::ModelError;
use crate::state::{RunState, StateUpdate};
use std::fmt;
use std::str::FromStr;

/// The result of running a step: a partial state update plus what to do next.
pub type StepResult = Result<(StateUpdate, Outcome), StepError>;

/// A sync step that reads the run state and proposes an update.
///
/// Implement this trait on your own structs and register them into a
/// [`crate::Workflow`]. Steps never mutate the state directly; the runner
/// merges the returned [`StateUpdate`].
///
/// A step registered as suspend-capable is re-run from the top when its
/// thread is resumed. Anything it does before calling [`Ctx::interrupt`]
/// happens twice, so keep that prefix free of side effects.
pub trait Step: Send + Sync + 'static {
    /// Which node of the graph this step implements.
    fn id(&self) -> StepId;

    /// Run one step. Returns the update and an [`Outcome`] that tells the
    /// runner where to go next.
    fn run(&self, state: &RunState, ctx: &mut Ctx) -> StepResult;
}

/// The closed set of nodes in the business-analysis graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepId {
    Research,
    Tools,
    Summary,
    MarketAnalysis,
    TechnicalAnalysis,
    Approval,
    Report,
}

impl StepId {
    pub const ALL: [StepId; 7] = [
        StepId::Research,
        StepId::Tools,
        StepId::Summary,
        StepId::MarketAnalysis,
        StepId::TechnicalAnalysis,
        StepId::Approval,
        StepId::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Tools => "tools",
            Self::Summary => "summary",
            Self::MarketAnalysis => "market_analysis",
            Self::TechnicalAnalysis => "technical_analysis",
            Self::Approval => "approval",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where control goes after a step: another step, or the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Step(StepId),
    End,
}

impl Target {
    pub const END_MARKER: &'static str = "__end__";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Step(id) => id.as_str(),
            Self::End => Self::END_MARKER,
        }
    }
}

impl From<StepId> for Target {
    fn from(id: StepId) -> Self {
        Target::Step(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::END_MARKER {
            return Ok(Target::End);
        }
        StepId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .map(|id| Target::Step(*id))
            .ok_or_else(|| format!("unknown step: {s}"))
    }
}

// Persisted by name so stored checkpoints stay readable.
impl serde::Serialize for Target {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Target {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Control flow for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Follow the step's static successor edge.
    Continue,
    /// Jump to a specific step. It must be in the step's declared successor set.
    Next(StepId),
    /// Finish the run. The end marker must be a declared successor.
    Done,
}

/// Error type for steps, with variants designed around what the caller can
/// do about them.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Bad input or step logic error. Don't retry, fix the code.
    #[error("invalid: {0}")]
    Invalid(String),
    /// The external model call failed. The last checkpoint is still valid.
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
    /// The step asked to suspend for an external decision. The runner turns
    /// this into an interrupted result; it never reaches callers.
    #[error("interrupted: {}", .0.question)]
    Interrupted(Box<InterruptPayload>),
    /// Everything else. Inspect the message for details.
    #[error("{0}")]
    Other(String),
}

impl StepError {
    /// Create an [`Invalid`](StepError::Invalid) error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        StepError::Invalid(msg.into())
    }

    /// Create an [`Other`](StepError::Other) error.
    pub fn other(msg: impl Into<String>) -> Self {
        StepError::Other(msg.into())
    }
}
