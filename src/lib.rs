//! Durable, resumable agent workflows for business analysis.
//!
//! Steps form a closed graph ([`StepId`]); each returns a partial
//! [`StateUpdate`] and an [`Outcome`] that must name one of its declared
//! successors. The [`Runner`] checkpoints after every step, so a run can be
//! suspended for a human decision ([`Ctx::interrupt`]) and resumed later,
//! even from another process.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use analyst_line::{
//!     Ctx, ExecutionResult, MemoryCheckpointStore, Outcome, RunState, Runner, StateUpdate,
//!     Step, StepId, StepResult, Target, Workflow,
//! };
//!
//! struct Finish;
//! impl Step for Finish {
//!     fn id(&self) -> StepId { StepId::Report }
//!     fn run(&self, _state: &RunState, _ctx: &mut Ctx) -> StepResult {
//!         Ok((StateUpdate::new().final_report("done"), Outcome::Done))
//!     }
//! }
//!
//! let wf = Workflow::builder("demo")
//!     .register(Finish)
//!     .edge(StepId::Report, Target::End)
//!     .build()
//!     .unwrap();
//!
//! let runner = Runner::new(wf, Arc::new(MemoryCheckpointStore::new()));
//! let result = runner
//!     .execute(&mut Ctx::new("thread-1"), RunState::default(), StepId::Report)
//!     .unwrap();
//! assert!(matches!(result, ExecutionResult::Completed { state } if state.final_report == "done"));
//! ```

pub mod agent;
pub mod analysis;
pub mod checkpoint;
pub mod config;
mod ctx;
pub mod interrupt;
pub mod llm;
pub mod message;
mod runner;
pub mod service;
pub mod state;
mod step;
pub mod tools;
mod workflow;

pub use agent::AgentStep;
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
    ThreadLease,
};
pub use config::{Config, ConfigError};
pub use ctx::Ctx;
pub use interrupt::InterruptPayload;
pub use llm::{ChatModel, ModelError, OpenAiChat};
pub use message::{Lane, Message, MessageLog, Role, ToolCall};
pub use runner::{ErrorEvent, ExecutionResult, RunError, Runner, StepEvent};
pub use service::{AnalysisService, RunResponse, RunStatus, ServiceError};
pub use state::{ApprovalDecision, RunState, StateUpdate};
pub use step::{Outcome, Step, StepError, StepId, StepResult, Target};
pub use workflow::{Workflow, WorkflowBuilder, WorkflowError};
