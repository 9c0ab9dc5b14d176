//! The boundary the outside world calls: start a run, resume a suspended
//! one, or look at where a thread stands.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{self, AnalysisDeps, DEFAULT_THEME};
use crate::checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, SqliteCheckpointStore, ThreadLease,
};
use crate::config::{Config, ConfigError};
use crate::interrupt::InterruptPayload;
use crate::llm::{ChatModel, OpenAiChat};
use crate::message::Message;
use crate::runner::{ExecutionResult, RunError, Runner};
use crate::step::StepId;
use crate::tools::{SearchTool, TavilyClient, ToolRegistry};
use crate::{Ctx, RunState, WorkflowError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no run found for thread {0}")]
    NotFound(String),
    #[error("thread {0} is busy with another operation")]
    Busy(String),
    #[error("thread {0} already has a run in progress; resume it instead")]
    ThreadActive(String),
    #[error("thread {0} has already completed")]
    AlreadyCompleted(String),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("workflow: {0}")]
    Workflow(#[from] WorkflowError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// A save lost the race against another writer on the same thread.
    fn from_run(err: RunError) -> Self {
        match err {
            RunError::Checkpoint(CheckpointError::Conflict { thread_id }) => {
                ServiceError::Busy(thread_id)
            }
            err => ServiceError::Run(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Interrupted,
}

/// What `start` and `resume` hand back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptPayload>,
    pub analysis_messages: Vec<Message>,
}

impl RunResponse {
    fn from_result(thread_id: String, result: ExecutionResult) -> Self {
        match result {
            ExecutionResult::Completed { state } => Self {
                thread_id,
                status: RunStatus::Completed,
                report: Some(state.final_report),
                interrupt: None,
                analysis_messages: state.analysis_messages.as_slice().to_vec(),
            },
            ExecutionResult::Interrupted { payload, state, .. } => Self {
                thread_id,
                status: RunStatus::Interrupted,
                report: None,
                interrupt: Some(payload),
                analysis_messages: state.analysis_messages.as_slice().to_vec(),
            },
        }
    }
}

/// Runs the business-analysis workflow against a checkpoint store.
///
/// `Send + Sync`: share one instance between OS threads. Different thread
/// ids proceed in parallel; a second concurrent operation on the same
/// thread id fails fast with [`ServiceError::Busy`]. The lease is taken
/// from the store, so services in other processes sharing the same
/// database are excluded too.
pub struct AnalysisService {
    runner: Runner,
}

impl AnalysisService {
    pub fn new(deps: AnalysisDeps, store: Arc<dyn CheckpointStore>) -> Result<Self, ServiceError> {
        let workflow = analysis::build_workflow(deps)?;
        Ok(Self {
            runner: Runner::new(workflow, store).with_tracing(),
        })
    }

    /// Wire up the live model, search backend and SQLite store.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let api_key = config
            .openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let mut chat = OpenAiChat::new(api_key, &config.model_name)
            .with_base_url(&config.openai_base_url)
            .with_timeout(config.request_timeout);
        if let Some(t) = config.model_temperature {
            chat = chat.with_temperature(t);
        }
        let model: Arc<dyn ChatModel> = Arc::new(chat);

        let search = match &config.tavily_api_key {
            Some(key) => SearchTool::new(TavilyClient::new(key).with_timeout(config.request_timeout)),
            None => {
                tracing::warn!("TAVILY_API_KEY not set; web search will report itself unavailable");
                SearchTool::unavailable()
            }
        };
        let tools = ToolRegistry::new().register(search);

        let store = SqliteCheckpointStore::open(&config.checkpoint_db)?;
        tracing::info!(
            db = %config.checkpoint_db.display(),
            model = %config.model_name,
            max_tool_loops = config.max_tool_loops,
            "analysis service ready"
        );

        Self::new(
            AnalysisDeps::new(model, tools).with_max_tool_loops(config.max_tool_loops),
            Arc::new(store),
        )
    }

    /// Begin a new run. An empty theme falls back to the default theme and a
    /// missing thread id gets a fresh one. A thread whose previous run has
    /// completed may be started again; one that is mid-run may not.
    pub fn start(&self, theme: &str, thread_id: Option<&str>) -> Result<RunResponse, ServiceError> {
        let theme = match theme.trim() {
            "" => DEFAULT_THEME,
            t => t,
        };
        let thread_id = match thread_id.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let _lease = self.lease(&thread_id)?;
        if let Some(cp) = self.runner.store().load(&thread_id)?
            && !cp.is_completed()
        {
            return Err(ServiceError::ThreadActive(thread_id));
        }

        tracing::info!(thread_id = %thread_id, theme = %theme, "starting run");
        let mut ctx = Ctx::new(&thread_id);
        let result = self
            .runner
            .execute(&mut ctx, RunState::for_theme(theme), StepId::Research)
            .map_err(ServiceError::from_run)?;
        Ok(RunResponse::from_result(thread_id, result))
    }

    /// Continue a thread from its last checkpoint.
    ///
    /// At a pending approval `decision` is handed to the suspended step. A
    /// thread that stopped on a failed step is retried from that step and
    /// `decision` is ignored; the run suspends again at the approval gate.
    pub fn resume(&self, decision: &str, thread_id: &str) -> Result<RunResponse, ServiceError> {
        let _lease = self.lease(thread_id)?;

        let cp = self
            .runner
            .store()
            .load(thread_id)?
            .ok_or_else(|| ServiceError::NotFound(thread_id.to_string()))?;
        let Some(step) = cp.resume_step() else {
            return Err(ServiceError::AlreadyCompleted(thread_id.to_string()));
        };

        tracing::info!(
            thread_id = %thread_id,
            step = %step,
            interrupted = cp.is_interrupted(),
            "resuming run"
        );
        let mut ctx = if cp.is_interrupted() {
            Ctx::resuming(thread_id, decision)
        } else {
            Ctx::new(thread_id)
        };
        let result = self
            .runner
            .execute(&mut ctx, cp.state, step)
            .map_err(ServiceError::from_run)?;
        Ok(RunResponse::from_result(thread_id.to_string(), result))
    }

    /// The thread's latest checkpoint.
    pub fn inspect(&self, thread_id: &str) -> Result<Checkpoint, ServiceError> {
        inspect(self.runner.store().as_ref(), thread_id)
    }

    fn lease(&self, thread_id: &str) -> Result<ThreadLease, ServiceError> {
        self.runner
            .store()
            .try_lease(thread_id)?
            .ok_or_else(|| ServiceError::Busy(thread_id.to_string()))
    }
}

/// The thread's latest checkpoint, read straight from a store. Needs no
/// model or search credentials.
pub fn inspect(store: &dyn CheckpointStore, thread_id: &str) -> Result<Checkpoint, ServiceError> {
    store
        .load(thread_id)?
        .ok_or_else(|| ServiceError::NotFound(thread_id.to_string()))
}
