//! The business-analysis pipeline: research with a bounded tool sub-loop,
//! summary, market and technical analysis, a human approval gate, and the
//! final report.
//!
//! ```text
//! research ──▶ tools ──▶ research ... ──▶ summary ──▶ market ──▶ technical ──▶ approval
//!                                                        ▲                         │
//!                                                        └──────── retry ──────────┤
//!                                                                  approve ──▶ report ──▶ end
//!                                                                  reject  ──▶ end
//! ```

pub mod prompts;
mod steps;

pub use steps::{AnalystStep, ApprovalStep, ReportStep, ResearchStep, SummaryStep, ToolsStep};

use std::sync::Arc;

use crate::agent::AgentStep;
use crate::llm::ChatModel;
use crate::step::{StepId, Target};
use crate::tools::{ToolInvoker, ToolRegistry};
use crate::{Workflow, WorkflowError};

pub const WORKFLOW_NAME: &str = "business_analysis";
pub const DEFAULT_MAX_TOOL_LOOPS: u32 = 3;
pub const DEFAULT_THEME: &str = "Space debris removal business";

/// Capabilities the pipeline steps are built from.
#[derive(Clone)]
pub struct AnalysisDeps {
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<ToolRegistry>,
    pub max_tool_loops: u32,
}

impl AnalysisDeps {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools: Arc::new(tools),
            max_tool_loops: DEFAULT_MAX_TOOL_LOOPS,
        }
    }

    pub fn with_max_tool_loops(mut self, max: u32) -> Self {
        self.max_tool_loops = max;
        self
    }
}

pub fn build_workflow(deps: AnalysisDeps) -> Result<Workflow, WorkflowError> {
    let agent = AgentStep::new(deps.model);

    Workflow::builder(WORKFLOW_NAME)
        .register(ResearchStep::new(
            agent.clone(),
            Arc::clone(&deps.tools),
            deps.max_tool_loops,
        ))
        .register(ToolsStep::new(ToolInvoker::new(deps.tools)))
        .register(SummaryStep::new(agent.clone()))
        .register(AnalystStep::market(agent.clone()))
        .register(AnalystStep::technical(agent.clone()))
        .register(ApprovalStep)
        .register(ReportStep::new(agent))
        .start_at(StepId::Research)
        .branch(
            StepId::Research,
            [Target::Step(StepId::Tools), Target::Step(StepId::Summary)],
        )
        .edge(StepId::Tools, StepId::Research)
        .edge(StepId::Summary, StepId::MarketAnalysis)
        .edge(StepId::MarketAnalysis, StepId::TechnicalAnalysis)
        .edge(StepId::TechnicalAnalysis, StepId::Approval)
        .branch(
            StepId::Approval,
            [
                Target::Step(StepId::Report),
                Target::Step(StepId::MarketAnalysis),
                Target::End,
            ],
        )
        .edge(StepId::Report, Target::End)
        .may_suspend(StepId::Approval)
        .build()
}
