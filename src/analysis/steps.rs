use std::sync::Arc;

use crate::agent::AgentStep;
use crate::interrupt::InterruptPayload;
use crate::message::{Lane, Message};
use crate::state::ApprovalDecision;
use crate::step::{Outcome, Step, StepError, StepId, StepResult};
use crate::tools::{ToolInvoker, ToolRegistry};
use crate::{Ctx, RunState, StateUpdate};

use super::prompts;

/// Model call with web search bound. Decides whether another tool
/// round-trip is allowed or research is over.
pub struct ResearchStep {
    agent: AgentStep,
    tools: Arc<ToolRegistry>,
    max_tool_loops: u32,
}

impl ResearchStep {
    pub fn new(agent: AgentStep, tools: Arc<ToolRegistry>, max_tool_loops: u32) -> Self {
        Self {
            agent,
            tools,
            max_tool_loops,
        }
    }
}

impl Step for ResearchStep {
    fn id(&self) -> StepId {
        StepId::Research
    }

    fn run(&self, state: &RunState, _ctx: &mut Ctx) -> StepResult {
        let today = chrono::Local::now().date_naive();
        let reply = self.agent.invoke(
            &prompts::research(today),
            state.research_messages.as_slice(),
            Some(&self.tools),
        )?;

        let next = if reply.has_tool_calls() && state.loop_count < self.max_tool_loops {
            StepId::Tools
        } else {
            if reply.has_tool_calls() {
                tracing::info!(
                    loop_count = state.loop_count,
                    pending = reply.tool_calls.len(),
                    "tool loop bound reached; moving on to summary"
                );
            }
            StepId::Summary
        };

        Ok((
            StateUpdate::new().append(Lane::Research, reply),
            Outcome::Next(next),
        ))
    }
}

/// Executes the tool calls of the latest research message.
pub struct ToolsStep {
    invoker: ToolInvoker,
}

impl ToolsStep {
    pub fn new(invoker: ToolInvoker) -> Self {
        Self { invoker }
    }
}

impl Step for ToolsStep {
    fn id(&self) -> StepId {
        StepId::Tools
    }

    fn run(&self, state: &RunState, _ctx: &mut Ctx) -> StepResult {
        let calls = match state.research_messages.last() {
            Some(m) if m.has_tool_calls() => &m.tool_calls,
            _ => return Err(StepError::invalid("no pending tool calls in research log")),
        };

        let results = self.invoker.run(calls);
        Ok((
            StateUpdate::new()
                .append_all(Lane::Research, results)
                .loop_count(state.loop_count + 1),
            Outcome::Continue,
        ))
    }
}

/// Condenses the research lane into the first analysis message.
pub struct SummaryStep {
    agent: AgentStep,
}

impl SummaryStep {
    pub fn new(agent: AgentStep) -> Self {
        Self { agent }
    }
}

impl Step for SummaryStep {
    fn id(&self) -> StepId {
        StepId::Summary
    }

    fn run(&self, state: &RunState, _ctx: &mut Ctx) -> StepResult {
        // The framing turns go to the model only; neither lane records them.
        let mut framed = Vec::with_capacity(state.research_messages.len() + 2);
        framed.push(Message::human(prompts::SUMMARY_LEAD_IN));
        framed.extend(state.research_messages.iter().cloned());
        framed.push(Message::human(prompts::SUMMARY_REQUEST));

        let reply = self.agent.invoke(prompts::SUMMARY, &framed, None)?;
        Ok((
            StateUpdate::new()
                .append(Lane::Analysis, reply)
                .loop_count(0),
            Outcome::Continue,
        ))
    }
}

/// A model call over the analysis lane that appends its answer there.
pub struct AnalystStep {
    id: StepId,
    instruction: &'static str,
    agent: AgentStep,
}

impl AnalystStep {
    pub fn market(agent: AgentStep) -> Self {
        Self {
            id: StepId::MarketAnalysis,
            instruction: prompts::MARKET,
            agent,
        }
    }

    pub fn technical(agent: AgentStep) -> Self {
        Self {
            id: StepId::TechnicalAnalysis,
            instruction: prompts::TECHNICAL,
            agent,
        }
    }
}

impl Step for AnalystStep {
    fn id(&self) -> StepId {
        self.id
    }

    fn run(&self, state: &RunState, _ctx: &mut Ctx) -> StepResult {
        let reply = self
            .agent
            .invoke(self.instruction, state.analysis_messages.as_slice(), None)?;
        Ok((
            StateUpdate::new().append(Lane::Analysis, reply),
            Outcome::Continue,
        ))
    }
}

/// The human gate. Nothing before the `interrupt` call may have effects,
/// since the whole step is replayed on resume.
pub struct ApprovalStep;

impl Step for ApprovalStep {
    fn id(&self) -> StepId {
        StepId::Approval
    }

    fn run(&self, state: &RunState, ctx: &mut Ctx) -> StepResult {
        let payload = InterruptPayload::approval_request(state.analysis_messages.as_slice());
        let raw = ctx.interrupt(payload)?;

        let decision = ApprovalDecision::normalize(&raw);
        tracing::debug!(
            thread_id = ctx.thread_id(),
            raw = ?raw,
            decision = decision.as_str(),
            "approval decision received"
        );

        let outcome = match decision {
            ApprovalDecision::Approve => Outcome::Next(StepId::Report),
            ApprovalDecision::Retry => Outcome::Next(StepId::MarketAnalysis),
            ApprovalDecision::Reject | ApprovalDecision::Unset => Outcome::Done,
        };
        Ok((StateUpdate::new().approval_decision(decision), outcome))
    }
}

/// Writes `final_report`, but only behind an explicit approval.
pub struct ReportStep {
    agent: AgentStep,
}

impl ReportStep {
    pub fn new(agent: AgentStep) -> Self {
        Self { agent }
    }
}

impl Step for ReportStep {
    fn id(&self) -> StepId {
        StepId::Report
    }

    fn run(&self, state: &RunState, _ctx: &mut Ctx) -> StepResult {
        if state.approval_decision != ApprovalDecision::Approve {
            return Ok((StateUpdate::new().final_report(""), Outcome::Done));
        }

        let reply = self
            .agent
            .invoke(prompts::REPORT, state.analysis_messages.as_slice(), None)?;
        let report = reply.content.clone();
        Ok((
            StateUpdate::new()
                .append(Lane::Analysis, reply)
                .final_report(report),
            Outcome::Done,
        ))
    }
}
