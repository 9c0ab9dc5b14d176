use crate::step::{Step, StepId, Target};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// WorkflowError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("duplicate step: {0}")]
    DuplicateStep(StepId),
    #[error("unknown step: {0}")]
    UnknownStep(StepId),
    #[error("workflow missing start step")]
    MissingStart,
    #[error("step {0} has no declared successor")]
    NoSuccessor(StepId),
}

// ---------------------------------------------------------------------------
// WorkflowBuilder
// ---------------------------------------------------------------------------

pub struct WorkflowBuilder {
    name: &'static str,
    start: Option<StepId>,
    steps: HashMap<StepId, Arc<dyn Step>>,
    default_next: HashMap<StepId, Target>,
    allowed: HashMap<StepId, Vec<Target>>,
    suspend_capable: HashSet<StepId>,
    duplicate: Option<StepId>,
}

impl WorkflowBuilder {
    pub fn register<S: Step>(mut self, step: S) -> Self {
        let id = step.id();
        if self.steps.contains_key(&id) {
            self.duplicate = Some(id);
        }
        self.steps.insert(id, Arc::new(step));

        // If this is the first step added and start isn't set, default start to it.
        if self.start.is_none() {
            self.start = Some(id);
        }

        self
    }

    pub fn start_at(mut self, step: StepId) -> Self {
        self.start = Some(step);
        self
    }

    /// Static edge: `from` goes to `to` when it returns `Outcome::Continue`.
    pub fn edge(mut self, from: StepId, to: impl Into<Target>) -> Self {
        let to = to.into();
        self.default_next.insert(from, to);
        self.allow(from, to);
        self
    }

    /// Declare the finite set of successors `from` may choose at runtime.
    pub fn branch(mut self, from: StepId, targets: impl IntoIterator<Item = Target>) -> Self {
        for to in targets {
            self.allow(from, to);
        }
        self
    }

    /// Mark a step whose execution may suspend the run. The runner persists a
    /// checkpoint pointing at it before it runs.
    pub fn may_suspend(mut self, step: StepId) -> Self {
        self.suspend_capable.insert(step);
        self
    }

    fn allow(&mut self, from: StepId, to: Target) {
        let targets = self.allowed.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        // Check for duplicate steps.
        if let Some(id) = self.duplicate {
            return Err(WorkflowError::DuplicateStep(id));
        }

        // Check for a start step.
        let start = self.start.ok_or(WorkflowError::MissingStart)?;

        // Validate start_at target exists as a registered step.
        if !self.steps.contains_key(&start) {
            return Err(WorkflowError::UnknownStep(start));
        }

        // Every edge must start and end at registered steps.
        for (from, targets) in &self.allowed {
            if !self.steps.contains_key(from) {
                return Err(WorkflowError::UnknownStep(*from));
            }
            for target in targets {
                if let Target::Step(to) = target
                    && !self.steps.contains_key(to)
                {
                    return Err(WorkflowError::UnknownStep(*to));
                }
            }
        }

        for id in &self.suspend_capable {
            if !self.steps.contains_key(id) {
                return Err(WorkflowError::UnknownStep(*id));
            }
        }

        // A step with nowhere to go can only strand the run.
        let mut ids: Vec<StepId> = self.steps.keys().copied().collect();
        ids.sort();
        for id in ids {
            if self.allowed.get(&id).is_none_or(|t| t.is_empty()) {
                return Err(WorkflowError::NoSuccessor(id));
            }
        }

        Ok(Workflow {
            name: self.name,
            start,
            steps: self.steps,
            default_next: self.default_next,
            allowed: self.allowed,
            suspend_capable: self.suspend_capable,
        })
    }
}

// ---------------------------------------------------------------------------
// Workflow (validated, only constructed via build())
// ---------------------------------------------------------------------------

pub struct Workflow {
    name: &'static str,
    start: StepId,
    steps: HashMap<StepId, Arc<dyn Step>>,
    default_next: HashMap<StepId, Target>,
    allowed: HashMap<StepId, Vec<Target>>,
    suspend_capable: HashSet<StepId>,
}

impl Workflow {
    pub fn builder(name: &'static str) -> WorkflowBuilder {
        WorkflowBuilder {
            name,
            start: None,
            steps: HashMap::new(),
            default_next: HashMap::new(),
            allowed: HashMap::new(),
            suspend_capable: HashSet::new(),
            duplicate: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start(&self) -> StepId {
        self.start
    }

    pub fn may_suspend(&self, id: StepId) -> bool {
        self.suspend_capable.contains(&id)
    }

    pub fn successors(&self, from: StepId) -> &[Target] {
        self.allowed.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allows(&self, from: StepId, to: Target) -> bool {
        self.successors(from).contains(&to)
    }

    // --- stuff the runner uses (keep pub(crate)) ---
    pub(crate) fn step(&self, id: StepId) -> Option<&Arc<dyn Step>> {
        self.steps.get(&id)
    }

    pub(crate) fn default_next(&self, from: StepId) -> Option<Target> {
        self.default_next.get(&from).copied()
    }
}
