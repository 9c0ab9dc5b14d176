use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::interrupt::InterruptPayload;
use crate::step::{Outcome, StepError, StepId, Target};
use crate::{Ctx, RunState, Workflow};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Passed to the `on_step` hook after each successful step.
pub struct StepEvent<'a> {
    pub thread_id: &'a str,
    pub step: StepId,
    pub outcome: &'a Outcome,
    pub next: Target,
    pub duration: Duration,
    pub step_number: usize,
}

/// Passed to the `on_error` hook when a step errors or a limit is exceeded.
pub struct ErrorEvent<'a> {
    pub thread_id: &'a str,
    pub step: StepId,
    pub error: &'a RunError,
    pub step_number: usize,
}

/// How one invocation of the runner ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Reached the end marker.
    Completed { state: RunState },
    /// A step suspended. Resuming re-runs `resume_step` with `state`.
    Interrupted {
        payload: InterruptPayload,
        resume_step: StepId,
        state: RunState,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("step '{step}' failed: {source}")]
    Step { step: StepId, source: StepError },
    #[error("step '{from}' routed to undeclared successor '{to}'")]
    UndeclaredTransition { from: StepId, to: Target },
    #[error("step '{0}' returned Continue but no default next step is configured")]
    NoDefaultSuccessor(StepId),
    #[error("step '{0}' is not registered")]
    UnknownStep(StepId),
    #[error("max_steps exceeded (possible infinite loop) in workflow {0}")]
    MaxStepsExceeded(&'static str),
    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),
}

type StepHook = Box<dyn Fn(&StepEvent) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&ErrorEvent) + Send + Sync>;

/// Executes a [`Workflow`] one step at a time, checkpointing as it goes.
///
/// A checkpoint is written after every completed step, before any
/// suspend-capable step, and when a step suspends. A failing step writes
/// nothing, so the previous checkpoint stays the resume point.
pub struct Runner {
    wf: Workflow,
    store: Arc<dyn CheckpointStore>,
    max_steps: usize,
    on_step: Option<StepHook>,
    on_error: Option<ErrorHook>,
}

impl Runner {
    pub fn new(wf: Workflow, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            wf,
            store,
            max_steps: 10_000,
            on_step: None,
            on_error: None,
        }
    }

    /// Prevent accidental infinite loops.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Register a callback that fires after each successful step.
    pub fn on_step(mut self, cb: impl Fn(&StepEvent) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Box::new(cb));
        self
    }

    /// Register a callback that fires when a step errors or a limit is exceeded.
    pub fn on_error(mut self, cb: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Set both hooks to emit step transitions and errors as tracing events.
    pub fn with_tracing(self) -> Self {
        self.on_step(|e| {
            tracing::info!(
                thread_id = e.thread_id,
                step = %e.step,
                step_number = e.step_number,
                next = %e.next,
                duration_ms = e.duration.as_millis() as u64,
                "step completed"
            );
        })
        .on_error(|e| {
            tracing::error!(
                thread_id = e.thread_id,
                step = %e.step,
                step_number = e.step_number,
                error = %e.error,
                "step failed"
            );
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.wf
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Run from `start` until the end marker or a suspension.
    ///
    /// `ctx` identifies the thread and carries the resume value, if any.
    pub fn execute(
        &self,
        ctx: &mut Ctx,
        mut state: RunState,
        start: StepId,
    ) -> Result<ExecutionResult, RunError> {
        let thread_id = ctx.thread_id().to_string();
        let prior = self.store.load(&thread_id)?;
        let mut seq = prior.as_ref().map_or(0, |cp| cp.seq);
        let mut current = start;
        // Resume position of the newest stored checkpoint.
        let mut persisted_at = prior.and_then(|cp| cp.resume_step());

        for step_number in 1..=self.max_steps {
            let step = self
                .wf
                .step(current)
                .ok_or(RunError::UnknownStep(current))?;

            if self.wf.may_suspend(current) && persisted_at != Some(current) {
                seq += 1;
                self.save(Checkpoint::new(
                    &thread_id,
                    seq,
                    state.clone(),
                    Target::Step(current),
                ))?;
                persisted_at = Some(current);
            }

            state.current_step = current.as_str().to_string();
            let started = Instant::now();
            let result = step.run(&state, ctx);
            let duration = started.elapsed();

            let (update, outcome) = match result {
                Ok(ok) => ok,
                Err(StepError::Interrupted(payload)) => {
                    let payload = *payload;
                    seq += 1;
                    self.save(
                        Checkpoint::new(&thread_id, seq, state.clone(), Target::Step(current))
                            .with_interrupt(payload.clone()),
                    )?;
                    tracing::warn!(
                        thread_id = %thread_id,
                        step = %current,
                        kind = %payload.kind,
                        "run suspended awaiting external decision"
                    );
                    return Ok(ExecutionResult::Interrupted {
                        payload,
                        resume_step: current,
                        state,
                    });
                }
                Err(source) => {
                    let err = RunError::Step {
                        step: current,
                        source,
                    };
                    self.emit_error(&thread_id, current, &err, step_number);
                    return Err(err);
                }
            };

            state.apply(update);
            let next = match self.resolve(current, &outcome) {
                Ok(next) => next,
                Err(err) => {
                    tracing::error!(thread_id = %thread_id, error = %err, "invalid transition");
                    self.emit_error(&thread_id, current, &err, step_number);
                    return Err(err);
                }
            };

            seq += 1;
            self.save(Checkpoint::new(&thread_id, seq, state.clone(), next))?;

            if let Some(cb) = &self.on_step {
                cb(&StepEvent {
                    thread_id: &thread_id,
                    step: current,
                    outcome: &outcome,
                    next,
                    duration,
                    step_number,
                });
            }

            match next {
                Target::End => return Ok(ExecutionResult::Completed { state }),
                Target::Step(id) => {
                    persisted_at = Some(id);
                    current = id;
                }
            }
        }

        let err = RunError::MaxStepsExceeded(self.wf.name());
        self.emit_error(&thread_id, current, &err, self.max_steps);
        Err(err)
    }

    /// Turn an outcome into a concrete target, enforcing the declared edges.
    fn resolve(&self, from: StepId, outcome: &Outcome) -> Result<Target, RunError> {
        let to = match outcome {
            Outcome::Continue => self
                .wf
                .default_next(from)
                .ok_or(RunError::NoDefaultSuccessor(from))?,
            Outcome::Next(id) => Target::Step(*id),
            Outcome::Done => Target::End,
        };

        if !self.wf.allows(from, to) {
            return Err(RunError::UndeclaredTransition { from, to });
        }
        Ok(to)
    }

    fn save(&self, checkpoint: Checkpoint) -> Result<(), RunError> {
        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            seq = checkpoint.seq,
            next = %checkpoint.next,
            interrupted = checkpoint.is_interrupted(),
            "checkpoint saved"
        );
        self.store.save(&checkpoint)?;
        Ok(())
    }

    fn emit_error(&self, thread_id: &str, step: StepId, error: &RunError, step_number: usize) {
        if let Some(cb) = &self.on_error {
            cb(&ErrorEvent {
                thread_id,
                step,
                error,
                step_number,
            });
        }
    }
}
