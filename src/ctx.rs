use crate::interrupt::InterruptPayload;
use crate::step::StepError;

/// Execution context for one invocation of the runner.
///
/// Carries the thread identity and the externally supplied resume value, if
/// this invocation is a resume.
pub struct Ctx {
    thread_id: String,
    resume: Option<String>,
}

impl Ctx {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            resume: None,
        }
    }

    /// A context whose first [`interrupt`](Ctx::interrupt) call returns `value`
    /// instead of suspending.
    pub fn resuming(thread_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            resume: Some(value.into()),
            ..Self::new(thread_id)
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn has_resume_value(&self) -> bool {
        self.resume.is_some()
    }

    /// Suspend the run, or hand back the resume value if one is pending.
    ///
    /// The resume value is consumed by the first call, so a step reached again
    /// later in the same invocation suspends anew. Propagate the error with `?`;
    /// the runner turns it into an interrupted result.
    pub fn interrupt(&mut self, payload: InterruptPayload) -> Result<String, StepError> {
        match self.resume.take() {
            Some(value) => Ok(value),
            None => Err(StepError::Interrupted(Box::new(payload))),
        }
    }
}
