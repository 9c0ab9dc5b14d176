//! Durable, keyed-by-thread persistence of run state.
//!
//! A [`Checkpoint`] is the full [`RunState`] plus the position to resume
//! from. There is at most one checkpoint per thread; every save overwrites
//! the previous one atomically, so readers only ever observe a complete
//! checkpoint from some completed step.
//!
//! Saves are conditional on `seq`: a checkpoint only replaces the one whose
//! `seq` is exactly one lower. Two writers that both loaded the same
//! checkpoint cannot both advance it.

mod lease;
mod memory;
mod sqlite;

pub use lease::{ThreadLease, ThreadLeases};
pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interrupt::InterruptPayload;
use crate::state::RunState;
use crate::step::{StepId, Target};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corrupt checkpoint for thread {thread_id}: {reason}")]
    Corrupt { thread_id: String, reason: String },
    #[error("checkpoint store lock poisoned")]
    Poisoned,
    #[error("checkpoint for thread {thread_id} was modified concurrently")]
    Conflict { thread_id: String },
}

/// The persisted snapshot of a thread's state and resume position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Increases by one with every save for this thread.
    pub seq: u64,
    pub state: RunState,
    /// The step to execute next, or the end marker.
    pub next: Target,
    /// Present exactly when the run is suspended at `next`.
    pub interrupt: Option<InterruptPayload>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, seq: u64, state: RunState, next: Target) -> Self {
        Self {
            thread_id: thread_id.into(),
            seq,
            state,
            next,
            interrupt: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_interrupt(mut self, payload: InterruptPayload) -> Self {
        self.interrupt = Some(payload);
        self
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.next == Target::End
    }

    /// The step a resume re-enters, if the run has not finished.
    pub fn resume_step(&self) -> Option<StepId> {
        match self.next {
            Target::Step(id) => Some(id),
            Target::End => None,
        }
    }
}

/// Storage contract for checkpoints.
///
/// Implementations must make `save` an atomic overwrite and must be safe to
/// share between threads working on different `thread_id`s.
pub trait CheckpointStore: Send + Sync {
    /// Store `checkpoint` as the thread's latest. The first save for a
    /// thread may carry any `seq`; later ones must carry the stored `seq`
    /// plus one, or the save fails with [`CheckpointError::Conflict`].
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Returns `None` when the thread has never been checkpointed.
    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Take exclusive use of `thread_id` for as long as the lease lives.
    /// Returns `Ok(None)` when another holder, possibly another process
    /// sharing the same storage, has it.
    fn try_lease(&self, thread_id: &str) -> Result<Option<ThreadLease>, CheckpointError>;
}

/// Whether a save of `new_seq` may replace a stored checkpoint at `stored`.
pub(crate) fn advances(stored: Option<u64>, new_seq: u64) -> bool {
    stored.is_none_or(|seq| seq + 1 == new_seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_roundtrips_through_json() {
        let cp = Checkpoint::new(
            "t1",
            3,
            RunState::for_theme("x"),
            Target::Step(StepId::Approval),
        )
        .with_interrupt(InterruptPayload::approval_request(&[]));

        let text = serde_json::to_string(&cp).unwrap();
        assert!(text.contains("\"next\":\"approval\""));
        let back: Checkpoint = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cp);
        assert!(back.is_interrupted());
        assert_eq!(back.resume_step(), Some(StepId::Approval));
    }

    #[test]
    fn only_the_next_seq_advances_a_checkpoint() {
        assert!(advances(None, 1));
        assert!(advances(None, 12));
        assert!(advances(Some(3), 4));
        assert!(!advances(Some(3), 3));
        assert!(!advances(Some(3), 5));
    }

    #[test]
    fn completed_checkpoint_has_no_resume_step() {
        let cp = Checkpoint::new("t1", 9, RunState::default(), Target::End);
        assert!(cp.is_completed());
        assert_eq!(cp.resume_step(), None);
    }
}
