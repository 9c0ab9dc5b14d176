use std::collections::HashMap;
use std::sync::Mutex;

use super::{Checkpoint, CheckpointError, CheckpointStore, ThreadLease, ThreadLeases, advances};

/// Process-local store. Nothing survives a restart; use it for tests and
/// throwaway runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<String, Checkpoint>>,
    leases: ThreadLeases,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut entries = self.entries.lock().map_err(|_| CheckpointError::Poisoned)?;
        let stored = entries.get(&checkpoint.thread_id).map(|cp| cp.seq);
        if !advances(stored, checkpoint.seq) {
            return Err(CheckpointError::Conflict {
                thread_id: checkpoint.thread_id.clone(),
            });
        }
        entries.insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let entries = self.entries.lock().map_err(|_| CheckpointError::Poisoned)?;
        Ok(entries.get(thread_id).cloned())
    }

    fn try_lease(&self, thread_id: &str) -> Result<Option<ThreadLease>, CheckpointError> {
        self.leases.try_acquire(thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunState;
    use crate::step::Target;

    #[test]
    fn overwrite_keeps_one_entry_per_thread() {
        let store = MemoryCheckpointStore::new();
        assert!(store.is_empty());

        store
            .save(&Checkpoint::new("t1", 1, RunState::default(), Target::End))
            .unwrap();
        store
            .save(&Checkpoint::new("t1", 2, RunState::default(), Target::End))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load("t1").unwrap().unwrap().seq, 2);
        assert!(store.load("t2").unwrap().is_none());
    }

    #[test]
    fn stale_save_is_a_conflict() {
        let store = MemoryCheckpointStore::new();
        store
            .save(&Checkpoint::new("t1", 1, RunState::default(), Target::End))
            .unwrap();
        store
            .save(&Checkpoint::new("t1", 2, RunState::default(), Target::End))
            .unwrap();

        // A second writer that also loaded seq 1 tries to write seq 2.
        let err = store
            .save(&Checkpoint::new("t1", 2, RunState::for_theme("x"), Target::End))
            .err()
            .unwrap();
        assert!(matches!(err, CheckpointError::Conflict { thread_id } if thread_id == "t1"));
        assert_eq!(store.load("t1").unwrap().unwrap().state, RunState::default());
    }

    #[test]
    fn lease_is_exclusive_per_thread() {
        let store = MemoryCheckpointStore::new();
        let held = store.try_lease("t1").unwrap().unwrap();
        assert!(store.try_lease("t1").unwrap().is_none());
        assert!(store.try_lease("t2").unwrap().is_some());
        drop(held);
        assert!(store.try_lease("t1").unwrap().is_some());
    }
}
