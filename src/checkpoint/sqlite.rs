//! SQLite-backed checkpoint store.
//!
//! One row per thread, overwritten with a single conditional upsert on every
//! save. The database runs in WAL mode with `synchronous=NORMAL`: a crash may
//! lose the last few commits but never leaves a half-written row.
//!
//! Thread leases live in the same file, so every process that opens it sees
//! them. A lease row names its owner and an expiry; an expired row is up for
//! grabs, which covers holders that died without releasing. Every save by
//! the holder pushes the expiry out again.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::{Checkpoint, CheckpointError, CheckpointStore, ThreadLease};
use crate::interrupt::InterruptPayload;
use crate::state::RunState;
use crate::step::Target;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(600);

pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
    lease_ttl: Duration,
}

impl SqliteCheckpointStore {
    /// Open (or create) a checkpoint database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened checkpoint database");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        Self::with_connection(conn)
    }

    /// A private in-memory database, mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CheckpointError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id  TEXT PRIMARY KEY,
                seq        INTEGER NOT NULL,
                next_step  TEXT NOT NULL,
                state      TEXT NOT NULL,
                interrupt  TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS thread_leases (
                thread_id  TEXT PRIMARY KEY,
                owner      TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            lease_ttl: DEFAULT_LEASE_TTL,
        })
    }

    /// How long a lease survives without a save from its holder.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    fn lease_expiry(&self) -> i64 {
        let ttl = i64::try_from(self.lease_ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_add(ttl)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let interrupt = checkpoint
            .interrupt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().map_err(|_| CheckpointError::Poisoned)?;
        let changed = conn.execute(
            r#"
            INSERT INTO checkpoints (thread_id, seq, next_step, state, interrupt, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(thread_id) DO UPDATE SET
                seq = excluded.seq,
                next_step = excluded.next_step,
                state = excluded.state,
                interrupt = excluded.interrupt,
                updated_at = excluded.updated_at
            WHERE checkpoints.seq = excluded.seq - 1
            "#,
            params![
                checkpoint.thread_id,
                checkpoint.seq as i64,
                checkpoint.next.as_str(),
                state,
                interrupt,
                checkpoint.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(CheckpointError::Conflict {
                thread_id: checkpoint.thread_id.clone(),
            });
        }

        conn.execute(
            "UPDATE thread_leases SET expires_at = ?2 WHERE thread_id = ?1",
            params![checkpoint.thread_id, self.lease_expiry()],
        )?;
        Ok(())
    }

    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let conn = self.conn.lock().map_err(|_| CheckpointError::Poisoned)?;
        let row = conn
            .query_row(
                r#"
                SELECT seq, next_step, state, interrupt, updated_at
                FROM checkpoints
                WHERE thread_id = ?1
                "#,
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((seq, next, state, interrupt, updated_at)) = row else {
            return Ok(None);
        };

        let corrupt = |reason: String| CheckpointError::Corrupt {
            thread_id: thread_id.to_string(),
            reason,
        };

        let next: Target = next.parse().map_err(corrupt)?;
        let state: RunState = serde_json::from_str(&state)?;
        let interrupt: Option<InterruptPayload> = interrupt
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);

        Ok(Some(Checkpoint {
            thread_id: thread_id.to_string(),
            seq: seq as u64,
            state,
            next,
            interrupt,
            updated_at,
        }))
    }

    fn try_lease(&self, thread_id: &str) -> Result<Option<ThreadLease>, CheckpointError> {
        let owner = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock().map_err(|_| CheckpointError::Poisoned)?;
        let acquired = conn.execute(
            r#"
            INSERT INTO thread_leases (thread_id, owner, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(thread_id) DO UPDATE SET
                owner = excluded.owner,
                expires_at = excluded.expires_at
            WHERE thread_leases.expires_at <= ?4
            "#,
            params![thread_id, owner, self.lease_expiry(), now_millis()],
        )?;
        drop(conn);

        if acquired == 0 {
            tracing::debug!(thread_id = %thread_id, "thread lease held elsewhere");
            return Ok(None);
        }

        let conn = Arc::clone(&self.conn);
        let key = thread_id.to_string();
        Ok(Some(ThreadLease::new(thread_id, move || {
            let conn = match conn.lock() {
                Ok(conn) => conn,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = conn.execute(
                "DELETE FROM thread_leases WHERE thread_id = ?1 AND owner = ?2",
                params![key, owner],
            ) {
                tracing::warn!(thread_id = %key, error = %e, "failed to release thread lease");
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::step::StepId;

    fn sample(thread_id: &str, seq: u64) -> Checkpoint {
        let mut state = RunState::for_theme("orbital cleanup");
        state.analysis_messages.push(Message::assistant("SWOT ..."));
        Checkpoint::new(thread_id, seq, state, Target::Step(StepId::Approval))
            .with_interrupt(InterruptPayload::approval_request(&[Message::assistant(
                "SWOT ...",
            )]))
    }

    #[test]
    fn load_unknown_thread_is_none() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        let cp = sample("t1", 1);
        store.save(&cp).unwrap();

        let loaded = store.load("t1").unwrap().unwrap();
        assert_eq!(loaded.state, cp.state);
        assert_eq!(loaded.next, cp.next);
        assert_eq!(loaded.interrupt, cp.interrupt);
        assert_eq!(loaded.seq, 1);
    }

    #[test]
    fn save_overwrites_previous_checkpoint() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save(&sample("t1", 1)).unwrap();

        let done = Checkpoint::new("t1", 2, RunState::default(), Target::End);
        store.save(&done).unwrap();

        let loaded = store.load("t1").unwrap().unwrap();
        assert_eq!(loaded.seq, 2);
        assert_eq!(loaded.next, Target::End);
        assert!(loaded.interrupt.is_none());
    }

    #[test]
    fn threads_are_independent() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save(&sample("a", 1)).unwrap();
        store
            .save(&Checkpoint::new("b", 7, RunState::default(), Target::End))
            .unwrap();

        assert_eq!(store.load("a").unwrap().unwrap().seq, 1);
        assert_eq!(store.load("b").unwrap().unwrap().seq, 7);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoints.sqlite");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.save(&sample("t1", 4)).unwrap();
        }

        let store = SqliteCheckpointStore::open(&path).unwrap();
        let loaded = store.load("t1").unwrap().unwrap();
        assert_eq!(loaded.seq, 4);
        assert!(loaded.is_interrupted());
    }

    #[test]
    fn unknown_next_step_is_reported_as_corrupt() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save(&sample("t1", 1)).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE checkpoints SET next_step = 'nowhere' WHERE thread_id = 't1'",
                [],
            )
            .unwrap();

        let err = store.load("t1").err().unwrap();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn stale_seq_is_a_conflict() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save(&sample("t1", 1)).unwrap();
        store.save(&sample("t1", 2)).unwrap();

        for seq in [2, 4] {
            let err = store
                .save(&Checkpoint::new("t1", seq, RunState::default(), Target::End))
                .err()
                .unwrap();
            assert!(matches!(err, CheckpointError::Conflict { .. }), "seq {seq}");
        }
        let loaded = store.load("t1").unwrap().unwrap();
        assert_eq!(loaded.seq, 2);
        assert!(loaded.is_interrupted());
    }

    #[test]
    fn lease_is_shared_between_stores_on_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.sqlite");
        let first = SqliteCheckpointStore::open(&path).unwrap();
        let second = SqliteCheckpointStore::open(&path).unwrap();

        let held = first.try_lease("t1").unwrap().unwrap();
        assert_eq!(held.thread_id(), "t1");
        assert!(second.try_lease("t1").unwrap().is_none());
        assert!(first.try_lease("t1").unwrap().is_none());
        assert!(second.try_lease("t2").unwrap().is_some());

        drop(held);
        assert!(second.try_lease("t1").unwrap().is_some());
    }

    #[test]
    fn expired_lease_can_be_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.sqlite");
        let crashed = SqliteCheckpointStore::open(&path)
            .unwrap()
            .with_lease_ttl(Duration::ZERO);
        let other = SqliteCheckpointStore::open(&path).unwrap();

        let stale = crashed.try_lease("t1").unwrap().unwrap();
        let taken = other.try_lease("t1").unwrap();
        assert!(taken.is_some());

        // The old holder's release must not free the new holder's lease.
        drop(stale);
        assert!(other.try_lease("t1").unwrap().is_none());
        drop(taken);
        assert!(other.try_lease("t1").unwrap().is_some());
    }

    #[test]
    fn save_extends_the_lease() {
        let store = SqliteCheckpointStore::open_in_memory()
            .unwrap()
            .with_lease_ttl(Duration::from_secs(3600));
        let _held = store.try_lease("t1").unwrap().unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE thread_leases SET expires_at = 0", [])
            .unwrap();

        store.save(&sample("t1", 1)).unwrap();
        assert!(store.try_lease("t1").unwrap().is_none());
    }

    #[test]
    fn concurrent_saves_on_distinct_threads() {
        let store = std::sync::Arc::new(SqliteCheckpointStore::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for seq in 1..=10 {
                        store.save(&sample(&format!("t{i}"), seq)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..8 {
            assert_eq!(store.load(&format!("t{i}")).unwrap().unwrap().seq, 10);
        }
    }
}
