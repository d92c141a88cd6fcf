//! Reveal record persistence.
//!
//! The store owns the one uniqueness constraint of the protocol: at most
//! one pending reveal per conversation, enforced here (partial unique
//! index) rather than in the coordinator. Records are never deleted;
//! retention is an operational concern outside the core.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use crate::error::StoreError;
use crate::reveal::{Reveal, RevealStage, RevealStatus};

/// Persistence seam for reveal records.
pub trait RevealStore: Send + Sync {
    /// Insert or update a record.
    ///
    /// Returns `StoreError::DuplicateActive` when inserting a pending
    /// record for a conversation that already has one.
    fn persist(&self, reveal: &Reveal) -> Result<(), StoreError>;

    fn load(&self, reveal_id: &str) -> Result<Option<Reveal>, StoreError>;

    /// The conversation's pending reveal, if any.
    fn load_active_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Reveal>, StoreError>;
}

fn stage_str(stage: RevealStage) -> &'static str {
    match stage {
        RevealStage::Preparation => "preparation",
        RevealStage::Intention => "intention",
        RevealStage::MutualReadiness => "mutual_readiness",
        RevealStage::Countdown => "countdown",
        RevealStage::Reveal => "reveal",
        RevealStage::Integration => "integration",
    }
}

fn parse_stage(s: &str) -> Option<RevealStage> {
    match s {
        "preparation" => Some(RevealStage::Preparation),
        "intention" => Some(RevealStage::Intention),
        "mutual_readiness" => Some(RevealStage::MutualReadiness),
        "countdown" => Some(RevealStage::Countdown),
        "reveal" => Some(RevealStage::Reveal),
        "integration" => Some(RevealStage::Integration),
        _ => None,
    }
}

fn status_str(status: RevealStatus) -> &'static str {
    match status {
        RevealStatus::Pending => "pending",
        RevealStatus::Completed => "completed",
        RevealStatus::Declined => "declined",
        RevealStatus::NotReady => "not_ready",
        RevealStatus::Paused => "paused",
        RevealStatus::Aborted => "aborted",
        RevealStatus::Timeout => "timeout",
    }
}

fn parse_status(s: &str) -> Option<RevealStatus> {
    match s {
        "pending" => Some(RevealStatus::Pending),
        "completed" => Some(RevealStatus::Completed),
        "declined" => Some(RevealStatus::Declined),
        "not_ready" => Some(RevealStatus::NotReady),
        "paused" => Some(RevealStatus::Paused),
        "aborted" => Some(RevealStatus::Aborted),
        "timeout" => Some(RevealStatus::Timeout),
        _ => None,
    }
}

/// Raw row image; converted to a `Reveal` outside the rusqlite closure so
/// decode failures surface as `CorruptRecord`, not query errors.
struct RawReveal {
    id: String,
    conversation_id: String,
    requester_id: String,
    target_id: String,
    stage: String,
    status: String,
    readiness_score: f64,
    requester_intention: Option<String>,
    target_intention: Option<String>,
    requester_ready: Option<bool>,
    target_ready: Option<bool>,
    stage_deadline: String,
    created_at: String,
    revealed_at: Option<String>,
    completed_at: Option<String>,
}

impl RawReveal {
    fn into_reveal(self) -> Result<Reveal, StoreError> {
        let corrupt = |message: String| StoreError::CorruptRecord {
            id: self.id.clone(),
            message,
        };
        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("bad timestamp '{s}': {e}"))
        };

        let stage =
            parse_stage(&self.stage).ok_or_else(|| corrupt(format!("unknown stage '{}'", self.stage)))?;
        let status = parse_status(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let stage_deadline = parse_ts(&self.stage_deadline).map_err(&corrupt)?;
        let created_at = parse_ts(&self.created_at).map_err(&corrupt)?;
        let revealed_at = match &self.revealed_at {
            Some(s) => Some(parse_ts(s).map_err(&corrupt)?),
            None => None,
        };
        let completed_at = match &self.completed_at {
            Some(s) => Some(parse_ts(s).map_err(&corrupt)?),
            None => None,
        };

        Ok(Reveal {
            id: self.id,
            conversation_id: self.conversation_id,
            requester_id: self.requester_id,
            target_id: self.target_id,
            stage,
            status,
            readiness_score_at_admission: self.readiness_score,
            requester_intention: self.requester_intention,
            target_intention: self.target_intention,
            requester_ready: self.requester_ready,
            target_ready: self.target_ready,
            stage_deadline,
            created_at,
            revealed_at,
            completed_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, conversation_id, requester_id, target_id, stage, status, \
     readiness_score, requester_intention, target_intention, requester_ready, target_ready, \
     stage_deadline, created_at, revealed_at, completed_at";

fn read_raw(row: &rusqlite::Row<'_>) -> Result<RawReveal, rusqlite::Error> {
    Ok(RawReveal {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        requester_id: row.get(2)?,
        target_id: row.get(3)?,
        stage: row.get(4)?,
        status: row.get(5)?,
        readiness_score: row.get(6)?,
        requester_intention: row.get(7)?,
        target_intention: row.get(8)?,
        requester_ready: row.get(9)?,
        target_ready: row.get(10)?,
        stage_deadline: row.get(11)?,
        created_at: row.get(12)?,
        revealed_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

/// SQLite-backed reveal store.
pub struct SqliteRevealStore {
    conn: Mutex<Connection>,
}

impl SqliteRevealStore {
    /// Open the store at `~/.config/unveil/unveil.db`.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("unveil.db"))
    }

    /// Open the store at an explicit path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (tests, CLI dry runs).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryFailed("store lock poisoned".into()))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS reveals (
                    id                  TEXT PRIMARY KEY,
                    conversation_id     TEXT NOT NULL,
                    requester_id        TEXT NOT NULL,
                    target_id           TEXT NOT NULL,
                    stage               TEXT NOT NULL,
                    status              TEXT NOT NULL,
                    readiness_score     REAL NOT NULL,
                    requester_intention TEXT,
                    target_intention    TEXT,
                    requester_ready     INTEGER,
                    target_ready        INTEGER,
                    stage_deadline      TEXT NOT NULL,
                    created_at          TEXT NOT NULL,
                    revealed_at         TEXT,
                    completed_at        TEXT
                );

                -- The protocol's uniqueness invariant: one pending reveal
                -- per conversation.
                CREATE UNIQUE INDEX IF NOT EXISTS idx_reveals_pending
                    ON reveals(conversation_id) WHERE status = 'pending';

                CREATE INDEX IF NOT EXISTS idx_reveals_conversation
                    ON reveals(conversation_id);
                CREATE INDEX IF NOT EXISTS idx_reveals_requester_created
                    ON reveals(requester_id, created_at);",
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))
    }

    /// Reveals this user has requested today (UTC). Feeds the CLI's usage
    /// source.
    pub fn requested_today(&self, user_id: &str) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM reveals
             WHERE requester_id = ?1
               AND substr(created_at, 1, 10) = strftime('%Y-%m-%d', 'now')",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl RevealStore for SqliteRevealStore {
    fn persist(&self, reveal: &Reveal) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO reveals (id, conversation_id, requester_id, target_id, stage, status,
                 readiness_score, requester_intention, target_intention, requester_ready,
                 target_ready, stage_deadline, created_at, revealed_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                 stage = excluded.stage,
                 status = excluded.status,
                 requester_intention = excluded.requester_intention,
                 target_intention = excluded.target_intention,
                 requester_ready = excluded.requester_ready,
                 target_ready = excluded.target_ready,
                 stage_deadline = excluded.stage_deadline,
                 revealed_at = excluded.revealed_at,
                 completed_at = excluded.completed_at",
            params![
                reveal.id,
                reveal.conversation_id,
                reveal.requester_id,
                reveal.target_id,
                stage_str(reveal.stage),
                status_str(reveal.status),
                reveal.readiness_score_at_admission,
                reveal.requester_intention,
                reveal.target_intention,
                reveal.requester_ready,
                reveal.target_ready,
                reveal.stage_deadline.to_rfc3339(),
                reveal.created_at.to_rfc3339(),
                reveal.revealed_at.map(|t| t.to_rfc3339()),
                reveal.completed_at.map(|t| t.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // The only remaining constraint is the pending-per-
                // conversation index; id conflicts resolve via the upsert.
                Err(StoreError::DuplicateActive {
                    conversation_id: reveal.conversation_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self, reveal_id: &str) -> Result<Option<Reveal>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM reveals WHERE id = ?1"),
                params![reveal_id],
                read_raw,
            )
            .optional()?;
        drop(conn);
        raw.map(RawReveal::into_reveal).transpose()
    }

    fn load_active_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Reveal>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM reveals
                     WHERE conversation_id = ?1 AND status = 'pending'"
                ),
                params![conversation_id],
                read_raw,
            )
            .optional()?;
        drop(conn);
        raw.map(RawReveal::into_reveal).transpose()
    }
}

/// In-memory reveal store for tests.
#[derive(Debug, Default)]
pub struct MemoryRevealStore {
    records: Mutex<HashMap<String, Reveal>>,
}

impl MemoryRevealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevealStore for MemoryRevealStore {
    fn persist(&self, reveal: &Reveal) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::QueryFailed("store lock poisoned".into()))?;
        if reveal.status == RevealStatus::Pending {
            let duplicate = records.values().any(|existing| {
                existing.conversation_id == reveal.conversation_id
                    && existing.status == RevealStatus::Pending
                    && existing.id != reveal.id
            });
            if duplicate {
                return Err(StoreError::DuplicateActive {
                    conversation_id: reveal.conversation_id.clone(),
                });
            }
        }
        records.insert(reveal.id.clone(), reveal.clone());
        Ok(())
    }

    fn load(&self, reveal_id: &str) -> Result<Option<Reveal>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::QueryFailed("store lock poisoned".into()))?;
        Ok(records.get(reveal_id).cloned())
    }

    fn load_active_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Reveal>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::QueryFailed("store lock poisoned".into()))?;
        Ok(records
            .values()
            .find(|r| r.conversation_id == conversation_id && r.status == RevealStatus::Pending)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_reveal(conversation: &str) -> Reveal {
        Reveal::new(conversation, "amelie", "juno", 0.82, Duration::seconds(300))
    }

    fn stores() -> Vec<Box<dyn RevealStore>> {
        vec![
            Box::new(MemoryRevealStore::new()),
            Box::new(SqliteRevealStore::open_memory().unwrap()),
        ]
    }

    #[test]
    fn persist_and_load_round_trip() {
        for store in stores() {
            let mut reveal = make_reveal("conv-1");
            reveal.requester_intention = Some("to be seen".into());
            reveal.requester_ready = Some(true);
            store.persist(&reveal).unwrap();

            let loaded = store.load(&reveal.id).unwrap().unwrap();
            assert_eq!(loaded.conversation_id, "conv-1");
            assert_eq!(loaded.stage, RevealStage::Preparation);
            assert_eq!(loaded.status, RevealStatus::Pending);
            assert_eq!(loaded.requester_intention.as_deref(), Some("to be seen"));
            assert_eq!(loaded.requester_ready, Some(true));
            assert_eq!(loaded.target_ready, None);
            assert!((loaded.readiness_score_at_admission - 0.82).abs() < 1e-9);
            assert_eq!(
                loaded.stage_deadline.timestamp(),
                reveal.stage_deadline.timestamp()
            );
        }
    }

    #[test]
    fn unknown_id_loads_none() {
        for store in stores() {
            assert!(store.load("missing").unwrap().is_none());
        }
    }

    #[test]
    fn second_pending_reveal_for_conversation_is_rejected() {
        for store in stores() {
            store.persist(&make_reveal("conv-1")).unwrap();
            let second = store.persist(&make_reveal("conv-1"));
            assert!(matches!(
                second,
                Err(StoreError::DuplicateActive { .. })
            ));
        }
    }

    #[test]
    fn updating_the_same_record_is_not_a_duplicate() {
        for store in stores() {
            let mut reveal = make_reveal("conv-1");
            store.persist(&reveal).unwrap();
            reveal.enter_stage(RevealStage::Intention, Duration::seconds(180));
            store.persist(&reveal).unwrap();

            let loaded = store.load(&reveal.id).unwrap().unwrap();
            assert_eq!(loaded.stage, RevealStage::Intention);
        }
    }

    #[test]
    fn terminal_record_frees_the_conversation() {
        for store in stores() {
            let mut first = make_reveal("conv-1");
            store.persist(&first).unwrap();
            first.status = RevealStatus::Declined;
            store.persist(&first).unwrap();

            store.persist(&make_reveal("conv-1")).unwrap();
            let active = store.load_active_by_conversation("conv-1").unwrap().unwrap();
            assert_ne!(active.id, first.id);
        }
    }

    #[test]
    fn active_lookup_ignores_other_conversations() {
        for store in stores() {
            store.persist(&make_reveal("conv-1")).unwrap();
            assert!(store
                .load_active_by_conversation("conv-2")
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unveil.db");

        let reveal = make_reveal("conv-1");
        {
            let store = SqliteRevealStore::open_at(&path).unwrap();
            store.persist(&reveal).unwrap();
        }

        let reopened = SqliteRevealStore::open_at(&path).unwrap();
        let loaded = reopened.load(&reveal.id).unwrap().unwrap();
        assert_eq!(loaded.conversation_id, "conv-1");
        assert_eq!(loaded.status, RevealStatus::Pending);
    }

    #[test]
    fn requested_today_counts_only_this_requester() {
        let store = SqliteRevealStore::open_memory().unwrap();
        store.persist(&make_reveal("conv-1")).unwrap();
        store.persist(&make_reveal("conv-2")).unwrap();
        let other = Reveal::new("conv-3", "juno", "amelie", 0.9, Duration::seconds(300));
        store.persist(&other).unwrap();

        assert_eq!(store.requested_today("amelie").unwrap(), 2);
        assert_eq!(store.requested_today("juno").unwrap(), 1);
        assert_eq!(store.requested_today("nobody").unwrap(), 0);
    }
}
