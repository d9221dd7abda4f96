//! # SQLite Round Store
//!
//! Historical round storage backed by SQLite.
//!
//! Timestamps are stored as unix milliseconds so the plausibility window and
//! the recency cutoff can be evaluated in SQL. A sampler query is a single
//! bulk read: course/layout match, both timestamps present, duration inside
//! the window, newest first, `LIMIT sample_limit`.
//!
//! Participant names are stored as a MessagePack blob; they are only needed
//! after a round has qualified.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{CompletedRound, OptionExt, PaceError, PlausibilityWindow, Result, RoundSource};

/// SQLite-backed [`RoundSource`].
pub struct SqliteRoundStore {
    db: Connection,
}

/// A row as stored, before timestamp decoding.
struct StoredRound {
    round_id: String,
    course_id: String,
    layout: String,
    start_time: Option<i64>,
    completed_at: Option<i64>,
    participants: Vec<u8>,
}

impl SqliteRoundStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[RoundStore] Opened round store at {}", db_path);
        Ok(Self { db })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            -- Historical rounds (timestamps in unix milliseconds)
            CREATE TABLE IF NOT EXISTS completed_rounds (
                round_id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                layout TEXT NOT NULL,
                start_time INTEGER,
                completed_at INTEGER,
                participants BLOB NOT NULL
            );

            -- Sampler query: course + layout, newest first
            CREATE INDEX IF NOT EXISTS idx_completed_rounds_course
                ON completed_rounds(course_id, layout, completed_at);
        "#,
        )
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace a single round.
    pub fn upsert_round(&mut self, round: &CompletedRound) -> Result<()> {
        let participants = encode_participants(&round.participant_names)?;
        self.db.execute(
            "INSERT OR REPLACE INTO completed_rounds
             (round_id, course_id, layout, start_time, completed_at, participants)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                &round.round_id,
                &round.course_id,
                &round.layout,
                round.start_time.map(|t| t.timestamp_millis()),
                round.completed_at.map(|t| t.timestamp_millis()),
                participants,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace many rounds in one transaction.
    pub fn upsert_rounds(&mut self, rounds: &[CompletedRound]) -> Result<()> {
        let tx = self.db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO completed_rounds
                 (round_id, course_id, layout, start_time, completed_at, participants)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;

            for round in rounds {
                let participants = encode_participants(&round.participant_names)?;
                stmt.execute(params![
                    &round.round_id,
                    &round.course_id,
                    &round.layout,
                    round.start_time.map(|t| t.timestamp_millis()),
                    round.completed_at.map(|t| t.timestamp_millis()),
                    participants,
                ])?;
            }
        }
        tx.commit()?;

        debug!("[RoundStore] Upserted {} rounds", rounds.len());
        Ok(())
    }

    /// Remove a round. Returns whether it existed.
    pub fn remove_round(&mut self, round_id: &str) -> Result<bool> {
        let deleted = self.db.execute(
            "DELETE FROM completed_rounds WHERE round_id = ?",
            params![round_id],
        )?;
        Ok(deleted > 0)
    }

    /// Delete rounds completed before `cutoff`. Rounds without a completion
    /// time are kept. Returns the number deleted.
    pub fn prune_completed_before(&mut self, cutoff: DateTime<Utc>) -> Result<u32> {
        let deleted = self.db.execute(
            "DELETE FROM completed_rounds WHERE completed_at IS NOT NULL AND completed_at < ?",
            params![cutoff.timestamp_millis()],
        )?;

        if deleted > 0 {
            info!(
                "[RoundStore] Pruned {} rounds completed before {}",
                deleted,
                cutoff.to_rfc3339()
            );
        }
        Ok(deleted as u32)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn round_count(&self) -> Result<u32> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM completed_rounds", [], |row| row.get(0))?;
        Ok(count as u32)
    }

    pub fn get_round(&self, round_id: &str) -> Result<Option<CompletedRound>> {
        let stored = self
            .db
            .query_row(
                "SELECT round_id, course_id, layout, start_time, completed_at, participants
                 FROM completed_rounds WHERE round_id = ?",
                params![round_id],
                read_row,
            )
            .optional()?;

        stored.map(decode_round).transpose()
    }
}

impl RoundSource for SqliteRoundStore {
    fn completed_rounds(
        &self,
        course_id: &str,
        layout: &str,
        window: &PlausibilityWindow,
        limit: usize,
    ) -> Result<Vec<CompletedRound>> {
        let mut stmt = self.db.prepare_cached(
            "SELECT round_id, course_id, layout, start_time, completed_at, participants
             FROM completed_rounds
             WHERE course_id = ?1 AND layout = ?2
               AND start_time IS NOT NULL AND completed_at IS NOT NULL
               AND (completed_at - start_time) >= ?3
               AND (completed_at - start_time) < ?4
             ORDER BY completed_at DESC
             LIMIT ?5",
        )?;

        let stored = stmt
            .query_map(
                params![
                    course_id,
                    layout,
                    window.min_minutes * 60_000.0,
                    window.max_minutes * 60_000.0,
                    limit as i64,
                ],
                read_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(
            "[RoundStore] {} candidate rounds for {}/{}",
            stored.len(),
            course_id,
            layout
        );

        stored.into_iter().map(decode_round).collect()
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRound> {
    Ok(StoredRound {
        round_id: row.get(0)?,
        course_id: row.get(1)?,
        layout: row.get(2)?,
        start_time: row.get(3)?,
        completed_at: row.get(4)?,
        participants: row.get(5)?,
    })
}

fn decode_round(stored: StoredRound) -> Result<CompletedRound> {
    let participant_names: Vec<String> = rmp_serde::from_slice(&stored.participants)
        .map_err(|e| {
            PaceError::from_source(format!(
                "round {}: undecodable participants: {}",
                stored.round_id, e
            ))
        })?;

    Ok(CompletedRound {
        start_time: decode_timestamp(stored.start_time)?,
        completed_at: decode_timestamp(stored.completed_at)?,
        round_id: stored.round_id,
        course_id: stored.course_id,
        layout: stored.layout,
        participant_names,
    })
}

fn decode_timestamp(millis: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    millis
        .map(|ms| DateTime::from_timestamp_millis(ms).ok_or_internal("stored timestamp out of range"))
        .transpose()
}

fn encode_participants(names: &[String]) -> Result<Vec<u8>> {
    rmp_serde::to_vec(names).map_err(|e| PaceError::Internal {
        message: format!("failed to encode participants: {}", e),
    })
}
