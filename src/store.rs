//! SQLite-backed session persistence.
//!
//! Holds the conversation store, intake record, and stage cursor for each
//! session so a `chat --session <id>` can resume where it left off. Each
//! save writes a full snapshot inside one transaction; the workflow state
//! is small enough that incremental writes would buy nothing.

use std::path::Path;

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::conversation::{Conversation, Role, Turn};
use crate::intake::{IntakeKey, IntakeRecord};
use crate::workflow::{Stage, Workflow};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id                TEXT PRIMARY KEY,
    stage             TEXT NOT NULL,
    awaiting_feedback INTEGER NOT NULL DEFAULT 0,
    idea              TEXT,
    driving_questions TEXT,
    final_output      TEXT,
    created_at        TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at        TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS turns (
    session_id TEXT NOT NULL,
    seq        INTEGER NOT NULL,
    role       TEXT NOT NULL,
    text       TEXT NOT NULL,
    PRIMARY KEY (session_id, seq)
);

CREATE TABLE IF NOT EXISTS answers (
    session_id TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (session_id, key)
);
"#;

/// One row of `pbl-coach sessions` output.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub stage: String,
    pub updated_at: String,
}

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self { conn };
        store.migrate()?;
        debug!(path = %path.display(), "session_store_opened");
        Ok(store)
    }

    /// Open the store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("com", "cmoel", "pbl-coach")
            .ok_or_else(|| anyhow!("could not determine data directory"))?;
        let db_path = dirs.data_dir().join("sessions.db");
        Self::open(&db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Write a full snapshot of the workflow state for `id`.
    pub fn save(&mut self, id: &str, workflow: &Workflow) -> Result<()> {
        let final_output = workflow
            .final_output()
            .map(serde_json::to_string)
            .transpose()?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO sessions (id, stage, awaiting_feedback, idea, driving_questions, final_output)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 stage = excluded.stage,
                 awaiting_feedback = excluded.awaiting_feedback,
                 idea = excluded.idea,
                 driving_questions = excluded.driving_questions,
                 final_output = excluded.final_output,
                 updated_at = datetime('now')",
            params![
                id,
                workflow.stage().as_str(),
                workflow.awaiting_feedback(),
                workflow.idea(),
                workflow.driving_questions(),
                final_output,
            ],
        )?;

        tx.execute("DELETE FROM turns WHERE session_id = ?1", params![id])?;
        for (seq, turn) in workflow.conversation().turns().iter().enumerate() {
            tx.execute(
                "INSERT INTO turns (session_id, seq, role, text) VALUES (?1, ?2, ?3, ?4)",
                params![id, seq as i64, turn.role.as_str(), turn.text],
            )?;
        }

        tx.execute("DELETE FROM answers WHERE session_id = ?1", params![id])?;
        for key in IntakeKey::ALL {
            if let Some(value) = workflow.intake().answer(key) {
                tx.execute(
                    "INSERT INTO answers (session_id, key, value) VALUES (?1, ?2, ?3)",
                    params![id, key.as_str(), value],
                )?;
            }
        }

        tx.commit()?;
        debug!(session_id = id, stage = workflow.stage().as_str(), "session_saved");
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<Workflow>> {
        let session = self
            .conn
            .query_row(
                "SELECT stage, awaiting_feedback, idea, driving_questions, final_output
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((stage_str, awaiting_feedback, idea, driving_questions, final_json)) = session
        else {
            return Ok(None);
        };

        let stage = Stage::from_str(&stage_str)
            .ok_or_else(|| anyhow!("session {id} has unknown stage {stage_str:?}"))?;

        let mut stmt = self
            .conn
            .prepare("SELECT role, text FROM turns WHERE session_id = ?1 ORDER BY seq")?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut turns = Vec::with_capacity(rows.len());
        for (role_str, text) in rows {
            let role = Role::from_str(&role_str)
                .ok_or_else(|| anyhow!("session {id} has unknown turn role {role_str:?}"))?;
            turns.push(Turn { role, text });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM answers WHERE session_id = ?1")?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut intake = IntakeRecord::new();
        for (key_str, value) in rows {
            match IntakeKey::from_str(&key_str) {
                Some(key) => intake.record(key, &value),
                None => warn!(key = %key_str, "unknown_intake_key_skipped"),
            }
        }

        let final_output = final_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Some(Workflow::from_parts(
            Conversation::from_turns(turns),
            intake,
            stage,
            awaiting_feedback,
            idea,
            driving_questions,
            final_output,
        )))
    }

    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, stage, updated_at FROM sessions ORDER BY updated_at DESC")?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(SessionSummary {
                    id: row.get(0)?,
                    stage: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM turns WHERE session_id = ?1", params![id])?;
        tx.execute("DELETE FROM answers WHERE session_id = ?1", params![id])?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }
}
