//! SQLite sink implementation
//!
//! Stores parents and replies keyed by identity, plus a row per run.

use crate::crawler::{merge, MergedOutput};
use crate::model::{Parent, Position, Reply};
use crate::output::schema::initialize_schema;
use crate::output::traits::{OutputError, OutputResult, RunRecord, RunStatus, Sink};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::path::Path;

/// SQLite-backed sink
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the export database
    pub fn open(path: &Path) -> OutputResult<Self> {
        let conn = Connection::open(path)?;

        // Writes must be durable before progress moves past them
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_replies(&self) -> OutputResult<Vec<Reply>> {
        let mut stmt = self
            .conn
            .prepare("SELECT parent_identity, position, payload FROM replies")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut replies = Vec::new();
        for row in rows {
            let (parent_identity, position, payload) = row?;
            replies.push(Reply {
                parent_identity,
                position: Position::new(position),
                payload: decode_payload(&payload)?,
            });
        }
        Ok(replies)
    }

}

impl Sink for SqliteSink {
    fn parents(&self) -> OutputResult<Vec<Parent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identity, position, reply_count, permalink, payload FROM parents")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut parents = Vec::new();
        for row in rows {
            let (identity, position, reply_count, permalink, payload) = row?;
            parents.push(Parent {
                identity,
                position: Position::new(position),
                reply_count: reply_count.max(0) as u64,
                permalink,
                payload: decode_payload(&payload)?,
            });
        }

        Ok(merge(parents, Vec::new()).parents)
    }

    fn write_parents(&mut self, parents: &[Parent]) -> OutputResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO parents (identity, position, reply_count, permalink, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identity) DO UPDATE SET
                    position = excluded.position,
                    reply_count = excluded.reply_count,
                    permalink = excluded.permalink,
                    payload = excluded.payload",
            )?;
            for parent in parents {
                stmt.execute(params![
                    parent.identity,
                    parent.position.as_str(),
                    parent.reply_count as i64,
                    parent.permalink,
                    serde_json::to_string(&parent.payload)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_replies(&mut self, parent_identity: &str, replies: &[Reply]) -> OutputResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM replies WHERE parent_identity = ?1",
            params![parent_identity],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO replies (parent_identity, position, payload)
                 VALUES (?1, ?2, ?3)",
            )?;
            for reply in replies {
                stmt.execute(params![
                    parent_identity,
                    reply.position.as_str(),
                    serde_json::to_string(&reply.payload)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn merged(&self) -> OutputResult<MergedOutput> {
        Ok(merge(self.parents()?, self.load_replies()?))
    }

    fn record_run(&mut self, run: &RunRecord) -> OutputResult<()> {
        self.conn.execute(
            "INSERT INTO runs (started_at, finished_at, config_hash, status,
                parents_fetched, replies_fetched, failures)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.started_at,
                run.finished_at,
                run.config_hash,
                run.status.to_db_string(),
                run.parents_fetched as i64,
                run.replies_fetched as i64,
                run.failures as i64,
            ],
        )?;
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> OutputResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT started_at, finished_at, config_hash, status,
                parents_fetched, replies_fetched, failures
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (started_at, finished_at, config_hash, status, parents, replies, failures) = row?;
            let status = RunStatus::from_db_string(&status).ok_or_else(|| OutputError::Corrupt {
                path: "runs".to_string(),
                message: format!("unknown run status '{}'", status),
            })?;
            runs.push(RunRecord {
                started_at,
                finished_at,
                config_hash,
                status,
                parents_fetched: parents.max(0) as u64,
                replies_fetched: replies.max(0) as u64,
                failures: failures.max(0) as u64,
            });
        }
        Ok(runs)
    }
}

fn decode_payload(raw: &str) -> OutputResult<Map<String, Value>> {
    Ok(serde_json::from_str(raw)?)
}
