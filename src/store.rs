use crate::app_dirs::AppDirs;
use crate::gateway::{
    Diagnosis, GatewayError, PersistenceClient, SaveAck, SaveRequest, SessionIdentity,
};
use crate::scoring::Attempt;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        therapist_code TEXT NOT NULL,
        is_complete BOOLEAN NOT NULL,
        diagnosis TEXT,
        saved_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES sessions(session_id),
        seq INTEGER NOT NULL,
        word TEXT NOT NULL,
        input TEXT NOT NULL,
        correct BOOLEAN NOT NULL,
        time_spent_ms INTEGER NOT NULL,
        mistake_count INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_attempts_session ON attempts(session_id, seq);
    CREATE INDEX IF NOT EXISTS idx_sessions_therapist ON sessions(therapist_code);
"#;

/// A session as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub identity: SessionIdentity,
    pub is_complete: bool,
    pub diagnosis: Option<Diagnosis>,
    pub attempts: Vec<Attempt>,
    pub saved_at: DateTime<Utc>,
}

/// SQLite-backed persistence for finished and aborted sessions
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store at the default location
    pub fn open_default() -> Result<Self, GatewayError> {
        Self::open(AppDirs::db_path())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, GatewayError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, GatewayError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Replace whatever was stored for this session with the request, in one transaction
    pub fn write(&mut self, request: &SaveRequest) -> Result<SaveAck, GatewayError> {
        let saved_at = Utc::now();
        let diagnosis = request
            .diagnosis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let id = &request.identity;

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM attempts WHERE session_id = ?1",
            params![id.session_id],
        )?;
        tx.execute(
            r#"
            INSERT INTO sessions (session_id, username, therapist_code, is_complete, diagnosis, saved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(session_id) DO UPDATE SET
                username = excluded.username,
                therapist_code = excluded.therapist_code,
                is_complete = excluded.is_complete,
                diagnosis = excluded.diagnosis,
                saved_at = excluded.saved_at
            "#,
            params![
                id.session_id,
                id.username,
                id.therapist_code,
                request.is_complete,
                diagnosis,
                saved_at.to_rfc3339(),
            ],
        )?;
        for (seq, attempt) in request.attempts.iter().enumerate() {
            // returning early drops `tx`, which rolls the whole save back
            let time_spent_ms = i64::try_from(attempt.time_spent_ms).map_err(|_| {
                GatewayError::Storage(format!(
                    "time spent on \"{}\" is out of range: {} ms",
                    attempt.word, attempt.time_spent_ms
                ))
            })?;
            tx.execute(
                r#"
                INSERT INTO attempts
                (session_id, seq, word, input, correct, time_spent_ms, mistake_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    id.session_id,
                    seq as i64,
                    attempt.word,
                    attempt.input,
                    attempt.correct,
                    time_spent_ms,
                    attempt.mistake_count,
                ],
            )?;
        }
        tx.commit()?;

        info!(
            "stored session {} ({} attempts, complete: {})",
            id.session_id,
            request.attempts.len(),
            request.is_complete
        );
        Ok(SaveAck {
            session_id: id.session_id.clone(),
            attempts_saved: request.attempts.len(),
            saved_at,
        })
    }

    pub fn load(&self, session_id: &str) -> Result<Option<StoredSession>, GatewayError> {
        let header = self
            .conn
            .query_row(
                r#"
                SELECT session_id, username, therapist_code, is_complete, diagnosis, saved_at
                FROM sessions WHERE session_id = ?1
                "#,
                [session_id],
                |row| {
                    Ok((
                        SessionIdentity {
                            session_id: row.get(0)?,
                            username: row.get(1)?,
                            therapist_code: row.get(2)?,
                        },
                        row.get::<_, bool>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((identity, is_complete, diagnosis, saved_at)) = header else {
            return Ok(None);
        };

        let diagnosis = diagnosis
            .map(|text| serde_json::from_str::<Diagnosis>(&text))
            .transpose()?;
        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| GatewayError::Serialization(format!("bad saved_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(StoredSession {
            identity,
            is_complete,
            diagnosis,
            attempts: self.load_attempts(session_id)?,
            saved_at,
        }))
    }

    fn load_attempts(&self, session_id: &str) -> Result<Vec<Attempt>, GatewayError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT word, input, correct, time_spent_ms, mistake_count
            FROM attempts WHERE session_id = ?1
            ORDER BY seq
            "#,
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok(Attempt {
                word: row.get(0)?,
                input: row.get(1)?,
                correct: row.get(2)?,
                time_spent_ms: {
                    let ms: i64 = row.get(3)?;
                    u64::try_from(ms).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(3, ms))?
                },
                mistake_count: row.get(4)?,
            })
        })?;

        let mut attempts = Vec::new();
        for attempt in rows {
            attempts.push(attempt?);
        }
        Ok(attempts)
    }

    /// Session ids stored for a therapist, newest first
    pub fn list_sessions(&self, therapist_code: &str) -> Result<Vec<String>, GatewayError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id FROM sessions WHERE therapist_code = ?1 ORDER BY saved_at DESC",
        )?;
        let ids = stmt.query_map([therapist_code], |row| row.get(0))?;

        let mut out = Vec::new();
        for id in ids {
            out.push(id?);
        }
        Ok(out)
    }
}

impl PersistenceClient for SqliteStore {
    fn save(&mut self, request: &SaveRequest) -> Result<SaveAck, GatewayError> {
        self.write(request)
    }
}
