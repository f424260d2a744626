//! Durable state: the validated credential pairs and the shared baseline schedule.
//!
//! Both live in one SQLite database. The connection is shared behind a mutex and every access
//! runs on the blocking thread pool, so request handlers never stall the async workers.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::model::{CredentialPair, EventKey, NormalizedEvent};

static SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS credentials (
        identifier   TEXT PRIMARY KEY NOT NULL,
        secret       TEXT NOT NULL,
        validated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS events (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       TEXT NOT NULL,
        start_ts    INTEGER NOT NULL,
        end_ts      INTEGER NOT NULL,
        summary     TEXT NOT NULL,
        description TEXT NOT NULL,
        location    TEXT NOT NULL,
        generation  INTEGER NOT NULL DEFAULT 0
    );
    CREATE UNIQUE INDEX IF NOT EXISTS events_key ON events (title, start_ts, end_ts);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (and if needed create) the database.
    ///
    /// `url` is a file path, optionally prefixed with `sqlite://`, or `:memory:`.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        let connection = Connection::open(path)?;
        connection.execute_batch(SCHEMA)?;
        debug!(path, "opened database");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore {
            database: self.clone(),
        }
    }

    pub fn events(&self) -> EventStore {
        EventStore {
            database: self.clone(),
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            // the connection stays usable after a panicking holder
            let connection = connection.lock().unwrap_or_else(PoisonError::into_inner);
            f(&connection).map_err(StoreError::from)
        })
        .await?
    }
}

/// Credential pairs that were accepted by Campus Dual at least once.
#[derive(Clone)]
pub struct CredentialStore {
    database: Database,
}

impl CredentialStore {
    pub async fn find(&self, identifier: &str) -> Result<Option<CredentialPair>, StoreError> {
        let identifier = identifier.to_string();
        self.database
            .with_connection(move |connection| {
                connection
                    .query_row(
                        "SELECT identifier, secret FROM credentials WHERE identifier = ?1",
                        params![identifier],
                        |row| Ok(CredentialPair::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                    )
                    .optional()
            })
            .await
    }

    /// Remember a validated pair. A different secret for a known identifier replaces the old one.
    pub async fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let pair = pair.clone();
        let validated_at = Utc::now().timestamp();
        self.database
            .with_connection(move |connection| {
                connection.execute(
                    "INSERT INTO credentials (identifier, secret, validated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(identifier) DO UPDATE SET
                        secret = excluded.secret,
                        validated_at = excluded.validated_at
                     WHERE secret <> excluded.secret",
                    params![pair.identifier, pair.secret, validated_at],
                )
            })
            .await?;
        Ok(())
    }
}

/// The baseline schedule, deduplicated on (title, start, end).
#[derive(Clone)]
pub struct EventStore {
    database: Database,
}

impl EventStore {
    /// Insert the events that are not known yet and return how many were inserted.
    ///
    /// Known events are left as they are, apart from being stamped with `generation`.
    pub async fn upsert_all(
        &self,
        events: Vec<NormalizedEvent>,
        generation: i64,
    ) -> Result<usize, StoreError> {
        self.database
            .with_connection(move |connection| {
                let mut insert = connection.prepare_cached(
                    "INSERT OR IGNORE INTO events
                        (title, start_ts, end_ts, summary, description, location, generation)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                let mut touch = connection.prepare_cached(
                    "UPDATE events SET generation = ?4
                     WHERE title = ?1 AND start_ts = ?2 AND end_ts = ?3",
                )?;
                let mut inserted = 0;
                for event in &events {
                    let key = &event.key;
                    let changed = insert.execute(params![
                        key.title,
                        key.start,
                        key.end,
                        event.summary,
                        event.description,
                        event.location,
                        generation
                    ])?;
                    if changed == 0 {
                        touch.execute(params![key.title, key.start, key.end, generation])?;
                    }
                    inserted += changed;
                }
                Ok(inserted)
            })
            .await
    }

    /// All stored events, earliest first.
    pub async fn list_all(&self) -> Result<Vec<NormalizedEvent>, StoreError> {
        self.database
            .with_connection(|connection| {
                let mut statement = connection.prepare_cached(
                    "SELECT title, start_ts, end_ts, summary, description, location
                     FROM events ORDER BY start_ts, title",
                )?;
                let rows = statement.query_map([], |row| {
                    let key = EventKey {
                        title: row.get(0)?,
                        start: row.get(1)?,
                        end: row.get(2)?,
                    };
                    NormalizedEvent::from_parts(key, row.get(3)?, row.get(4)?, row.get(5)?)
                        .map_err(|err| {
                            rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(err))
                        })
                })?;
                let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(events)
            })
            .await
    }

    /// Delete every event that was not seen in `generation`.
    pub async fn sweep_stale(&self, generation: i64) -> Result<usize, StoreError> {
        self.database
            .with_connection(move |connection| {
                connection.execute(
                    "DELETE FROM events WHERE generation <> ?1",
                    params![generation],
                )
            })
            .await
    }
}
