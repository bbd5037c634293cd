// 🗄️ Entity Store - SQLite sink for emitted graph objects
//
// - entities: one row per entity id, full entity as JSON + fingerprint
// - runs:     one row per processed file (ledger of FileStats)
//
// Writes are idempotent upserts keyed by entity id: re-ingesting the same
// file leaves every row unchanged. Within one run, fragments of the same id
// are merged (property values unioned); the first write of an id in a new
// run replaces whatever an earlier run stored.

use crate::entities::Entity;
use crate::pipeline::{EntitySink, FileStats};
use crate::schema::Schema;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// Commit every N entities
pub const BATCH_SIZE: usize = 10_000;

/// What a run did to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

/// One row of the run ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub source_file: String,
    pub stats: FileStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            schema TEXT NOT NULL,
            data TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            run_id INTEGER NOT NULL,
            first_seen TEXT NOT NULL,
            last_changed TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_file TEXT NOT NULL,
            stats TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entities_schema ON entities(schema)",
        [],
    )?;

    Ok(())
}

pub struct EntityStore {
    conn: Connection,
    pending: usize,
    counts: StoreCounts,
    /// Rows carrying this id were written by the current run
    run_id: i64,
}

impl EntityStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        let run_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(run_id), 0) + 1 FROM entities",
            [],
            |row| row.get(0),
        )?;
        Ok(EntityStore {
            conn,
            pending: 0,
            counts: StoreCounts::default(),
            run_id,
        })
    }

    /// Drop every entity and run row
    pub fn reset(&mut self) -> Result<()> {
        self.commit()?;
        self.conn.execute_batch("DELETE FROM entities; DELETE FROM runs;")?;
        Ok(())
    }

    pub fn counts(&self) -> StoreCounts {
        self.counts
    }

    pub fn get(&self, id: &str) -> Result<Option<Entity>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM entities WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;

        data.map(|json| serde_json::from_str(&json).context("Corrupt entity row"))
            .transpose()
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Entity count per schema tag, sorted by schema
    pub fn count_by_schema(&self) -> Result<Vec<(Schema, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT schema, COUNT(*) FROM entities GROUP BY schema ORDER BY schema")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, count)| {
                Schema::from_name(&name)
                    .map(|schema| (schema, count))
                    .ok_or_else(|| anyhow!("Unknown schema tag in store: {}", name))
            })
            .collect()
    }

    /// Close the current run; later writes start a new one
    pub fn record_run(
        &mut self,
        source_file: &str,
        stats: &FileStats,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        self.commit()?;
        self.conn.execute(
            "INSERT INTO runs (source_file, stats, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source_file,
                serde_json::to_string(stats)?,
                started_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        self.run_id += 1;
        Ok(())
    }

    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_file, stats, started_at, finished_at FROM runs ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_file, stats, started_at, finished_at)| {
                Ok(RunRecord {
                    source_file,
                    stats: serde_json::from_str(&stats).context("Corrupt run stats")?,
                    started_at: parse_timestamp(&started_at)?,
                    finished_at: parse_timestamp(&finished_at)?,
                })
            })
            .collect()
    }

    fn begin(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.pending = 0;
        Ok(())
    }

    fn upsert(&mut self, entity: &Entity) -> Result<()> {
        let existing: Option<(String, String, i64)> = self
            .conn
            .query_row(
                "SELECT data, fingerprint, run_id FROM entities WHERE id = ?1",
                params![entity.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();

        let (data, fingerprint, run_id) = match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO entities (id, schema, data, fingerprint, run_id, first_seen, last_changed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![
                        entity.id,
                        entity.schema.name(),
                        serde_json::to_string(entity)?,
                        entity.fingerprint(),
                        self.run_id,
                        now,
                    ],
                )?;
                self.counts.inserted += 1;
                return Ok(());
            }
            Some(stored) => stored,
        };

        // Another fragment of this run is merged, an older run's row is replaced
        let row: Cow<Entity> = if run_id == self.run_id {
            let mut merged: Entity = serde_json::from_str(&data).context("Corrupt entity row")?;
            merged.merge(entity);
            Cow::Owned(merged)
        } else {
            Cow::Borrowed(entity)
        };
        let row_fingerprint = row.fingerprint();

        if row_fingerprint == fingerprint {
            if run_id != self.run_id {
                self.conn.execute(
                    "UPDATE entities SET run_id = ?2 WHERE id = ?1",
                    params![entity.id, self.run_id],
                )?;
            }
            self.counts.unchanged += 1;
            return Ok(());
        }

        self.conn.execute(
            "UPDATE entities SET data = ?2, fingerprint = ?3, run_id = ?4, last_changed = ?5
             WHERE id = ?1",
            params![
                entity.id,
                serde_json::to_string(&*row)?,
                row_fingerprint,
                self.run_id,
                now,
            ],
        )?;
        self.counts.updated += 1;

        Ok(())
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("Bad timestamp: {}", text))?
        .with_timezone(&Utc))
}

impl EntitySink for EntityStore {
    fn put(&mut self, entity: &Entity) -> Result<()> {
        self.begin()?;
        self.upsert(entity)
            .with_context(|| format!("Failed to store {}", entity.id))?;
        self.pending += 1;
        if self.pending >= BATCH_SIZE {
            self.commit()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.commit()
    }
}

// ============================================================================
// TESTS
// ============================================================================
