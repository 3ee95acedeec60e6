//! Database module for the booking funnel
//!
//! Provides persistence for selection chains and button tokens, and read
//! access to the vehicle catalog.

mod schema;

pub use schema::*;

use crate::chain::{ChainError, ChatRef, SelectionChain, Step};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Chain not found: {0}")]
    ChainNotFound(i64),
    #[error("Chain {id} changed since version {expected}")]
    VersionConflict { id: i64, expected: i64 },
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

const CHAIN_COLUMNS: &str = "id, channel, channel_id, chat_id, city_id, brand_id, model_id,
    generation_id, specification_id, maintenance_id, finalized, owned_tokens, created_at, version";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run raw SQL, used by tests to seed the catalog
    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        Ok(())
    }

    // ==================== Chain Operations ====================

    /// Create a new, empty chain for a chat
    pub fn create_chain(&self, chat: &ChatRef) -> DbResult<SelectionChain> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO chains (channel, channel_id, chat_id, finalized, owned_tokens, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, '[]', 0, ?4, ?4)",
            params![chat.channel, chat.channel_id, chat.chat_id, now.to_rfc3339()],
        )?;

        Ok(SelectionChain::new(conn.last_insert_rowid(), chat.clone(), now))
    }

    /// Get chain by ID
    pub fn get_chain(&self, id: i64) -> DbResult<SelectionChain> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {CHAIN_COLUMNS} FROM chains WHERE id = ?1"))?;

        let row = stmt
            .query_row(params![id], parse_chain_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::ChainNotFound(id),
                other => DbError::Sqlite(other),
            })?;
        row.into_chain()
    }

    /// Persist a chain if nobody else wrote it since it was loaded.
    ///
    /// On success the chain's version is bumped to match the stored row.
    pub fn save_chain(&self, chain: &mut SelectionChain) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let s = chain.selections();
        let owned_tokens = serde_json::to_string(chain.owned_tokens())
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        let updated = conn.execute(
            "UPDATE chains SET city_id = ?1, brand_id = ?2, model_id = ?3, generation_id = ?4,
                    specification_id = ?5, maintenance_id = ?6, finalized = ?7, owned_tokens = ?8,
                    version = version + 1, updated_at = ?9
             WHERE id = ?10 AND version = ?11",
            params![
                s[0],
                s[1],
                s[2],
                s[3],
                s[4],
                s[5],
                chain.is_finalized(),
                owned_tokens,
                now.to_rfc3339(),
                chain.id(),
                chain.version(),
            ],
        )?;

        if updated == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chains WHERE id = ?1)",
                params![chain.id()],
                |row| row.get(0),
            )?;
            return Err(if exists {
                DbError::VersionConflict {
                    id: chain.id(),
                    expected: chain.version(),
                }
            } else {
                DbError::ChainNotFound(chain.id())
            });
        }

        chain.set_version(chain.version() + 1);
        Ok(())
    }

    /// List chains that are not finalized yet, oldest first.
    ///
    /// A row that fails to load comes back as its own `Err` so one bad
    /// record does not hide the rest.
    pub fn list_open_chains(&self) -> DbResult<Vec<DbResult<SelectionChain>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAIN_COLUMNS} FROM chains WHERE finalized = 0 ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt
            .query_map([], parse_chain_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(ChainRow::into_chain).collect())
    }

    // ==================== Token Cache Operations ====================

    /// Store a token payload, replacing any previous entry and its expiry
    pub fn put_token(&self, token: &str, payload: &str, expires_at: DateTime<Utc>) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO token_cache (token, payload, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(token) DO UPDATE SET payload = excluded.payload, expires_at = excluded.expires_at",
            params![token, payload, expires_at.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Get a live token payload; expired entries read as missing
    pub fn get_token(&self, token: &str, now: DateTime<Utc>) -> DbResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT payload FROM token_cache WHERE token = ?1 AND expires_at > ?2",
            params![token, now.timestamp_millis()],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Remove a token; missing tokens are not an error
    pub fn remove_token(&self, token: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM token_cache WHERE token = ?1", params![token])?;
        Ok(())
    }

    /// Drop every expired token, returning how many were removed
    pub fn purge_expired_tokens(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM token_cache WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    // ==================== Catalog Operations ====================

    pub fn list_cities(&self) -> DbResult<Vec<City>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, active FROM cities ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(City {
                id: row.get(0)?,
                name: row.get(1)?,
                active: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Brands sold in a city
    pub fn list_brands_in_city(&self, city_id: i64) -> DbResult<Vec<Brand>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT b.id, b.name, b.active FROM brands b
             JOIN brand_cities bc ON bc.brand_id = b.id
             WHERE bc.city_id = ?1 ORDER BY b.id",
        )?;
        let rows = stmt.query_map(params![city_id], |row| {
            Ok(Brand {
                id: row.get(0)?,
                name: row.get(1)?,
                active: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_models_of_brand(&self, brand_id: i64) -> DbResult<Vec<Model>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, brand_id, name, external_id, active FROM models WHERE brand_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![brand_id], |row| {
            Ok(Model {
                id: row.get(0)?,
                brand_id: row.get(1)?,
                name: row.get(2)?,
                external_id: row.get(3)?,
                active: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_generations_of_model(&self, model_id: i64) -> DbResult<Vec<Generation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, model_id, label, year_of_issue, active FROM generations WHERE model_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![model_id], |row| {
            Ok(Generation {
                id: row.get(0)?,
                model_id: row.get(1)?,
                label: row.get(2)?,
                year_of_issue: row.get(3)?,
                active: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_specifications_of_generation(
        &self,
        generation_id: i64,
    ) -> DbResult<Vec<Specification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, generation_id, full_name, engine_capacity, engine_power, active
             FROM specifications WHERE generation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![generation_id], |row| {
            Ok(Specification {
                id: row.get(0)?,
                generation_id: row.get(1)?,
                full_name: row.get(2)?,
                engine_capacity: row.get(3)?,
                engine_power: row.get(4)?,
                active: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_maintenances_of_specification(
        &self,
        specification_id: i64,
    ) -> DbResult<Vec<Maintenance>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, specification_id, number, distance, period, active
             FROM maintenances WHERE specification_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![specification_id], |row| {
            Ok(Maintenance {
                id: row.get(0)?,
                specification_id: row.get(1)?,
                number: row.get(2)?,
                distance: row.get(3)?,
                period: row.get(4)?,
                active: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Check whether a catalog entry exists for a step
    pub fn catalog_entry_exists(&self, step: Step, id: i64) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let table = CATALOG_TABLES[step.index()];
        let exists: bool = conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

/// Raw chain row before invariant checks
struct ChainRow {
    id: i64,
    chat: ChatRef,
    selections: [Option<i64>; Step::COUNT],
    finalized: bool,
    owned_tokens: String,
    created_at: String,
    version: i64,
}

impl ChainRow {
    fn into_chain(self) -> DbResult<SelectionChain> {
        let owned_tokens: BTreeSet<String> = serde_json::from_str(&self.owned_tokens)
            .map_err(|e| DbError::Corrupt(format!("chain {} owned_tokens: {e}", self.id)))?;

        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                DbError::Corrupt(format!(
                    "chain {} created_at {:?}: {e}",
                    self.id, self.created_at
                ))
            })?;

        SelectionChain::restore(
            self.id,
            self.chat,
            self.selections,
            self.finalized,
            owned_tokens,
            created_at,
            self.version,
        )
        .map_err(|e: ChainError| DbError::Corrupt(format!("chain {}: {e}", self.id)))
    }
}

fn parse_chain_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChainRow> {
    Ok(ChainRow {
        id: row.get(0)?,
        chat: ChatRef {
            channel: row.get(1)?,
            channel_id: row.get(2)?,
            chat_id: row.get(3)?,
        },
        selections: [
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
        ],
        finalized: row.get(10)?,
        owned_tokens: row.get(11)?,
        created_at: row.get(12)?,
        version: row.get(13)?,
    })
}
