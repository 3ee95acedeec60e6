//! Database schema and catalog record types

use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel TEXT NOT NULL,
    channel_id INTEGER NOT NULL,
    chat_id TEXT NOT NULL,
    city_id INTEGER,
    brand_id INTEGER,
    model_id INTEGER,
    generation_id INTEGER,
    specification_id INTEGER,
    maintenance_id INTEGER,
    finalized BOOLEAN NOT NULL DEFAULT 0,
    owned_tokens TEXT NOT NULL DEFAULT '[]',
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chains_open ON chains(finalized, created_at);
CREATE INDEX IF NOT EXISTS idx_chains_chat ON chains(channel, channel_id, chat_id);

CREATE TABLE IF NOT EXISTS token_cache (
    token TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_token_cache_expires ON token_cache(expires_at);

CREATE TABLE IF NOT EXISTS cities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS brands (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS brand_cities (
    brand_id INTEGER NOT NULL REFERENCES brands(id),
    city_id INTEGER NOT NULL REFERENCES cities(id),
    PRIMARY KEY (brand_id, city_id)
);

CREATE TABLE IF NOT EXISTS models (
    id INTEGER PRIMARY KEY,
    brand_id INTEGER NOT NULL REFERENCES brands(id),
    name TEXT NOT NULL,
    external_id TEXT,
    active BOOLEAN NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_models_brand ON models(brand_id);

CREATE TABLE IF NOT EXISTS generations (
    id INTEGER PRIMARY KEY,
    model_id INTEGER NOT NULL REFERENCES models(id),
    label TEXT NOT NULL,
    year_of_issue INTEGER NOT NULL,
    active BOOLEAN NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_generations_model ON generations(model_id);

CREATE TABLE IF NOT EXISTS specifications (
    id INTEGER PRIMARY KEY,
    generation_id INTEGER NOT NULL REFERENCES generations(id),
    full_name TEXT NOT NULL,
    engine_capacity INTEGER NOT NULL,
    engine_power INTEGER NOT NULL,
    active BOOLEAN NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_specifications_generation ON specifications(generation_id);

CREATE TABLE IF NOT EXISTS maintenances (
    id INTEGER PRIMARY KEY,
    specification_id INTEGER NOT NULL REFERENCES specifications(id),
    number INTEGER NOT NULL,
    distance INTEGER NOT NULL,
    period INTEGER NOT NULL,
    active BOOLEAN NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_maintenances_specification ON maintenances(specification_id);
";

/// Table holding the catalog entries for each step, in step order
pub const CATALOG_TABLES: [&str; 6] = [
    "cities",
    "brands",
    "models",
    "generations",
    "specifications",
    "maintenances",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    /// Reference in the partner booking system; models without one cannot
    /// be booked
    pub external_id: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub id: i64,
    pub model_id: i64,
    /// Full displayed label, e.g. "III (2016 - 2020)"
    pub label: String,
    pub year_of_issue: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub id: i64,
    pub generation_id: i64,
    pub full_name: String,
    /// Engine displacement in cm³
    pub engine_capacity: i32,
    /// Engine power in hp
    pub engine_power: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: i64,
    pub specification_id: i64,
    /// Sequence number of the service visit
    pub number: i32,
    /// Mileage in km
    pub distance: i32,
    /// Interval in years
    pub period: i32,
    pub active: bool,
}
