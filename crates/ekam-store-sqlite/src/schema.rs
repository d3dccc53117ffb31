//! SQL schema for the Ekam SQLite stores.
//!
//! Executed at connection startup; idempotent thanks to `IF NOT EXISTS`.
//! Constraint and index names are stable so the schema migrator's `verify`
//! can match them across runs. Legacy stores created without these
//! constraints are brought up to date by `ekam-migrate`, never here.

/// Stable name of the unique index enforcing one row per normalized identity
/// number in each per-kind store. The migrator looks it up by this name.
pub const IDENTITY_UNIQUE_INDEX: &str = "idx_documents_identity_number_unique";

/// Registry store DDL: users, cross-references, and the migration audit
/// trail live together in one database.
pub const REGISTRY_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id                 TEXT PRIMARY KEY,
    primary_identity_number TEXT UNIQUE,     -- normalized; NULL for secondary-only users
    primary_name            TEXT NOT NULL,
    created_at              TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at              TEXT NOT NULL,
    document_count          INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_primary_identity_number_unique
    ON users(primary_identity_number);

-- One document of a given kind per user, enforced by the primary key.
CREATE TABLE IF NOT EXISTS cross_references (
    user_id       TEXT NOT NULL REFERENCES users(user_id),
    document_kind TEXT NOT NULL,             -- 'aadhaar' | 'pan'
    document_id   INTEGER NOT NULL,
    linked_at     TEXT NOT NULL,
    PRIMARY KEY (user_id, document_kind)
);

-- Append-style audit trail; rows are never deleted.
CREATE TABLE IF NOT EXISTS migration_runs (
    run_id           TEXT PRIMARY KEY,
    target           TEXT NOT NULL,
    operation        TEXT NOT NULL,
    mode             TEXT NOT NULL,          -- 'dry_run' | 'live'
    started_at       TEXT NOT NULL,
    completed_at     TEXT,
    backup_reference TEXT,
    status           TEXT NOT NULL,          -- 'pending' | 'succeeded' | 'failed' | 'rolled_back'
    summary          TEXT NOT NULL DEFAULT '{}'
);
";

/// Per-kind document store DDL. Identical for every kind; the connection
/// knows which kind it serves.
pub const DOCUMENTS_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS documents (
    document_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_number TEXT NOT NULL,           -- normalized
    fields_json     TEXT NOT NULL DEFAULT '{}',
    user_id         TEXT,                    -- NULL only on pre-migration rows
    ingested_at     TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_identity_number_unique
    ON documents(identity_number);
";
