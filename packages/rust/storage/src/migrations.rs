//! SQL migration definitions for the errorpress database.
//!
//! Migrations are applied in order on database open. Each migration is a batch
//! of statements that records its own version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: sequence marker, items, dedup index",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Single-row high-water mark for sequence ids
CREATE TABLE IF NOT EXISTS sequence_marker (
    id           INTEGER PRIMARY KEY CHECK (id = 1),
    max_sequence INTEGER NOT NULL
);

INSERT OR IGNORE INTO sequence_marker (id, max_sequence) VALUES (1, 0);

-- Item registry; the full record lives in the slot's item.json
CREATE TABLE IF NOT EXISTS items (
    sequence_id INTEGER PRIMARY KEY,
    slug        TEXT NOT NULL UNIQUE,
    fingerprint TEXT NOT NULL,
    source      TEXT NOT NULL,
    state       TEXT NOT NULL,
    slot_dir    TEXT NOT NULL,
    publish_ref TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_state ON items(state);

-- Append-only dedup index
CREATE TABLE IF NOT EXISTS dedup_fingerprints (
    fingerprint TEXT PRIMARY KEY,
    sequence_id INTEGER,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dedup_titles (
    title       TEXT PRIMARY KEY,
    sequence_id INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Publish log and run history",
            sql: r#"
-- One row per item that the publisher acknowledged
CREATE TABLE IF NOT EXISTS publish_log (
    sequence_id  INTEGER PRIMARY KEY,
    remote_id    TEXT NOT NULL,
    remote_url   TEXT,
    status       TEXT NOT NULL,
    published_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
