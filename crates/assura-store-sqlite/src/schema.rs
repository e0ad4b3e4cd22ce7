//! SQL schema for the Assura SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The primary key is the uniqueness constraint identifier allocation
-- relies on: a colliding insert fails and the caller regenerates.
CREATE TABLE IF NOT EXISTS subjects (
    subject_id  TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,   -- 'person' | 'organization'
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    subject_id      TEXT PRIMARY KEY REFERENCES subjects(subject_id),
    given_name      TEXT,
    family_name     TEXT,
    nickname        TEXT,
    birthdate       TEXT,            -- YYYY-MM-DD
    gender          TEXT,
    email           TEXT,
    email_verified  INTEGER NOT NULL DEFAULT 0,
    phone_number    TEXT,
    phone_verified  INTEGER NOT NULL DEFAULT 0,
    verifying_agent TEXT,
    updated_at      TEXT NOT NULL
);

-- Ordered per-subject lists; `id` preserves insertion order.
CREATE TABLE IF NOT EXISTS addresses (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id),
    value_json  TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id),
    value_json  TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS affiliations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id),
    value_json  TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evidence (
    record_id            TEXT PRIMARY KEY,
    subject_id           TEXT NOT NULL REFERENCES subjects(subject_id),
    verifying_subject_id TEXT REFERENCES subjects(subject_id),
    action               TEXT NOT NULL,
    classification       TEXT NOT NULL DEFAULT '',   -- '' = not elevating
    evidence_type        TEXT NOT NULL DEFAULT '',
    proofing_mode        TEXT NOT NULL DEFAULT 'unspecified',
    details_json         TEXT NOT NULL,
    description          TEXT,
    note                 TEXT,
    expires_at           TEXT,                       -- YYYY-MM-DD
    verified_on          TEXT,                       -- YYYY-MM-DD
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

-- One row per save. Rows are only ever inserted; they disappear solely
-- when the whole evidence record is deleted.
CREATE TABLE IF NOT EXISTS evidence_history (
    record_id            TEXT NOT NULL REFERENCES evidence(record_id) ON DELETE CASCADE,
    sequence             INTEGER NOT NULL,
    subject_id           TEXT NOT NULL,
    verifying_subject_id TEXT,
    action               TEXT NOT NULL,
    description          TEXT,
    recorded_at          TEXT NOT NULL,
    PRIMARY KEY (record_id, sequence)
);

CREATE TRIGGER IF NOT EXISTS evidence_history_append_only
BEFORE UPDATE ON evidence_history
BEGIN
    SELECT RAISE(ABORT, 'evidence history is append-only');
END;

CREATE TABLE IF NOT EXISTS authenticators (
    credential_id TEXT PRIMARY KEY,
    subject_id    TEXT NOT NULL REFERENCES subjects(subject_id),
    name          TEXT NOT NULL DEFAULT '',
    registered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS upstream_assurance (
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id),
    provider    TEXT NOT NULL,
    aal         TEXT NOT NULL,   -- '1' | '2' | '3'
    amr_json    TEXT NOT NULL DEFAULT '[]',
    asserted_at TEXT NOT NULL,
    PRIMARY KEY (subject_id, provider)
);

CREATE INDEX IF NOT EXISTS subjects_kind_idx        ON subjects(kind);
CREATE INDEX IF NOT EXISTS addresses_subject_idx    ON addresses(subject_id);
CREATE INDEX IF NOT EXISTS documents_subject_idx    ON documents(subject_id);
CREATE INDEX IF NOT EXISTS affiliations_subject_idx ON affiliations(subject_id);
CREATE INDEX IF NOT EXISTS evidence_subject_idx     ON evidence(subject_id, created_at);
CREATE INDEX IF NOT EXISTS evidence_qualifying_idx
    ON evidence(subject_id, classification, expires_at);
CREATE INDEX IF NOT EXISTS authenticators_subject_idx ON authenticators(subject_id);

PRAGMA user_version = 1;
";
