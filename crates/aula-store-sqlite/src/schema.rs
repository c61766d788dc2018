//! SQL schema for the Aula SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated
//! on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Directory tables are owned by the external admin collaborator; the
-- core only reads them.
CREATE TABLE IF NOT EXISTS identities (
    identity_id  TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    credential   TEXT UNIQUE          -- NULL until the admin assigns one
);

CREATE TABLE IF NOT EXISTS rooms (
    room_id      TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    device_id    TEXT NOT NULL UNIQUE,
    device_token TEXT NOT NULL,
    active       INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS schedules (
    schedule_id TEXT PRIMARY KEY,
    identity_id TEXT NOT NULL REFERENCES identities(identity_id),
    room_id     TEXT NOT NULL REFERENCES rooms(room_id),
    weekday     INTEGER NOT NULL,     -- 0 = Monday ... 6 = Sunday
    start_time  TEXT NOT NULL,        -- HH:MM:SS
    end_time    TEXT NOT NULL,
    UNIQUE (identity_id, room_id, weekday, start_time)
);

-- One row per presence window; mutated in place only by the validator
-- (at creation) and the sweeper (active -> auto_closed). Never deleted.
CREATE TABLE IF NOT EXISTS attendance_sessions (
    session_id      TEXT PRIMARY KEY,
    identity_id     TEXT NOT NULL REFERENCES identities(identity_id),
    room_id         TEXT NOT NULL REFERENCES rooms(room_id),
    date            TEXT NOT NULL,    -- YYYY-MM-DD
    started_at      TEXT NOT NULL,    -- RFC 3339 UTC
    ended_at        TEXT,
    expected_end    TEXT,
    status          TEXT NOT NULL,    -- 'active' | 'auto_closed' | 'invalid'
    credential_used TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

-- The single-active invariant: the compare-and-swap boundary between
-- concurrent scan handlers for the same (identity, room, date).
CREATE UNIQUE INDEX IF NOT EXISTS sessions_one_active_idx
    ON attendance_sessions(identity_id, room_id, date)
    WHERE status = 'active';

CREATE INDEX IF NOT EXISTS sessions_date_idx   ON attendance_sessions(date);
CREATE INDEX IF NOT EXISTS sessions_room_idx   ON attendance_sessions(room_id);
CREATE INDEX IF NOT EXISTS sessions_status_idx ON attendance_sessions(status);

-- The energy ledger is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS power_samples (
    sample_id   TEXT PRIMARY KEY,
    room_id     TEXT NOT NULL REFERENCES rooms(room_id),
    watts       REAL NOT NULL,
    observed_at TEXT NOT NULL,        -- RFC 3339 UTC
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS samples_room_observed_idx
    ON power_samples(room_id, observed_at);

-- Derived rollups; recomputable from power_samples.
CREATE TABLE IF NOT EXISTS energy_buckets (
    room_id      TEXT NOT NULL REFERENCES rooms(room_id),
    granularity  TEXT NOT NULL,       -- 'hour' | 'day' | 'month'
    period_start TEXT NOT NULL,       -- RFC 3339 UTC
    total_kwh    REAL NOT NULL,
    avg_watts    REAL NOT NULL,
    max_watts    REAL NOT NULL,
    min_watts    REAL NOT NULL,
    sample_count INTEGER NOT NULL,
    PRIMARY KEY (room_id, granularity, period_start)
);

PRAGMA user_version = 1;
";
