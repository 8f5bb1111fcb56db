/// Inline SQL migrations for the statline database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: jobs table. Failed rows are kept and resurrected in
    // place, so this table only grows with distinct keys, not attempts.
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id         TEXT PRIMARY KEY,
    key        TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    total      INTEGER,
    processed  INTEGER,
    error      TEXT,
    result     TEXT
);
"#,
    // Migration 2: secondary index for key lookups. Not UNIQUE: duplicate
    // rows per key are legal (benign create race, failed rows kept) and
    // are resolved deterministically at read time.
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_key ON jobs(key, created_at DESC);"#,
];
