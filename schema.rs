/// Base schema. Every statement is idempotent so it can run on each startup.
pub const SCHEMA: &str = r#"
-- Global tag list, independent of usage.
CREATE TABLE IF NOT EXISTS tags (
    tag TEXT PRIMARY KEY NOT NULL
);

-- One row per active media, keyed by content hash.
CREATE TABLE IF NOT EXISTS images (
    hash TEXT PRIMARY KEY NOT NULL,
    path TEXT NOT NULL UNIQUE,
    rotation INTEGER NOT NULL DEFAULT 0,
    type TEXT NOT NULL,
    hash_date INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS imgtags (
    hash TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (hash, tag)
);

-- Probe results; a row holds the whole metadata unit.
CREATE TABLE IF NOT EXISTS cached (
    hash TEXT PRIMARY KEY NOT NULL,
    width INTEGER,
    height INTEGER,
    length REAL,
    artist TEXT,
    album TEXT,
    title TEXT
);

-- Flags are encoded by row existence.
CREATE TABLE IF NOT EXISTS corrupted (
    hash TEXT PRIMARY KEY NOT NULL
);

CREATE TABLE IF NOT EXISTS priority_transcode (
    hash TEXT PRIMARY KEY NOT NULL
);

-- Tombstones. Append-only.
CREATE TABLE IF NOT EXISTS deleted (
    hash TEXT PRIMARY KEY NOT NULL,
    time INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS version (
    version INTEGER PRIMARY KEY NOT NULL
);
"#;

/// MIGRATION 1: lookup indexes.
pub const MIGRATION_0001: &str = r#"
CREATE INDEX IF NOT EXISTS idx_imgtags_tag ON imgtags (tag);
CREATE INDEX IF NOT EXISTS idx_images_path ON images (path);
"#;

/// MIGRATION 2: finish removals interrupted after the tombstone was written.
pub const MIGRATION_0002: &str = r#"
DELETE FROM imgtags WHERE hash IN (SELECT hash FROM deleted);
DELETE FROM cached WHERE hash IN (SELECT hash FROM deleted);
DELETE FROM priority_transcode WHERE hash IN (SELECT hash FROM deleted);
DELETE FROM corrupted WHERE hash IN (SELECT hash FROM deleted);
DELETE FROM images WHERE hash IN (SELECT hash FROM deleted);
"#;

/// Ordered by version; the stored version is the last one applied.
pub const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_0001), (2, MIGRATION_0002)];

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|(version, _)| *version).unwrap_or(0)
}
