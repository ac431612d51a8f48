/// Schema for the partition store.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named cache partitions, in creation order
CREATE TABLE IF NOT EXISTS partitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored response snapshots
CREATE TABLE IF NOT EXISTS entries (
    partition_id INTEGER NOT NULL,
    entry_key TEXT NOT NULL,
    url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (partition_id, entry_key),
    FOREIGN KEY (partition_id) REFERENCES partitions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_key ON entries(entry_key);

-- Active worker registration (single row)
CREATE TABLE IF NOT EXISTS registration (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version TEXT NOT NULL,
    activated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
