use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS programs (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY,
    program_id INTEGER NOT NULL,
    vendor TEXT NOT NULL,
    description TEXT,
    category TEXT,
    planned_amount REAL NOT NULL,
    planned_date TEXT NOT NULL,
    actual_amount REAL,
    actual_date TEXT,
    invoice_link_url TEXT,
    invoice_link_text TEXT,
    notes TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (program_id) REFERENCES programs(id)
);

CREATE TABLE IF NOT EXISTS import_sessions (
    id INTEGER PRIMARY KEY,
    program_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    mapping TEXT NOT NULL,
    checksum TEXT,
    total_rows INTEGER DEFAULT 0,
    processed_rows INTEGER DEFAULT 0,
    matched_rows INTEGER DEFAULT 0,
    unmatched_rows INTEGER DEFAULT 0,
    error_rows INTEGER DEFAULT 0,
    skipped_rows INTEGER DEFAULT 0,
    replaced_by_session_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (program_id) REFERENCES programs(id),
    FOREIGN KEY (replaced_by_session_id) REFERENCES import_sessions(id)
);

CREATE TABLE IF NOT EXISTS import_transactions (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    program_code TEXT NOT NULL,
    vendor TEXT NOT NULL,
    description TEXT NOT NULL,
    amount REAL NOT NULL,
    date TEXT NOT NULL,
    period TEXT,
    category TEXT,
    subcategory TEXT,
    invoice_number TEXT,
    reference_number TEXT,
    external_id TEXT,
    raw_row TEXT,
    status TEXT NOT NULL DEFAULT 'unmatched',
    duplicate_type TEXT NOT NULL DEFAULT 'none',
    duplicate_of_id INTEGER,
    matched_ledger_entry_id INTEGER,
    match_confidence REAL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (session_id) REFERENCES import_sessions(id) ON DELETE CASCADE,
    FOREIGN KEY (duplicate_of_id) REFERENCES import_transactions(id),
    FOREIGN KEY (matched_ledger_entry_id) REFERENCES ledger_entries(id)
);

CREATE TABLE IF NOT EXISTS potential_matches (
    id INTEGER PRIMARY KEY,
    transaction_id INTEGER NOT NULL,
    ledger_entry_id INTEGER NOT NULL,
    confidence REAL NOT NULL,
    match_kind TEXT NOT NULL,
    reasons TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (transaction_id, ledger_entry_id),
    FOREIGN KEY (transaction_id) REFERENCES import_transactions(id) ON DELETE CASCADE,
    FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS rejected_matches (
    id INTEGER PRIMARY KEY,
    transaction_id INTEGER NOT NULL,
    ledger_entry_id INTEGER NOT NULL,
    rejected_at TEXT DEFAULT (datetime('now')),
    UNIQUE (transaction_id, ledger_entry_id),
    FOREIGN KEY (transaction_id) REFERENCES import_transactions(id) ON DELETE CASCADE,
    FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_transactions_program_vendor
    ON import_transactions(program_code, vendor);
CREATE INDEX IF NOT EXISTS idx_transactions_session
    ON import_transactions(session_id);
CREATE INDEX IF NOT EXISTS idx_potential_matches_entry
    ON potential_matches(ledger_entry_id);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
