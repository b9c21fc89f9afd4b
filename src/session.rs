use std::collections::HashSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};

use crate::duplicates::{self, Classification, PriorTransaction};
use crate::error::{MatchbookError, Result};
use crate::ledger;
use crate::match_engine::MatchConfig;
use crate::matches;
use crate::models::{
    Cell, ColumnMapping, DuplicateType, ImportSession, ImportTransaction, SessionStatus,
};
use crate::reader;
use crate::rowparse;

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

const SESSION_COLUMNS: &str = "id, program_id, filename, status, mapping, checksum, total_rows, \
     processed_rows, matched_rows, unmatched_rows, error_rows, skipped_rows, \
     replaced_by_session_id, created_at";

fn session_from_row(row: &Row) -> rusqlite::Result<ImportSession> {
    Ok(ImportSession {
        id: row.get(0)?,
        program_id: row.get(1)?,
        filename: row.get(2)?,
        status: row.get(3)?,
        mapping: row.get(4)?,
        checksum: row.get(5)?,
        total_rows: row.get(6)?,
        processed_rows: row.get(7)?,
        matched_rows: row.get(8)?,
        unmatched_rows: row.get(9)?,
        error_rows: row.get(10)?,
        skipped_rows: row.get(11)?,
        replaced_by_session_id: row.get(12)?,
        created_at: row.get(13)?,
    })
}

const TXN_COLUMNS: &str = "id, session_id, program_code, vendor, description, amount, date, \
     period, category, subcategory, invoice_number, reference_number, external_id, status, \
     duplicate_type, duplicate_of_id, matched_ledger_entry_id, match_confidence";

fn txn_from_row(row: &Row) -> rusqlite::Result<ImportTransaction> {
    Ok(ImportTransaction {
        id: row.get(0)?,
        session_id: row.get(1)?,
        program_code: row.get(2)?,
        vendor: row.get(3)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        date: row.get(6)?,
        period: row.get(7)?,
        category: row.get(8)?,
        subcategory: row.get(9)?,
        invoice_number: row.get(10)?,
        reference_number: row.get(11)?,
        external_id: row.get(12)?,
        status: row.get(13)?,
        duplicate_type: row.get(14)?,
        duplicate_of_id: row.get(15)?,
        matched_ledger_entry_id: row.get(16)?,
        match_confidence: row.get(17)?,
    })
}

// ---------------------------------------------------------------------------
// Session CRUD
// ---------------------------------------------------------------------------

pub fn create_session(
    conn: &Connection,
    program_code: &str,
    filename: &str,
    mapping: &ColumnMapping,
) -> Result<i64> {
    let program = ledger::get_program_by_code(conn, program_code)?;
    let mapping_json =
        serde_json::to_string(mapping).map_err(|e| MatchbookError::Other(e.to_string()))?;
    conn.execute(
        "INSERT INTO import_sessions (program_id, filename, status, mapping) VALUES (?1, ?2, 'pending', ?3)",
        rusqlite::params![program.id, filename, mapping_json],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_session(conn: &Connection, id: i64) -> Result<ImportSession> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM import_sessions WHERE id = ?1"),
        [id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| MatchbookError::NotFound(format!("session #{id}")))
}

pub fn get_sessions(conn: &Connection, program_code: Option<&str>) -> Result<Vec<ImportSession>> {
    let rows = match program_code {
        Some(code) => {
            let program = ledger::get_program_by_code(conn, code)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM import_sessions WHERE program_id = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt
                .query_map([program.id], session_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM import_sessions ORDER BY id DESC"
            ))?;
            let rows = stmt
                .query_map([], session_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<ImportTransaction> {
    conn.query_row(
        &format!("SELECT {TXN_COLUMNS} FROM import_transactions WHERE id = ?1"),
        [id],
        txn_from_row,
    )
    .optional()?
    .ok_or_else(|| MatchbookError::NotFound(format!("transaction #{id}")))
}

pub fn get_transactions(conn: &Connection, session_id: i64) -> Result<Vec<ImportTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TXN_COLUMNS} FROM import_transactions WHERE session_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([session_id], txn_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Cancellation only applies before processing finishes; rows already
/// written stay written.
pub fn cancel_session(conn: &Connection, id: i64) -> Result<()> {
    let session = get_session(conn, id)?;
    let changed = conn.execute(
        "UPDATE import_sessions SET status = 'cancelled' \
         WHERE id = ?1 AND status IN ('pending', 'processing')",
        [id],
    )?;
    if changed == 0 {
        return Err(MatchbookError::Validation(format!(
            "session #{id} is {}; only pending or processing sessions can be cancelled",
            session.status.as_str()
        )));
    }
    Ok(())
}

/// Match tolerances live on the session's persisted column mapping.
pub fn match_config_for(conn: &Connection, session_id: i64) -> Result<MatchConfig> {
    let session = get_session(conn, session_id)?;
    let mapping: ColumnMapping = serde_json::from_str(&session.mapping)
        .map_err(|e| MatchbookError::Validation(format!("bad column mapping: {e}")))?;
    Ok(MatchConfig::from_mapping(&mapping))
}

// ---------------------------------------------------------------------------
// Exclusion sets for the match engine
// ---------------------------------------------------------------------------

/// Ledger entries bound to a completed transaction other than this one.
pub fn bound_entry_ids(conn: &Connection, excluding_txn: i64) -> Result<HashSet<i64>> {
    let mut stmt = conn.prepare(
        "SELECT matched_ledger_entry_id FROM import_transactions \
         WHERE matched_ledger_entry_id IS NOT NULL \
           AND status IN ('confirmed', 'added_to_ledger') AND id != ?1",
    )?;
    let ids = stmt
        .query_map([excluding_txn], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}

pub fn rejected_entry_ids(conn: &Connection, transaction_id: i64) -> Result<HashSet<i64>> {
    let mut stmt =
        conn.prepare("SELECT ledger_entry_id FROM rejected_matches WHERE transaction_id = ?1")?;
    let ids = stmt
        .query_map([transaction_id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// The import pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOutcome {
    pub total: usize,
    pub processed: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub errors: usize,
}

fn load_priors(conn: &Connection, program_code: &str, vendor: &str) -> Result<Vec<PriorTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, vendor, invoice_number, amount, date, status FROM import_transactions \
         WHERE program_code = ?1 AND vendor = ?2 COLLATE NOCASE AND status != 'replaced' \
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![program_code, vendor], |row| {
            Ok(PriorTransaction {
                id: row.get(0)?,
                vendor: row.get(1)?,
                invoice_number: row.get(2)?,
                amount: row.get(3)?,
                date: row.get(4)?,
                status: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_transaction(
    conn: &Connection,
    session_id: i64,
    draft: &crate::models::TransactionDraft,
    duplicate_type: DuplicateType,
    duplicate_of: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO import_transactions (session_id, program_code, vendor, description, amount, \
         date, period, category, subcategory, invoice_number, reference_number, external_id, \
         raw_row, status, duplicate_type, duplicate_of_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'unmatched', ?14, ?15)",
        rusqlite::params![
            session_id,
            draft.program_code,
            draft.vendor,
            draft.description,
            draft.amount,
            draft.date,
            draft.period,
            draft.category,
            draft.subcategory,
            draft.invoice_number,
            draft.reference_number,
            draft.external_id,
            draft.raw_json,
            duplicate_type,
            duplicate_of,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn is_blank(row: &[Cell]) -> bool {
    row.iter().all(|c| matches!(c, Cell::Empty))
}

/// Parse, classify, persist, and match every row of the session's file.
/// Rows run strictly in file order, each committed before the next row's
/// duplicate lookup.
pub fn process_file(conn: &Connection, session_id: i64, path: &Path) -> Result<ProcessOutcome> {
    process_file_excluding(conn, session_id, path, None)
}

/// Session replacement re-imports a file that may be byte-identical to the
/// old session's; the checksum guard must not count that session.
pub(crate) fn process_file_excluding(
    conn: &Connection,
    session_id: i64,
    path: &Path,
    excluded_session: Option<i64>,
) -> Result<ProcessOutcome> {
    let session = get_session(conn, session_id)?;
    if session.status != SessionStatus::Pending {
        return Err(MatchbookError::Validation(format!(
            "session #{session_id} is {}; only a pending session can process a file",
            session.status.as_str()
        )));
    }
    let mapping: ColumnMapping = serde_json::from_str(&session.mapping)
        .map_err(|e| MatchbookError::Validation(format!("bad column mapping: {e}")))?;
    let program = ledger::get_program(conn, session.program_id)?;

    let checksum = reader::file_checksum(path)?;
    let prior_import: Option<i64> = conn
        .query_row(
            "SELECT id FROM import_sessions WHERE program_id = ?1 AND checksum = ?2 \
             AND id != ?3 AND (?4 IS NULL OR id != ?4) \
             AND status IN ('pending', 'processing', 'completed')",
            rusqlite::params![program.id, checksum, session_id, excluded_session],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(other) = prior_import {
        conn.execute("UPDATE import_sessions SET status = 'failed' WHERE id = ?1", [session_id])?;
        return Err(MatchbookError::Validation(format!(
            "identical file already imported by session #{other}"
        )));
    }
    conn.execute(
        "UPDATE import_sessions SET status = 'processing', checksum = ?2 WHERE id = ?1",
        rusqlite::params![session_id, checksum],
    )?;

    match run_pipeline(conn, session_id, &program.code, &mapping, path) {
        Ok(out) => {
            conn.execute(
                "UPDATE import_sessions SET status = 'completed', total_rows = ?2, \
                 processed_rows = ?3, matched_rows = ?4, unmatched_rows = ?5, \
                 error_rows = ?6, skipped_rows = ?7 WHERE id = ?1",
                rusqlite::params![
                    session_id,
                    out.total as i64,
                    out.processed as i64,
                    out.matched as i64,
                    out.unmatched as i64,
                    out.errors as i64,
                    out.skipped as i64,
                ],
            )?;
            Ok(out)
        }
        Err(e) => {
            let _ = conn.execute("UPDATE import_sessions SET status = 'failed' WHERE id = ?1", [
                session_id,
            ]);
            Err(e)
        }
    }
}

fn run_pipeline(
    conn: &Connection,
    session_id: i64,
    program_code: &str,
    mapping: &ColumnMapping,
    path: &Path,
) -> Result<ProcessOutcome> {
    let rows = reader::read_rows(path)?;
    let skip = usize::from(mapping.has_header && !rows.is_empty());
    let data_rows: Vec<&Vec<Cell>> = rows.iter().skip(skip).filter(|r| !is_blank(r)).collect();

    let mut out = ProcessOutcome {
        total: data_rows.len(),
        ..Default::default()
    };
    let config = MatchConfig::from_mapping(mapping);

    for row in data_rows {
        // One unit of work per row so later rows observe this one committed.
        let tx = conn.unchecked_transaction()?;
        match rowparse::parse_row(row, mapping, program_code) {
            Err(rejection) => {
                if rejection.is_program_scope() {
                    out.skipped += 1;
                } else {
                    out.errors += 1;
                }
            }
            Ok(draft) => {
                let priors = load_priors(&tx, &draft.program_code, &draft.vendor)?;
                match duplicates::classify(&draft, &priors) {
                    Classification::Skip { .. } => out.skipped += 1,
                    Classification::Import {
                        duplicate_type,
                        duplicate_of,
                    } => {
                        let txn_id =
                            insert_transaction(&tx, session_id, &draft, duplicate_type, duplicate_of)?;
                        let candidates = matches::match_transaction(&tx, txn_id, &config)?;
                        if candidates > 0 {
                            out.matched += 1;
                        } else {
                            out.unmatched += 1;
                        }
                        out.processed += 1;
                    }
                }
            }
        }
        tx.commit()?;
    }
    Ok(out)
}
