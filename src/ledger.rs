use std::path::Path;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{MatchbookError, Result};
use crate::models::{LedgerEntry, Program};
use crate::rowparse;

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

pub fn add_program(conn: &Connection, code: &str, name: &str) -> Result<i64> {
    let code = code.trim().to_uppercase();
    let valid = Regex::new(&format!("^{}$", rowparse::PROGRAM_CODE_PATTERN))
        .map(|re| re.is_match(&code))
        .unwrap_or(false);
    if !valid {
        return Err(MatchbookError::Validation(format!(
            "program code must look like ABC.1001, got: {code}"
        )));
    }
    conn.execute(
        "INSERT INTO programs (code, name) VALUES (?1, ?2)",
        rusqlite::params![code, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_program(conn: &Connection, id: i64) -> Result<Program> {
    conn.query_row(
        "SELECT id, code, name FROM programs WHERE id = ?1",
        [id],
        |row| {
            Ok(Program {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| MatchbookError::NotFound(format!("program #{id}")))
}

pub fn get_program_by_code(conn: &Connection, code: &str) -> Result<Program> {
    let code = code.trim().to_uppercase();
    conn.query_row(
        "SELECT id, code, name FROM programs WHERE code = ?1",
        [&code],
        |row| {
            Ok(Program {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| MatchbookError::NotFound(format!("program {code}")))
}

pub fn list_programs(conn: &Connection) -> Result<Vec<Program>> {
    let mut stmt = conn.prepare("SELECT id, code, name FROM programs ORDER BY code")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Program {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

fn entry_from_row(row: &Row) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        program_id: row.get(1)?,
        vendor: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        planned_amount: row.get(5)?,
        planned_date: row.get(6)?,
        actual_amount: row.get(7)?,
        actual_date: row.get(8)?,
        invoice_link_url: row.get(9)?,
        invoice_link_text: row.get(10)?,
        notes: row.get(11)?,
    })
}

const ENTRY_COLUMNS: &str = "id, program_id, vendor, description, category, planned_amount, \
     planned_date, actual_amount, actual_date, invoice_link_url, invoice_link_text, notes";

pub fn add_entry(
    conn: &Connection,
    program_id: i64,
    vendor: &str,
    description: Option<&str>,
    category: Option<&str>,
    planned_amount: f64,
    planned_date: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO ledger_entries (program_id, vendor, description, category, planned_amount, planned_date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![program_id, vendor, description, category, planned_amount, planned_date],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_entry(conn: &Connection, id: i64) -> Result<LedgerEntry> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?1"),
        [id],
        entry_from_row,
    )
    .optional()?
    .ok_or_else(|| MatchbookError::NotFound(format!("ledger entry #{id}")))
}

pub fn entries_for_program(conn: &Connection, program_id: i64) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE program_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([program_id], entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn stamp(note: &str) -> String {
    format!("[{}] {note}", chrono::Local::now().format("%Y-%m-%d"))
}

pub fn append_note(conn: &Connection, entry_id: i64, note: &str) -> Result<()> {
    conn.execute(
        "UPDATE ledger_entries SET notes = CASE WHEN notes IS NULL OR notes = '' \
         THEN ?2 ELSE notes || char(10) || ?2 END WHERE id = ?1",
        rusqlite::params![entry_id, stamp(note)],
    )?;
    Ok(())
}

/// Write actuals and the invoice link onto an entry, with an audit note.
pub fn write_actuals(
    conn: &Connection,
    entry_id: i64,
    amount: f64,
    date: &str,
    invoice_text: Option<&str>,
    invoice_url: Option<&str>,
    note: &str,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE ledger_entries SET actual_amount = ?2, actual_date = ?3, \
         invoice_link_text = ?4, invoice_link_url = ?5 WHERE id = ?1",
        rusqlite::params![entry_id, amount, date, invoice_text, invoice_url],
    )?;
    if changed == 0 {
        return Err(MatchbookError::NotFound(format!("ledger entry #{entry_id}")));
    }
    append_note(conn, entry_id, note)
}

/// Reverse actuals and the invoice link, with an audit note.
pub fn clear_actuals(conn: &Connection, entry_id: i64, note: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE ledger_entries SET actual_amount = NULL, actual_date = NULL, \
         invoice_link_text = NULL, invoice_link_url = NULL WHERE id = ?1",
        [entry_id],
    )?;
    if changed == 0 {
        return Err(MatchbookError::NotFound(format!("ledger entry #{entry_id}")));
    }
    append_note(conn, entry_id, note)
}

// ---------------------------------------------------------------------------
// Bulk load from CSV
// ---------------------------------------------------------------------------

/// Load planned-budget lines from a CSV with headers:
/// vendor, description, category, planned_amount, planned_date.
/// Rows missing vendor, amount, or date are skipped.
pub fn load_entries_csv(conn: &Connection, program_id: i64, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(vendor_idx), Some(amount_idx), Some(date_idx)) = (
        col("vendor"),
        col("planned_amount"),
        col("planned_date"),
    ) else {
        return Err(MatchbookError::Validation(
            "ledger CSV needs vendor, planned_amount, and planned_date columns".to_string(),
        ));
    };
    let desc_idx = col("description");
    let cat_idx = col("category");

    let mut loaded = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        let Some(vendor) = record.get(vendor_idx).map(str::trim).filter(|v| !v.is_empty())
        else {
            continue;
        };
        let Some(amount) = record.get(amount_idx).and_then(rowparse::parse_amount) else {
            continue;
        };
        let Some(date) = record
            .get(date_idx)
            .and_then(|d| rowparse::parse_date_str(d, None))
        else {
            continue;
        };
        let description = desc_idx.and_then(|i| record.get(i)).map(str::trim).filter(|v| !v.is_empty());
        let category = cat_idx.and_then(|i| record.get(i)).map(str::trim).filter(|v| !v.is_empty());
        add_entry(conn, program_id, vendor, description, category, amount, &date)?;
        loaded += 1;
    }
    Ok(loaded)
}
