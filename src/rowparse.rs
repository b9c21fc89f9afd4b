use chrono::NaiveDate;
use regex::Regex;

use crate::models::{Cell, ColumnMapping, TransactionDraft};

/// Program codes look like `ABC.1001`: three letters, a period, four digits.
pub const PROGRAM_CODE_PATTERN: &str = r"[A-Za-z]{3}\.\d{4}";

/// Why a row was rejected. Program-scope rejections are silent skips;
/// the rest count as row errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    MissingProgramCode,
    ProgramMismatch,
    MissingVendor,
    MissingDescription,
    BadAmount,
    BadDate,
}

impl RowRejection {
    pub fn is_program_scope(&self) -> bool {
        matches!(self, Self::MissingProgramCode | Self::ProgramMismatch)
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn cell_string(row: &[Cell], idx: usize) -> Option<String> {
    match row.get(idx)? {
        Cell::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Cell::Number(n) => {
            if n.fract() == 0.0 {
                Some(format!("{}", *n as i64))
            } else {
                Some(n.to_string())
            }
        }
        Cell::Empty => None,
    }
}

pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

fn parse_amount_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => parse_amount(s),
        Cell::Empty => None,
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Spreadsheet epoch is 1900-01-01; the historical off-by-two adjustment
/// (leap-year bug plus one-based counting) lands the base at 1899-12-30.
pub fn serial_to_date(serial: f64) -> String {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    let date = base + chrono::Duration::days(serial as i64);
    date.format("%Y-%m-%d").to_string()
}

fn parse_date_mdy(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].trim().parse().ok()?;
    let d: u32 = parts[1].trim().parse().ok()?;
    let y: i32 = parts[2].trim().parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Fallback patterns tried after the structured parsers: MM/DD/YYYY,
/// YYYY-MM-DD, MM-DD-YYYY.
fn parse_date_fallback(raw: &str) -> Option<String> {
    let patterns: [(&str, [usize; 3]); 3] = [
        (r"^(\d{1,2})/(\d{1,2})/(\d{4})$", [3, 1, 2]),
        (r"^(\d{4})-(\d{1,2})-(\d{1,2})$", [1, 2, 3]),
        (r"^(\d{1,2})-(\d{1,2})-(\d{4})$", [3, 1, 2]),
    ];
    for (pattern, [yi, mi, di]) in patterns {
        let Some(caps) = Regex::new(pattern).ok().and_then(|re| re.captures(raw)) else {
            continue;
        };
        let y: i32 = caps.get(yi)?.as_str().parse().ok()?;
        let m: u32 = caps.get(mi)?.as_str().parse().ok()?;
        let d: u32 = caps.get(di)?.as_str().parse().ok()?;
        if let Some(dt) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
    }
    None
}

pub fn parse_date_str(raw: &str, explicit_format: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(fmt) = explicit_format {
        if let Ok(dt) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
    }
    // Numeric text inside a plausible window is a spreadsheet serial.
    if let Ok(serial) = raw.parse::<f64>() {
        if (10_000.0..80_000.0).contains(&serial) {
            return Some(serial_to_date(serial));
        }
        return None;
    }
    if let Some(d) = parse_date_mdy(raw) {
        return Some(d);
    }
    if let Ok(dt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    parse_date_fallback(raw)
}

fn parse_date_cell(cell: &Cell, explicit_format: Option<&str>) -> Option<String> {
    match cell {
        Cell::Number(serial) => Some(serial_to_date(*serial)),
        Cell::Text(s) => parse_date_str(s, explicit_format),
        Cell::Empty => None,
    }
}

// ---------------------------------------------------------------------------
// Program codes
// ---------------------------------------------------------------------------

pub fn extract_program_code(raw: &str) -> Option<String> {
    let re = Regex::new(PROGRAM_CODE_PATTERN).ok()?;
    re.find(raw).map(|m| m.as_str().to_uppercase())
}

// ---------------------------------------------------------------------------
// parse_row
// ---------------------------------------------------------------------------

/// Turn one raw row into a transaction draft, or reject it. Rows belonging
/// to a different program are dropped, not errored.
pub fn parse_row(
    row: &[Cell],
    mapping: &ColumnMapping,
    session_program: &str,
) -> std::result::Result<TransactionDraft, RowRejection> {
    let code = cell_string(row, mapping.program_code_column)
        .as_deref()
        .and_then(extract_program_code)
        .ok_or(RowRejection::MissingProgramCode)?;
    if !code.eq_ignore_ascii_case(session_program) {
        return Err(RowRejection::ProgramMismatch);
    }

    let vendor = cell_string(row, mapping.vendor_column).ok_or(RowRejection::MissingVendor)?;
    let description =
        cell_string(row, mapping.description_column).ok_or(RowRejection::MissingDescription)?;
    let amount = row
        .get(mapping.amount_column)
        .and_then(parse_amount_cell)
        .ok_or(RowRejection::BadAmount)?;
    let date = row
        .get(mapping.date_column)
        .and_then(|c| parse_date_cell(c, mapping.date_format.as_deref()))
        .ok_or(RowRejection::BadDate)?;

    Ok(TransactionDraft {
        program_code: code,
        vendor,
        description,
        amount,
        date,
        period: mapping.period_column.and_then(|i| cell_string(row, i)),
        category: mapping.category_column.and_then(|i| cell_string(row, i)),
        subcategory: mapping.subcategory_column.and_then(|i| cell_string(row, i)),
        invoice_number: mapping.invoice_column.and_then(|i| cell_string(row, i)),
        reference_number: mapping.reference_column.and_then(|i| cell_string(row, i)),
        external_id: mapping.transaction_id_column.and_then(|i| cell_string(row, i)),
        raw_json: serde_json::to_string(row).unwrap_or_default(),
    })
}
