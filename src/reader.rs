use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{MatchbookError, Result};
use crate::models::Cell;

/// Read a spreadsheet file into rows of cells. Dispatch is by extension:
/// `.csv` via the csv crate, `.xlsx`/`.xls` via calamine.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<Cell>>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv_rows(path),
        #[cfg(feature = "xlsx")]
        "xlsx" | "xls" => read_sheet_rows(path),
        _ => Err(MatchbookError::Validation(format!(
            "unsupported file type: {}",
            path.display()
        ))),
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<Cell>>> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: Vec<Cell> = record
            .iter()
            .map(|field| {
                let field = field.trim();
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(feature = "xlsx")]
fn read_sheet_rows(path: &Path) -> Result<Vec<Vec<Cell>>> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| MatchbookError::Other(format!("Failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MatchbookError::Validation("workbook has no sheets".to_string()))?
        .map_err(|e| MatchbookError::Other(format!("Failed to read sheet: {e}")))?;

    let mut rows = Vec::new();
    for row in range.rows() {
        let cells: Vec<Cell> = row
            .iter()
            .map(|data| match data {
                Data::String(s) => {
                    let s = s.trim();
                    if s.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(s.to_string())
                    }
                }
                Data::Float(f) => Cell::Number(*f),
                Data::Int(i) => Cell::Number(*i as f64),
                Data::DateTime(dt) => Cell::Number(dt.as_f64()),
                Data::Bool(b) => Cell::Text(b.to_string()),
                _ => Cell::Empty,
            })
            .collect();
        rows.push(cells);
    }
    Ok(rows)
}

pub fn file_checksum(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
