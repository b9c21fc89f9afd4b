use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::fmt::{money, percent};
use crate::models::SessionStatus;
use crate::session::{cancel_session, get_session, get_sessions, get_transactions};

fn status_cell(status: SessionStatus) -> String {
    match status {
        SessionStatus::Completed => status.as_str().green().to_string(),
        SessionStatus::Failed => status.as_str().red().to_string(),
        SessionStatus::Replaced | SessionStatus::Cancelled => {
            status.as_str().dimmed().to_string()
        }
        _ => status.as_str().to_string(),
    }
}

pub fn list(program: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let sessions = get_sessions(&conn, program)?;

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "File", "Status", "Rows", "Matched", "Unmatched", "Errors", "Skipped", "Replaced By",
    ]);
    for s in sessions {
        table.add_row(vec![
            Cell::new(s.id),
            Cell::new(&s.filename),
            Cell::new(status_cell(s.status)),
            Cell::new(s.total_rows),
            Cell::new(s.matched_rows),
            Cell::new(s.unmatched_rows),
            Cell::new(s.error_rows),
            Cell::new(s.skipped_rows),
            Cell::new(
                s.replaced_by_session_id
                    .map(|id| format!("#{id}"))
                    .unwrap_or_default(),
            ),
        ]);
    }
    println!("Import sessions\n{table}");
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let conn = open_db()?;
    let session = get_session(&conn, id)?;
    println!(
        "Session #{id}: {} — {}",
        session.filename,
        status_cell(session.status)
    );

    let txns = get_transactions(&conn, id)?;
    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Vendor", "Description", "Amount", "Date", "Invoice", "Status", "Duplicate",
        "Confidence",
    ]);
    for t in txns {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(&t.vendor),
            Cell::new(&t.description),
            Cell::new(money(t.amount)),
            Cell::new(&t.date),
            Cell::new(t.invoice_number.unwrap_or_default()),
            Cell::new(t.status.as_str()),
            Cell::new(if t.duplicate_type == crate::models::DuplicateType::None {
                String::new()
            } else {
                match t.duplicate_of_id {
                    Some(of) => format!("{} (#{of})", t.duplicate_type.as_str()),
                    None => t.duplicate_type.as_str().to_string(),
                }
            }),
            Cell::new(t.match_confidence.map(percent).unwrap_or_default()),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn cancel(id: i64) -> Result<()> {
    let conn = open_db()?;
    cancel_session(&conn, id)?;
    println!("Session #{id} cancelled.");
    Ok(())
}
