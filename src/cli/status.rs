use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::ledger;
use crate::settings;

pub fn run() -> Result<()> {
    let conn = open_db()?;
    println!("Database: {}", settings::db_path().display());

    let programs = ledger::list_programs(&conn)?;
    if programs.is_empty() {
        println!("No programs yet. Add one with `matchbook programs add`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Program", "Ledger Entries", "Sessions", "Pending Review", "Unmatched", "Confirmed",
    ]);
    for p in &programs {
        let entries: i64 = conn.query_row(
            "SELECT count(*) FROM ledger_entries WHERE program_id = ?1",
            [p.id],
            |r| r.get(0),
        )?;
        let sessions: i64 = conn.query_row(
            "SELECT count(*) FROM import_sessions WHERE program_id = ?1",
            [p.id],
            |r| r.get(0),
        )?;
        let by_status = |status: &str| -> Result<i64> {
            Ok(conn.query_row(
                "SELECT count(*) FROM import_transactions WHERE program_code = ?1 AND status = ?2",
                rusqlite::params![p.code, status],
                |r| r.get(0),
            )?)
        };
        let pending = by_status("matched")?;
        let unmatched = by_status("unmatched")?;
        let confirmed = by_status("confirmed")? + by_status("added_to_ledger")?;
        table.add_row(vec![
            Cell::new(&p.code),
            Cell::new(entries),
            Cell::new(sessions),
            Cell::new(if pending > 0 {
                pending.to_string().yellow().to_string()
            } else {
                pending.to_string()
            }),
            Cell::new(unmatched),
            Cell::new(confirmed),
        ]);
    }
    println!("{table}");
    Ok(())
}
