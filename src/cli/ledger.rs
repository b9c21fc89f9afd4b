use std::path::Path;

use comfy_table::{Cell, Table};

use crate::cli::{open_db, resolve_program};
use crate::error::Result;
use crate::fmt::money;
use crate::ledger;

pub fn load(file: &str, program: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let code = resolve_program(program)?;
    let p = ledger::get_program_by_code(&conn, &code)?;
    let loaded = ledger::load_entries_csv(&conn, p.id, Path::new(file))?;
    println!("Loaded {loaded} ledger entries into {}", p.code);
    Ok(())
}

pub fn add(
    program: Option<&str>,
    vendor: &str,
    amount: f64,
    date: &str,
    description: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let conn = open_db()?;
    let code = resolve_program(program)?;
    let p = ledger::get_program_by_code(&conn, &code)?;
    let id = ledger::add_entry(&conn, p.id, vendor, description, category, amount, date)?;
    println!("Added ledger entry #{id}: {vendor} {} on {date}", money(amount));
    Ok(())
}

pub fn list(program: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let code = resolve_program(program)?;
    let p = ledger::get_program_by_code(&conn, &code)?;
    let entries = ledger::entries_for_program(&conn, p.id)?;

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Vendor", "Description", "Planned", "Planned Date", "Actual", "Actual Date",
    ]);
    for e in entries {
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(&e.vendor),
            Cell::new(e.description.unwrap_or_default()),
            Cell::new(money(e.planned_amount)),
            Cell::new(&e.planned_date),
            Cell::new(e.actual_amount.map(money).unwrap_or_default()),
            Cell::new(e.actual_date.unwrap_or_default()),
        ]);
    }
    println!("Ledger for {}\n{table}", p.code);
    Ok(())
}
