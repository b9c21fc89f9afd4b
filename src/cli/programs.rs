use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::ledger;
use crate::settings;

pub fn add(code: &str, name: &str, default: bool) -> Result<()> {
    let conn = open_db()?;
    ledger::add_program(&conn, code, name)?;
    println!("Added program: {} ({name})", code.trim().to_uppercase());
    if default {
        let mut s = settings::load_settings();
        s.default_program = Some(code.trim().to_uppercase());
        settings::save_settings(&s)?;
        println!("Set as default program.");
    }
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let programs = ledger::list_programs(&conn)?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Code", "Name"]);
    for p in programs {
        table.add_row(vec![Cell::new(p.id), Cell::new(p.code), Cell::new(p.name)]);
    }
    println!("Programs\n{table}");
    Ok(())
}
