use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::fmt::{money, percent};
use crate::ledger;
use crate::matches;
use crate::session::{get_transaction, match_config_for};

pub fn list(transaction_id: i64) -> Result<()> {
    let conn = open_db()?;
    let txn = get_transaction(&conn, transaction_id)?;
    println!(
        "Transaction #{}: {} — {} {} on {} [{}]",
        txn.id,
        txn.vendor,
        txn.description,
        money(txn.amount),
        txn.date,
        txn.status.as_str()
    );

    let candidates = matches::potential_matches_for(&conn, transaction_id)?;
    if candidates.is_empty() {
        println!("No candidate matches.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec![
        "Entry", "Vendor", "Planned", "Planned Date", "Confidence", "Type", "Reasons",
    ]);
    for c in candidates {
        let entry = ledger::get_entry(&conn, c.ledger_entry_id)?;
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(&entry.vendor),
            Cell::new(money(entry.planned_amount)),
            Cell::new(&entry.planned_date),
            Cell::new(percent(c.confidence)),
            Cell::new(c.kind.as_str()),
            Cell::new(c.reasons.join("; ")),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn confirm(transaction_id: i64, ledger_entry_id: i64) -> Result<()> {
    let conn = open_db()?;
    matches::confirm_match(&conn, transaction_id, ledger_entry_id)?;
    println!("Confirmed transaction #{transaction_id} against ledger entry #{ledger_entry_id}.");
    Ok(())
}

pub fn reject(transaction_id: i64, ledger_entry_id: i64) -> Result<()> {
    let conn = open_db()?;
    matches::reject_match(&conn, transaction_id, ledger_entry_id)?;
    let txn = get_transaction(&conn, transaction_id)?;
    println!(
        "Rejected ledger entry #{ledger_entry_id} for transaction #{transaction_id} (now {}).",
        txn.status.as_str()
    );
    Ok(())
}

pub fn undo_reject(transaction_id: i64, ledger_entry_id: i64) -> Result<()> {
    let conn = open_db()?;
    let txn = get_transaction(&conn, transaction_id)?;
    let config = match_config_for(&conn, txn.session_id)?;
    let count = matches::undo_reject(&conn, transaction_id, ledger_entry_id, &config)?;
    println!("Rejection undone; {count} candidate(s) regenerated.");
    Ok(())
}

pub fn remove(transaction_id: i64) -> Result<()> {
    let conn = open_db()?;
    let txn = get_transaction(&conn, transaction_id)?;
    let config = match_config_for(&conn, txn.session_id)?;
    let count = matches::remove_confirmed_match(&conn, transaction_id, &config)?;
    println!("Confirmed match removed; {count} candidate(s) regenerated.");
    Ok(())
}

pub fn add_to_ledger(transaction_id: i64) -> Result<()> {
    let conn = open_db()?;
    let entry_id = matches::add_unmatched_to_ledger(&conn, transaction_id)?;
    println!("Created ledger entry #{entry_id} from transaction #{transaction_id}.");
    Ok(())
}
