use rusqlite::Connection;

use crate::error::{MatchbookError, Result};
use crate::ledger;
use crate::match_engine::{self, MatchCandidate, MatchConfig};
use crate::models::{PotentialMatch, TransactionStatus};
use crate::session;

// ---------------------------------------------------------------------------
// Candidate persistence
// ---------------------------------------------------------------------------

/// Persist scored candidates for a transaction. Idempotent: the unique
/// (transaction, entry) constraint swallows repeats, so re-running for an
/// unchanged transaction adds nothing.
pub fn synchronize_potential_matches(
    conn: &Connection,
    transaction_id: i64,
    candidates: &[MatchCandidate],
) -> Result<usize> {
    if candidates.is_empty() {
        return Ok(0);
    }
    for c in candidates {
        conn.execute(
            "INSERT OR IGNORE INTO potential_matches \
             (transaction_id, ledger_entry_id, confidence, match_kind, reasons) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                transaction_id,
                c.ledger_entry_id,
                c.confidence,
                c.kind,
                serde_json::to_string(&c.reasons).unwrap_or_default(),
            ],
        )?;
    }
    let top = candidates.iter().map(|c| c.confidence).fold(0.0, f64::max);
    conn.execute(
        "UPDATE import_transactions SET status = 'matched', match_confidence = ?2 \
         WHERE id = ?1 AND status IN ('unmatched', 'matched', 'rejected')",
        rusqlite::params![transaction_id, top],
    )?;
    Ok(candidates.len())
}

pub fn potential_matches_for(conn: &Connection, transaction_id: i64) -> Result<Vec<PotentialMatch>> {
    let mut stmt = conn.prepare(
        "SELECT id, transaction_id, ledger_entry_id, confidence, match_kind, reasons \
         FROM potential_matches WHERE transaction_id = ?1 ORDER BY confidence DESC, ledger_entry_id",
    )?;
    let rows = stmt
        .query_map([transaction_id], |row| {
            let reasons_json: Option<String> = row.get(5)?;
            Ok(PotentialMatch {
                id: row.get(0)?,
                transaction_id: row.get(1)?,
                ledger_entry_id: row.get(2)?,
                confidence: row.get(3)?,
                kind: row.get(4)?,
                reasons: reasons_json
                    .and_then(|j| serde_json::from_str(&j).ok())
                    .unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Score a transaction against its program's ledger and persist the result.
/// With no candidates the status falls back to rejected (if rejections
/// remain) or unmatched. Returns the candidate count.
pub fn match_transaction(
    conn: &Connection,
    transaction_id: i64,
    config: &MatchConfig,
) -> Result<usize> {
    let txn = session::get_transaction(conn, transaction_id)?;
    if txn.status.is_completed() || txn.status == TransactionStatus::Replaced {
        return Err(MatchbookError::Validation(format!(
            "transaction #{transaction_id} is {}; matching no longer applies",
            txn.status.as_str()
        )));
    }
    let program = ledger::get_program_by_code(conn, &txn.program_code)?;
    let entries = ledger::entries_for_program(conn, program.id)?;
    let bound = session::bound_entry_ids(conn, txn.id)?;
    let rejected = session::rejected_entry_ids(conn, txn.id)?;
    let candidates = match_engine::score_candidates(&txn, &entries, &bound, &rejected, config);

    if candidates.is_empty() {
        conn.execute(
            "DELETE FROM potential_matches WHERE transaction_id = ?1",
            [txn.id],
        )?;
        let status = if rejected.is_empty() {
            TransactionStatus::Unmatched
        } else {
            TransactionStatus::Rejected
        };
        conn.execute(
            "UPDATE import_transactions SET status = ?2, match_confidence = NULL WHERE id = ?1",
            rusqlite::params![txn.id, status],
        )?;
        Ok(0)
    } else {
        synchronize_potential_matches(conn, txn.id, &candidates)
    }
}

// ---------------------------------------------------------------------------
// Operator decisions
// ---------------------------------------------------------------------------

fn invoice_link(txn: &crate::models::ImportTransaction) -> (Option<&str>, Option<&str>) {
    let text = txn.invoice_number.as_deref();
    let url = txn
        .reference_number
        .as_deref()
        .filter(|r| r.starts_with("http"));
    (text, url)
}

/// Bind a transaction to a ledger entry. Every potential match touching
/// either side goes away: one entry binds to one transaction.
pub fn confirm_match(conn: &Connection, transaction_id: i64, ledger_entry_id: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let txn = session::get_transaction(&tx, transaction_id)?;
    if txn.status.is_terminal() {
        return Err(MatchbookError::Validation(format!(
            "transaction #{transaction_id} is already {}",
            txn.status.as_str()
        )));
    }
    let entry = ledger::get_entry(&tx, ledger_entry_id)?;
    if entry.has_actuals() {
        return Err(MatchbookError::Validation(format!(
            "ledger entry #{ledger_entry_id} already has actuals"
        )));
    }

    tx.execute(
        "DELETE FROM potential_matches WHERE transaction_id = ?1 OR ledger_entry_id = ?2",
        rusqlite::params![transaction_id, ledger_entry_id],
    )?;
    let (invoice_text, invoice_url) = invoice_link(&txn);
    ledger::write_actuals(
        &tx,
        entry.id,
        txn.amount,
        &txn.date,
        invoice_text,
        invoice_url,
        &format!("Actuals set from import transaction #{}", txn.id),
    )?;
    tx.execute(
        "UPDATE import_transactions SET status = 'confirmed', matched_ledger_entry_id = ?2 \
         WHERE id = ?1",
        rusqlite::params![transaction_id, ledger_entry_id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Record the operator's no: the pair is excluded from candidacy until the
/// rejection is undone.
pub fn reject_match(conn: &Connection, transaction_id: i64, ledger_entry_id: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    session::get_transaction(&tx, transaction_id)?;
    tx.execute(
        "DELETE FROM potential_matches WHERE transaction_id = ?1 AND ledger_entry_id = ?2",
        rusqlite::params![transaction_id, ledger_entry_id],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO rejected_matches (transaction_id, ledger_entry_id) VALUES (?1, ?2)",
        rusqlite::params![transaction_id, ledger_entry_id],
    )?;
    let remaining: i64 = tx.query_row(
        "SELECT count(*) FROM potential_matches WHERE transaction_id = ?1",
        [transaction_id],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        tx.execute(
            "UPDATE import_transactions SET status = 'rejected', match_confidence = NULL \
             WHERE id = ?1 AND status IN ('matched', 'unmatched')",
            [transaction_id],
        )?;
    } else {
        tx.execute(
            "UPDATE import_transactions SET match_confidence = \
             (SELECT MAX(confidence) FROM potential_matches WHERE transaction_id = ?1) \
             WHERE id = ?1",
            [transaction_id],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Drop a rejection and re-run matching so the pair can surface again.
pub fn undo_reject(
    conn: &Connection,
    transaction_id: i64,
    ledger_entry_id: i64,
    config: &MatchConfig,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    session::get_transaction(&tx, transaction_id)?;
    let deleted = tx.execute(
        "DELETE FROM rejected_matches WHERE transaction_id = ?1 AND ledger_entry_id = ?2",
        rusqlite::params![transaction_id, ledger_entry_id],
    )?;
    if deleted == 0 {
        return Err(MatchbookError::NotFound(format!(
            "no rejected match for transaction #{transaction_id} and ledger entry #{ledger_entry_id}"
        )));
    }
    let count = match_transaction(&tx, transaction_id, config)?;
    tx.commit()?;
    Ok(count)
}

/// Unwind a confirmation: reverse the ledger actuals, clear the binding,
/// and regenerate candidates.
pub fn remove_confirmed_match(
    conn: &Connection,
    transaction_id: i64,
    config: &MatchConfig,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let txn = session::get_transaction(&tx, transaction_id)?;
    let (TransactionStatus::Confirmed, Some(entry_id)) = (txn.status, txn.matched_ledger_entry_id)
    else {
        return Err(MatchbookError::Validation(format!(
            "transaction #{transaction_id} has no confirmed match"
        )));
    };
    ledger::clear_actuals(
        &tx,
        entry_id,
        &format!("Match with import transaction #{} removed", txn.id),
    )?;
    tx.execute(
        "UPDATE import_transactions SET status = 'unmatched', matched_ledger_entry_id = NULL, \
         match_confidence = NULL WHERE id = ?1",
        [transaction_id],
    )?;
    tx.execute(
        "DELETE FROM rejected_matches WHERE transaction_id = ?1 AND ledger_entry_id = ?2",
        rusqlite::params![transaction_id, entry_id],
    )?;
    let count = match_transaction(&tx, transaction_id, config)?;
    tx.commit()?;
    Ok(count)
}

/// No plan line exists: create one from the transaction with actuals filled.
pub fn add_unmatched_to_ledger(conn: &Connection, transaction_id: i64) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let txn = session::get_transaction(&tx, transaction_id)?;
    if txn.status.is_terminal() {
        return Err(MatchbookError::Validation(format!(
            "transaction #{transaction_id} is already {}",
            txn.status.as_str()
        )));
    }
    let program = ledger::get_program_by_code(&tx, &txn.program_code)?;
    let entry_id = ledger::add_entry(
        &tx,
        program.id,
        &txn.vendor,
        Some(&txn.description),
        txn.category.as_deref(),
        txn.amount,
        &txn.date,
    )?;
    let (invoice_text, invoice_url) = invoice_link(&txn);
    ledger::write_actuals(
        &tx,
        entry_id,
        txn.amount,
        &txn.date,
        invoice_text,
        invoice_url,
        &format!("Created from import transaction #{}", txn.id),
    )?;
    tx.execute("DELETE FROM potential_matches WHERE transaction_id = ?1", [transaction_id])?;
    tx.execute(
        "UPDATE import_transactions SET status = 'added_to_ledger', matched_ledger_entry_id = ?2 \
         WHERE id = ?1",
        rusqlite::params![transaction_id, entry_id],
    )?;
    tx.commit()?;
    Ok(entry_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::ColumnMapping;
    use crate::session::{create_session, get_transaction, get_transactions, process_file};
    use std::path::Path;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn import_rows(conn: &Connection, dir: &Path, name: &str, rows: &[&str]) -> i64 {
        let path = dir.join(name);
        let mut content = String::from("Program,Vendor,Description,Amount,Date,Invoice\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(&path, &content).unwrap();
        let session_id = create_session(conn, "ABC.1001", name, &ColumnMapping::default()).unwrap();
        process_file(conn, session_id, &path).unwrap();
        session_id
    }

    /// One program, two interchangeable ledger entries, one matched txn.
    fn matched_fixture(conn: &Connection, dir: &Path) -> (i64, Vec<i64>) {
        let pid = ledger::add_program(conn, "ABC.1001", "Test").unwrap();
        let e1 = ledger::add_entry(conn, pid, "Acme", Some("widgets"), None, 100.0, "2024-01-15")
            .unwrap();
        let e2 = ledger::add_entry(conn, pid, "Acme", Some("widgets"), None, 100.0, "2024-01-20")
            .unwrap();
        let session_id = import_rows(
            conn,
            dir,
            "jan.csv",
            &["ABC.1001,Acme,widgets,100.00,01/20/2024,INV-1"],
        );
        let txns = get_transactions(conn, session_id).unwrap();
        assert_eq!(txns[0].status, TransactionStatus::Matched);
        (txns[0].id, vec![e1, e2])
    }

    #[test]
    fn test_synchronize_is_idempotent() {
        let (dir, conn) = test_db();
        let (txn_id, _) = matched_fixture(&conn, dir.path());
        let before = potential_matches_for(&conn, txn_id).unwrap().len();
        assert_eq!(before, 2);
        // Re-running the match pass must not duplicate rows.
        let config = MatchConfig::default();
        match_transaction(&conn, txn_id, &config).unwrap();
        match_transaction(&conn, txn_id, &config).unwrap();
        assert_eq!(potential_matches_for(&conn, txn_id).unwrap().len(), before);
    }

    #[test]
    fn test_confirm_locks_out_both_sides() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        confirm_match(&conn, txn_id, entries[0]).unwrap();

        let txn = get_transaction(&conn, txn_id).unwrap();
        assert_eq!(txn.status, TransactionStatus::Confirmed);
        assert_eq!(txn.matched_ledger_entry_id, Some(entries[0]));
        assert!(potential_matches_for(&conn, txn_id).unwrap().is_empty());

        let entry = ledger::get_entry(&conn, entries[0]).unwrap();
        assert_eq!(entry.actual_amount, Some(100.0));
        assert_eq!(entry.actual_date.as_deref(), Some("2024-01-20"));
        assert_eq!(entry.invoice_link_text.as_deref(), Some("INV-1"));
    }

    #[test]
    fn test_confirmed_entry_never_offered_to_others() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        confirm_match(&conn, txn_id, entries[0]).unwrap();

        // A second identical transaction can only see the other entry.
        let session_id = import_rows(
            &conn,
            dir.path(),
            "feb.csv",
            &["ABC.1001,Acme,widgets,100.00,01/20/2024,INV-2"],
        );
        let second = get_transactions(&conn, session_id).unwrap()[0].id;
        let candidates = potential_matches_for(&conn, second).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].ledger_entry_id, entries[1]);
    }

    #[test]
    fn test_confirm_missing_entry_fails() {
        let (dir, conn) = test_db();
        let (txn_id, _) = matched_fixture(&conn, dir.path());
        assert!(matches!(
            confirm_match(&conn, txn_id, 999),
            Err(MatchbookError::NotFound(_))
        ));
        // The transaction is untouched by the failure.
        assert_eq!(
            get_transaction(&conn, txn_id).unwrap().status,
            TransactionStatus::Matched
        );
    }

    #[test]
    fn test_confirm_twice_fails() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        confirm_match(&conn, txn_id, entries[0]).unwrap();
        assert!(matches!(
            confirm_match(&conn, txn_id, entries[1]),
            Err(MatchbookError::Validation(_))
        ));
    }

    #[test]
    fn test_reject_last_candidate_finalizes_rejection() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        reject_match(&conn, txn_id, entries[0]).unwrap();
        assert_eq!(
            get_transaction(&conn, txn_id).unwrap().status,
            TransactionStatus::Matched
        );
        reject_match(&conn, txn_id, entries[1]).unwrap();
        let txn = get_transaction(&conn, txn_id).unwrap();
        assert_eq!(txn.status, TransactionStatus::Rejected);
        assert!(txn.match_confidence.is_none());
        assert!(potential_matches_for(&conn, txn_id).unwrap().is_empty());
    }

    #[test]
    fn test_reject_then_undo_restores_candidate_set() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        let config = MatchConfig::default();
        let before: Vec<i64> = potential_matches_for(&conn, txn_id)
            .unwrap()
            .iter()
            .map(|m| m.ledger_entry_id)
            .collect();

        reject_match(&conn, txn_id, entries[0]).unwrap();
        undo_reject(&conn, txn_id, entries[0], &config).unwrap();

        let after: Vec<i64> = potential_matches_for(&conn, txn_id)
            .unwrap()
            .iter()
            .map(|m| m.ledger_entry_id)
            .collect();
        assert_eq!(before, after);
        assert_eq!(
            get_transaction(&conn, txn_id).unwrap().status,
            TransactionStatus::Matched
        );
    }

    #[test]
    fn test_undo_with_remaining_rejections_stays_rejected() {
        let (dir, conn) = test_db();
        let pid = ledger::add_program(&conn, "ABC.1001", "Test").unwrap();
        // Only one plausible entry; a second one far out of range.
        let near = ledger::add_entry(&conn, pid, "Acme", Some("widgets"), None, 100.0, "2024-01-15")
            .unwrap();
        let far = ledger::add_entry(&conn, pid, "Zenith", Some("girders"), None, 9000.0, "2020-06-15")
            .unwrap();
        let session_id = import_rows(
            &conn,
            dir.path(),
            "jan.csv",
            &["ABC.1001,Acme,widgets,100.00,01/20/2024,INV-1"],
        );
        let txn_id = get_transactions(&conn, session_id).unwrap()[0].id;
        let config = MatchConfig::default();

        reject_match(&conn, txn_id, near).unwrap();
        assert_eq!(
            get_transaction(&conn, txn_id).unwrap().status,
            TransactionStatus::Rejected
        );
        // Rejecting the far entry was never possible (no candidate row), but a
        // direct rejection record still participates in the status fallback.
        reject_match(&conn, txn_id, far).unwrap();
        undo_reject(&conn, txn_id, far, &config).unwrap();
        // near is still rejected, so the near entry stays excluded and the
        // transaction stays rejected.
        assert_eq!(
            get_transaction(&conn, txn_id).unwrap().status,
            TransactionStatus::Rejected
        );

        undo_reject(&conn, txn_id, near, &config).unwrap();
        assert_eq!(
            get_transaction(&conn, txn_id).unwrap().status,
            TransactionStatus::Matched
        );
    }

    #[test]
    fn test_undo_unknown_rejection_fails() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        assert!(matches!(
            undo_reject(&conn, txn_id, entries[0], &MatchConfig::default()),
            Err(MatchbookError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_confirmed_match_reverses_and_rematches() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        confirm_match(&conn, txn_id, entries[0]).unwrap();
        let count = remove_confirmed_match(&conn, txn_id, &MatchConfig::default()).unwrap();
        assert_eq!(count, 2);

        let entry = ledger::get_entry(&conn, entries[0]).unwrap();
        assert!(entry.actual_amount.is_none());
        assert!(entry.invoice_link_text.is_none());

        let txn = get_transaction(&conn, txn_id).unwrap();
        assert_eq!(txn.status, TransactionStatus::Matched);
        assert!(txn.matched_ledger_entry_id.is_none());
    }

    #[test]
    fn test_remove_requires_confirmed_status() {
        let (dir, conn) = test_db();
        let (txn_id, _) = matched_fixture(&conn, dir.path());
        assert!(matches!(
            remove_confirmed_match(&conn, txn_id, &MatchConfig::default()),
            Err(MatchbookError::Validation(_))
        ));
    }

    #[test]
    fn test_add_unmatched_to_ledger_creates_bound_entry() {
        let (dir, conn) = test_db();
        ledger::add_program(&conn, "ABC.1001", "Test").unwrap();
        let session_id = import_rows(
            &conn,
            dir.path(),
            "jan.csv",
            &["ABC.1001,Novel Vendor,special tooling,450.00,01/20/2024,INV-7"],
        );
        let txn_id = get_transactions(&conn, session_id).unwrap()[0].id;
        let entry_id = add_unmatched_to_ledger(&conn, txn_id).unwrap();

        let entry = ledger::get_entry(&conn, entry_id).unwrap();
        assert_eq!(entry.vendor, "Novel Vendor");
        assert_eq!(entry.planned_amount, 450.0);
        assert_eq!(entry.actual_amount, Some(450.0));
        assert_eq!(entry.invoice_link_text.as_deref(), Some("INV-7"));

        let txn = get_transaction(&conn, txn_id).unwrap();
        assert_eq!(txn.status, TransactionStatus::AddedToLedger);
        assert_eq!(txn.matched_ledger_entry_id, Some(entry_id));
    }

    #[test]
    fn test_match_transaction_refuses_completed() {
        let (dir, conn) = test_db();
        let (txn_id, entries) = matched_fixture(&conn, dir.path());
        confirm_match(&conn, txn_id, entries[0]).unwrap();
        assert!(matches!(
            match_transaction(&conn, txn_id, &MatchConfig::default()),
            Err(MatchbookError::Validation(_))
        ));
    }
}
