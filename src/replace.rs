use std::path::Path;

use rusqlite::Connection;

use crate::error::{MatchbookError, Result};
use crate::ledger;
use crate::models::{ColumnMapping, SessionStatus, TransactionStatus};
use crate::session::{self, ProcessOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceOptions {
    /// Reverse every ledger side-effect and replace everything, confirmed or not.
    pub force_replace: bool,
    /// Keep matched, confirmed, and added transactions out of step one.
    pub preserve_all_matches: bool,
    /// Keep only confirmed and added transactions out of step one.
    pub preserve_confirmed_matches: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplaceOutcome {
    pub new_session_id: i64,
    pub preserved: usize,
    pub replaced: usize,
    pub pipeline: ProcessOutcome,
}

fn mark_replaced(conn: &Connection, transaction_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM potential_matches WHERE transaction_id = ?1",
        [transaction_id],
    )?;
    conn.execute(
        "UPDATE import_transactions SET status = 'replaced', match_confidence = NULL \
         WHERE id = ?1",
        [transaction_id],
    )?;
    Ok(())
}

/// Replace a prior import with a corrected file.
///
/// The old session is only marked replaced after every one of its
/// transactions has reached a terminal status; a pipeline failure on the new
/// file leaves the old session untouched so the caller can retry.
pub fn replace_session(
    conn: &Connection,
    old_session_id: i64,
    path: &Path,
    filename: &str,
    options: ReplaceOptions,
) -> Result<ReplaceOutcome> {
    let old = session::get_session(conn, old_session_id)?;
    if old.status == SessionStatus::Replaced {
        return Err(MatchbookError::Validation(format!(
            "session #{old_session_id} was already replaced"
        )));
    }
    let program = ledger::get_program(conn, old.program_id)?;
    let mapping: ColumnMapping = serde_json::from_str(&old.mapping)
        .map_err(|e| MatchbookError::Validation(format!("bad column mapping: {e}")))?;

    // Step 1: the new session, same program, same mapping.
    let new_session_id = session::create_session(conn, &program.code, filename, &mapping)?;

    // Steps 2-3: settle the old session's transactions. Preserved ones stay
    // visible to duplicate classification while the new file imports.
    let mut preserved = 0usize;
    let mut replaced = 0usize;
    {
        let tx = conn.unchecked_transaction()?;
        for txn in session::get_transactions(&tx, old_session_id)? {
            if options.force_replace {
                if txn.status.is_completed() {
                    if let Some(entry_id) = txn.matched_ledger_entry_id {
                        ledger::clear_actuals(
                            &tx,
                            entry_id,
                            &format!(
                                "Actuals reversed: transaction #{} replaced by session #{new_session_id}",
                                txn.id
                            ),
                        )?;
                    }
                }
                mark_replaced(&tx, txn.id)?;
                replaced += 1;
            } else {
                let keep = match txn.status {
                    TransactionStatus::Matched => options.preserve_all_matches,
                    TransactionStatus::Confirmed | TransactionStatus::AddedToLedger => {
                        options.preserve_all_matches || options.preserve_confirmed_matches
                    }
                    _ => false,
                };
                if keep {
                    preserved += 1;
                } else {
                    mark_replaced(&tx, txn.id)?;
                    replaced += 1;
                }
            }
        }
        tx.commit()?;
    }

    // Step 4: full parse+match pipeline over the corrected file.
    let pipeline = session::process_file_excluding(conn, new_session_id, path, Some(old_session_id))?;

    // Step 5: nothing in the old session may stay pending review.
    let tx = conn.unchecked_transaction()?;
    for txn in session::get_transactions(&tx, old_session_id)? {
        if !txn.status.is_terminal() {
            mark_replaced(&tx, txn.id)?;
            replaced += 1;
        }
    }
    // Step 6: only now does the old session become immutable.
    tx.execute(
        "UPDATE import_sessions SET status = 'replaced', replaced_by_session_id = ?2 \
         WHERE id = ?1",
        rusqlite::params![old_session_id, new_session_id],
    )?;
    tx.commit()?;

    Ok(ReplaceOutcome {
        new_session_id,
        preserved,
        replaced,
        pipeline,
    })
}
