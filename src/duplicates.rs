use crate::models::{DuplicateType, TransactionDraft, TransactionStatus};

/// The slice of a prior transaction the classifier needs.
#[derive(Debug, Clone)]
pub struct PriorTransaction {
    pub id: i64,
    pub vendor: String,
    pub invoice_number: Option<String>,
    pub amount: f64,
    pub date: String,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// True duplicate of a completed transaction: the row is not imported.
    Skip { duplicate_of: i64 },
    Import {
        duplicate_type: DuplicateType,
        duplicate_of: Option<i64>,
    },
}

fn same_vendor(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.005
}

/// Exact means the invoice-keyed identity: vendor, invoice, amount, and date
/// all equal. Rows without an invoice number never hit the exact rules; they
/// fall through to the vendor+amount+date key.
fn is_exact(draft: &TransactionDraft, p: &PriorTransaction) -> bool {
    match (&draft.invoice_number, &p.invoice_number) {
        (Some(a), Some(b)) if a == b => {}
        _ => return false,
    }
    same_vendor(&draft.vendor, &p.vendor)
        && same_amount(draft.amount, p.amount)
        && draft.date == p.date
}

fn shares_invoice_key(draft: &TransactionDraft, p: &PriorTransaction) -> bool {
    match (&draft.invoice_number, &p.invoice_number) {
        (Some(a), Some(b)) if a == b => same_vendor(&draft.vendor, &p.vendor),
        _ => false,
    }
}

fn shares_fallback_key(draft: &TransactionDraft, p: &PriorTransaction) -> bool {
    same_vendor(&draft.vendor, &p.vendor)
        && same_amount(draft.amount, p.amount)
        && draft.date == p.date
}

// ---------------------------------------------------------------------------
// Rules, in precedence order. First hit wins.
// ---------------------------------------------------------------------------

fn rule_exact_completed(
    draft: &TransactionDraft,
    priors: &[&PriorTransaction],
) -> Option<Classification> {
    priors
        .iter()
        .find(|p| is_exact(draft, p) && p.status.is_completed())
        .map(|p| Classification::Skip { duplicate_of: p.id })
}

fn rule_exact_pending(
    draft: &TransactionDraft,
    priors: &[&PriorTransaction],
) -> Option<Classification> {
    priors.iter().find(|p| is_exact(draft, p)).map(|p| Classification::Import {
        duplicate_type: DuplicateType::ExactDuplicate,
        duplicate_of: Some(p.id),
    })
}

fn rule_same_invoice_differs(
    draft: &TransactionDraft,
    priors: &[&PriorTransaction],
) -> Option<Classification> {
    let differing: Vec<&PriorTransaction> = priors
        .iter()
        .filter(|p| shares_invoice_key(draft, p) && !is_exact(draft, p))
        .copied()
        .collect();
    if differing.is_empty() {
        return None;
    }
    // A completed prior outranks a rejected one, which outranks the rest.
    let pick = differing
        .iter()
        .find(|p| p.status.is_completed())
        .or_else(|| differing.iter().find(|p| p.status == TransactionStatus::Rejected))
        .or(differing.first())?;
    let duplicate_type = if pick.status.is_completed() {
        DuplicateType::DifferentInfoConfirmed
    } else if pick.status == TransactionStatus::Rejected {
        DuplicateType::OriginalRejected
    } else {
        DuplicateType::DifferentInfoPending
    };
    Some(Classification::Import {
        duplicate_type,
        duplicate_of: Some(pick.id),
    })
}

fn rule_no_invoice_key(
    draft: &TransactionDraft,
    priors: &[&PriorTransaction],
) -> Option<Classification> {
    if draft.invoice_number.is_some() {
        return None;
    }
    priors
        .iter()
        .find(|p| shares_fallback_key(draft, p))
        .map(|p| Classification::Import {
            duplicate_type: DuplicateType::NoInvoicePotential,
            duplicate_of: Some(p.id),
        })
}

fn rule_multiple_potential(
    draft: &TransactionDraft,
    priors: &[&PriorTransaction],
) -> Option<Classification> {
    let shared = priors.iter().filter(|p| shares_fallback_key(draft, p)).count();
    if shared > 1 {
        Some(Classification::Import {
            duplicate_type: DuplicateType::MultiplePotential,
            duplicate_of: None,
        })
    } else {
        None
    }
}

/// Classify a draft against prior transactions of the same program.
/// Replaced transactions never participate.
pub fn classify(draft: &TransactionDraft, priors: &[PriorTransaction]) -> Classification {
    let live: Vec<&PriorTransaction> = priors
        .iter()
        .filter(|p| p.status != TransactionStatus::Replaced)
        .collect();

    let rules: [fn(&TransactionDraft, &[&PriorTransaction]) -> Option<Classification>; 5] = [
        rule_exact_completed,
        rule_exact_pending,
        rule_same_invoice_differs,
        rule_no_invoice_key,
        rule_multiple_potential,
    ];
    for rule in rules {
        if let Some(c) = rule(draft, &live) {
            return c;
        }
    }
    Classification::Import {
        duplicate_type: DuplicateType::None,
        duplicate_of: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(vendor: &str, invoice: Option<&str>, amount: f64, date: &str) -> TransactionDraft {
        TransactionDraft {
            program_code: "ABC.1001".to_string(),
            vendor: vendor.to_string(),
            description: "services".to_string(),
            amount,
            date: date.to_string(),
            period: None,
            category: None,
            subcategory: None,
            invoice_number: invoice.map(str::to_string),
            reference_number: None,
            external_id: None,
            raw_json: String::new(),
        }
    }

    fn prior(
        id: i64,
        vendor: &str,
        invoice: Option<&str>,
        amount: f64,
        date: &str,
        status: TransactionStatus,
    ) -> PriorTransaction {
        PriorTransaction {
            id,
            vendor: vendor.to_string(),
            invoice_number: invoice.map(str::to_string),
            amount,
            date: date.to_string(),
            status,
        }
    }

    #[test]
    fn test_exact_duplicate_of_confirmed_is_skipped() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Confirmed)];
        assert_eq!(classify(&d, &priors), Classification::Skip { duplicate_of: 7 });
    }

    #[test]
    fn test_exact_duplicate_of_added_to_ledger_is_skipped() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::AddedToLedger)];
        assert!(matches!(classify(&d, &priors), Classification::Skip { .. }));
    }

    #[test]
    fn test_exact_duplicate_of_pending_is_imported_tagged() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Matched)];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::ExactDuplicate,
                duplicate_of: Some(7),
            }
        );
    }

    #[test]
    fn test_different_amount_against_confirmed() {
        let d = draft("Acme", Some("INV-1"), 200.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Confirmed)];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::DifferentInfoConfirmed,
                duplicate_of: Some(7),
            }
        );
    }

    #[test]
    fn test_different_date_against_rejected() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-02-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Rejected)];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::OriginalRejected,
                duplicate_of: Some(7),
            }
        );
    }

    #[test]
    fn test_different_info_pending_otherwise() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-02-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Matched)];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::DifferentInfoPending,
                duplicate_of: Some(7),
            }
        );
    }

    #[test]
    fn test_completed_prior_outranks_pending_on_same_invoice() {
        let d = draft("Acme", Some("INV-1"), 300.0, "2024-03-01");
        let priors = vec![
            prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Matched),
            prior(8, "Acme", Some("INV-1"), 200.0, "2024-02-01", TransactionStatus::Confirmed),
        ];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::DifferentInfoConfirmed,
                duplicate_of: Some(8),
            }
        );
    }

    #[test]
    fn test_no_invoice_falls_back_to_vendor_amount_date() {
        let d = draft("Acme", None, 100.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Confirmed)];
        // Even against a confirmed prior, a row with no invoice is imported, not skipped.
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::NoInvoicePotential,
                duplicate_of: Some(7),
            }
        );
    }

    #[test]
    fn test_multiple_potential_when_key_shared_twice() {
        let d = draft("Acme", Some("INV-9"), 100.0, "2024-01-01");
        let priors = vec![
            prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Unmatched),
            prior(8, "Acme", Some("INV-2"), 100.0, "2024-01-01", TransactionStatus::Unmatched),
        ];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::MultiplePotential,
                duplicate_of: None,
            }
        );
    }

    #[test]
    fn test_single_shared_key_with_invoice_is_clean() {
        // Draft carries an invoice nobody else has; one sibling sharing the
        // fallback key is not enough for multiple_potential.
        let d = draft("Acme", Some("INV-9"), 100.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Unmatched)];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::None,
                duplicate_of: None,
            }
        );
    }

    #[test]
    fn test_replaced_priors_are_invisible() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-01-01");
        let priors = vec![prior(7, "Acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Replaced)];
        assert_eq!(
            classify(&d, &priors),
            Classification::Import {
                duplicate_type: DuplicateType::None,
                duplicate_of: None,
            }
        );
    }

    #[test]
    fn test_vendor_comparison_ignores_case() {
        let d = draft("ACME", Some("INV-1"), 100.0, "2024-01-01");
        let priors = vec![prior(7, "acme", Some("INV-1"), 100.0, "2024-01-01", TransactionStatus::Confirmed)];
        assert!(matches!(classify(&d, &priors), Classification::Skip { .. }));
    }

    #[test]
    fn test_no_priors_is_clean_import() {
        let d = draft("Acme", Some("INV-1"), 100.0, "2024-01-01");
        assert_eq!(
            classify(&d, &[]),
            Classification::Import {
                duplicate_type: DuplicateType::None,
                duplicate_of: None,
            }
        );
    }
}
