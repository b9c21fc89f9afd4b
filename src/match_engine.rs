use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::models::{ColumnMapping, ImportTransaction, LedgerEntry, MatchKind};

// Weights sum to 1.0; confidence is always in [0,1].
const VENDOR_WEIGHT: f64 = 0.50;
const DATE_WEIGHT: f64 = 0.30;
const AMOUNT_WEIGHT: f64 = 0.15;
const DESCRIPTION_WEIGHT: f64 = 0.05;

const EXACT_BAND: f64 = 0.95;
const FUZZY_BAND: f64 = 0.8;
const PARTIAL_BAND: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub amount_tolerance: f64,
    pub match_threshold: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: 0.01,
            match_threshold: 0.7,
        }
    }
}

impl MatchConfig {
    pub fn from_mapping(mapping: &ColumnMapping) -> Self {
        Self {
            amount_tolerance: mapping.amount_tolerance,
            match_threshold: mapping.match_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub ledger_entry_id: i64,
    pub confidence: f64,
    pub kind: MatchKind,
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// Component scores
// ---------------------------------------------------------------------------

fn tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token-set Jaccard similarity in [0,1]. Empty inputs carry no signal.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

fn year_month(date: &str) -> Option<(i32, u32)> {
    let d = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    Some((d.year(), d.month()))
}

/// Accepts `YYYY-MM`, `MM/YYYY`, and `Mon-YYYY` period strings.
fn parse_period(raw: &str) -> Option<(i32, u32)> {
    let raw = raw.trim();
    for candidate in [
        (format!("{raw}-01"), "%Y-%m-%d"),
        (format!("01/{raw}"), "%d/%m/%Y"),
        (format!("01-{raw}"), "%d-%b-%Y"),
    ] {
        if let Ok(d) = NaiveDate::parse_from_str(&candidate.0, candidate.1) {
            return Some((d.year(), d.month()));
        }
    }
    None
}

/// Binary date credit: the transaction's period (or failing that its own
/// date) falls in the same calendar month and year as the planned date.
fn same_month(txn: &ImportTransaction, entry: &LedgerEntry) -> bool {
    let source = txn
        .period
        .as_deref()
        .and_then(parse_period)
        .or_else(|| year_month(&txn.date));
    match (source, year_month(&entry.planned_date)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn amount_pct_diff(amount: f64, planned: f64) -> Option<f64> {
    if planned.abs() < f64::EPSILON {
        if amount.abs() < f64::EPSILON {
            Some(0.0)
        } else {
            None
        }
    } else {
        Some(((amount - planned) / planned).abs())
    }
}

/// Full credit at zero difference, scaled linearly to zero at the tolerance.
fn amount_factor(pct_diff: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return if pct_diff == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - pct_diff / tolerance).max(0.0)
}

fn kind_for(confidence: f64, month_matched: bool) -> MatchKind {
    if confidence >= EXACT_BAND {
        MatchKind::Exact
    } else if confidence >= FUZZY_BAND {
        MatchKind::Fuzzy
    } else if confidence >= PARTIAL_BAND {
        MatchKind::Partial
    } else if month_matched {
        MatchKind::DateProximity
    } else {
        MatchKind::WbsBased
    }
}

fn score_entry(txn: &ImportTransaction, entry: &LedgerEntry, config: &MatchConfig) -> MatchCandidate {
    let vendor_sim = token_set_similarity(&txn.vendor, &entry.vendor);
    let month_matched = same_month(txn, entry);
    let pct_diff = amount_pct_diff(txn.amount, entry.planned_amount);
    let amount = pct_diff.map_or(0.0, |d| amount_factor(d, config.amount_tolerance));
    let desc_sim =
        token_set_similarity(&txn.description, entry.description.as_deref().unwrap_or(""));

    let confidence = (VENDOR_WEIGHT * vendor_sim
        + DATE_WEIGHT * if month_matched { 1.0 } else { 0.0 }
        + AMOUNT_WEIGHT * amount
        + DESCRIPTION_WEIGHT * desc_sim)
        .clamp(0.0, 1.0);

    let mut reasons = Vec::new();
    if vendor_sim > 0.0 {
        reasons.push(format!("vendor similarity {:.0}%", vendor_sim * 100.0));
    }
    if month_matched {
        reasons.push("same month as planned date".to_string());
    }
    if amount > 0.0 {
        if let Some(d) = pct_diff {
            reasons.push(format!("amount within {:.2}% of plan", d * 100.0));
        }
    }
    if desc_sim > 0.0 {
        reasons.push(format!("description similarity {:.0}%", desc_sim * 100.0));
    }

    MatchCandidate {
        ledger_entry_id: entry.id,
        confidence,
        kind: kind_for(confidence, month_matched),
        reasons,
    }
}

// ---------------------------------------------------------------------------
// score_candidates
// ---------------------------------------------------------------------------

/// Score a transaction against every eligible ledger entry of its program.
/// Entries with actuals, entries bound to another completed transaction, and
/// entries the operator rejected for this transaction are never candidates.
/// Pure over its inputs.
pub fn score_candidates(
    txn: &ImportTransaction,
    entries: &[LedgerEntry],
    bound_entry_ids: &HashSet<i64>,
    rejected_entry_ids: &HashSet<i64>,
    config: &MatchConfig,
) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = entries
        .iter()
        .filter(|e| {
            !e.has_actuals()
                && !bound_entry_ids.contains(&e.id)
                && !rejected_entry_ids.contains(&e.id)
        })
        .map(|e| score_entry(txn, e, config))
        .filter(|c| c.confidence >= config.match_threshold)
        .collect();
    // Stable sort keeps ledger order on ties.
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DuplicateType, TransactionStatus};

    fn txn(vendor: &str, description: &str, amount: f64, date: &str) -> ImportTransaction {
        ImportTransaction {
            id: 1,
            session_id: 1,
            program_code: "ABC.1001".to_string(),
            vendor: vendor.to_string(),
            description: description.to_string(),
            amount,
            date: date.to_string(),
            period: None,
            category: None,
            subcategory: None,
            invoice_number: None,
            reference_number: None,
            external_id: None,
            status: TransactionStatus::Unmatched,
            duplicate_type: DuplicateType::None,
            duplicate_of_id: None,
            matched_ledger_entry_id: None,
            match_confidence: None,
        }
    }

    fn entry(id: i64, vendor: &str, description: &str, planned: f64, date: &str) -> LedgerEntry {
        LedgerEntry {
            id,
            program_id: 1,
            vendor: vendor.to_string(),
            description: Some(description.to_string()),
            category: None,
            planned_amount: planned,
            planned_date: date.to_string(),
            actual_amount: None,
            actual_date: None,
            invoice_link_url: None,
            invoice_link_text: None,
            notes: None,
        }
    }

    fn none() -> HashSet<i64> {
        HashSet::new()
    }

    #[test]
    fn test_token_set_similarity() {
        assert_eq!(token_set_similarity("Acme Industrial", "acme industrial"), 1.0);
        assert_eq!(token_set_similarity("Acme", "Globex"), 0.0);
        let half = token_set_similarity("Acme Industrial", "Acme Consulting");
        assert!(half > 0.3 && half < 0.4, "got {half}"); // 1 of 3 tokens
        assert_eq!(token_set_similarity("", "Acme"), 0.0);
    }

    #[test]
    fn test_identical_vendor_same_month_equal_amount_is_exact() {
        let t = txn("Acme Industrial", "widgets", 100.0, "2024-01-20");
        let e = entry(1, "Acme Industrial", "unrelated text", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert_eq!(out.len(), 1);
        assert!(out[0].confidence >= 0.95, "got {}", out[0].confidence);
        assert_eq!(out[0].kind, MatchKind::Exact);
    }

    #[test]
    fn test_partial_amount_credit_within_tolerance() {
        // 0.5% difference with 1% tolerance earns half the amount weight.
        let t = txn("Acme Industrial", "widgets", 100.5, "2024-01-20");
        let e = entry(1, "Acme Industrial", "girders", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert_eq!(out.len(), 1);
        let confidence = out[0].confidence;
        // 0.5 vendor + 0.3 date + 0.5 * 0.15 amount + 0 description
        assert!((confidence - 0.875).abs() < 0.01, "got {confidence}");
        assert_eq!(out[0].kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_amount_beyond_tolerance_earns_nothing() {
        let t = txn("Acme Industrial", "widgets", 150.0, "2024-01-20");
        let e = entry(1, "Acme Industrial", "widgets", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        // 0.5 vendor + 0.3 date + 0 amount + 0.05 description = 0.85
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.85).abs() < 0.001, "got {}", out[0].confidence);
    }

    #[test]
    fn test_period_wins_over_transaction_date() {
        let mut t = txn("Acme Industrial", "widgets", 100.0, "2024-02-20");
        t.period = Some("2024-01".to_string());
        let e = entry(1, "Acme Industrial", "widgets", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert!(out[0].confidence >= 0.95, "got {}", out[0].confidence);
    }

    #[test]
    fn test_period_formats() {
        assert_eq!(parse_period("2024-01"), Some((2024, 1)));
        assert_eq!(parse_period("01/2024"), Some((2024, 1)));
        assert_eq!(parse_period("Jan-2024"), Some((2024, 1)));
        assert_eq!(parse_period("sometime"), None);
    }

    #[test]
    fn test_entries_with_actuals_are_excluded() {
        let t = txn("Acme Industrial", "widgets", 100.0, "2024-01-20");
        let mut e = entry(1, "Acme Industrial", "widgets", 100.0, "2024-01-15");
        e.actual_amount = Some(100.0);
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_bound_and_rejected_entries_are_excluded() {
        let t = txn("Acme Industrial", "widgets", 100.0, "2024-01-20");
        let entries = vec![
            entry(1, "Acme Industrial", "widgets", 100.0, "2024-01-15"),
            entry(2, "Acme Industrial", "widgets", 100.0, "2024-01-15"),
            entry(3, "Acme Industrial", "widgets", 100.0, "2024-01-15"),
        ];
        let bound: HashSet<i64> = [1].into_iter().collect();
        let rejected: HashSet<i64> = [2].into_iter().collect();
        let out = score_candidates(&t, &entries, &bound, &rejected, &MatchConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ledger_entry_id, 3);
    }

    #[test]
    fn test_below_threshold_dropped_and_sorted_descending() {
        let t = txn("Acme Industrial", "widgets", 100.0, "2024-01-20");
        let entries = vec![
            entry(1, "Globex", "girders", 9000.0, "2023-06-15"),
            entry(2, "Acme Industrial", "girders", 100.5, "2024-01-15"),
            entry(3, "Acme Industrial", "widgets", 100.0, "2024-01-15"),
        ];
        let out = score_candidates(&t, &entries, &none(), &none(), &MatchConfig::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ledger_entry_id, 3);
        assert_eq!(out[1].ledger_entry_id, 2);
        assert!(out[0].confidence > out[1].confidence);
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let t = txn("Acme Industrial Holdings LLC", "widgets and more widgets", 100.0, "2024-01-20");
        let e = entry(1, "Acme Industrial Holdings LLC", "widgets and more widgets", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert!(out[0].confidence <= 1.0 && out[0].confidence >= 0.0);
        assert_eq!(out[0].kind, MatchKind::Exact);
    }

    #[test]
    fn test_fallback_labels_below_bands() {
        let low = MatchConfig {
            amount_tolerance: 0.01,
            match_threshold: 0.05,
        };
        // Month matches but nothing else: 0.3 — date-proximity label.
        let t = txn("Acme", "widgets", 500.0, "2024-01-20");
        let e = entry(1, "Globex", "girders", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &low);
        assert_eq!(out[0].kind, MatchKind::DateProximity);

        // Some vendor overlap, different month: wbs-based label.
        let t = txn("Acme Industrial", "widgets", 500.0, "2024-03-20");
        let e = entry(1, "Acme Consulting", "girders", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &low);
        assert_eq!(out[0].kind, MatchKind::WbsBased);
    }

    #[test]
    fn test_reasons_describe_components() {
        let t = txn("Acme Industrial", "widgets", 100.0, "2024-01-20");
        let e = entry(1, "Acme Industrial", "widgets", 100.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        let reasons = out[0].reasons.join("; ");
        assert!(reasons.contains("vendor similarity 100%"), "got: {reasons}");
        assert!(reasons.contains("same month"), "got: {reasons}");
    }

    #[test]
    fn test_zero_planned_amount_only_matches_zero() {
        let t = txn("Acme Industrial", "widgets", 0.0, "2024-01-20");
        let e = entry(1, "Acme Industrial", "widgets", 0.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert!(out[0].confidence >= 0.95);

        let t = txn("Acme Industrial", "widgets", 50.0, "2024-01-20");
        let e = entry(1, "Acme Industrial", "widgets", 0.0, "2024-01-15");
        let out = score_candidates(&t, &[e], &none(), &none(), &MatchConfig::default());
        assert!((out[0].confidence - 0.85).abs() < 0.001);
    }
}
