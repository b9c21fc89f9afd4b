use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status enums — stored as TEXT, mapped at the rusqlite boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Replaced,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Replaced => "replaced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "replaced" => Some(Self::Replaced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Unmatched,
    Matched,
    Confirmed,
    Rejected,
    AddedToLedger,
    Replaced,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::AddedToLedger => "added_to_ledger",
            Self::Replaced => "replaced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unmatched" => Some(Self::Unmatched),
            "matched" => Some(Self::Matched),
            "confirmed" => Some(Self::Confirmed),
            "rejected" => Some(Self::Rejected),
            "added_to_ledger" => Some(Self::AddedToLedger),
            "replaced" => Some(Self::Replaced),
            _ => None,
        }
    }

    /// Once terminal, the matching engine never touches the transaction again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Rejected | Self::AddedToLedger | Self::Replaced
        )
    }

    /// Terminal *and* applied to the ledger.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::AddedToLedger)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateType {
    None,
    ExactDuplicate,
    DifferentInfoConfirmed,
    DifferentInfoPending,
    OriginalRejected,
    NoInvoicePotential,
    MultiplePotential,
}

impl DuplicateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ExactDuplicate => "exact_duplicate",
            Self::DifferentInfoConfirmed => "different_info_confirmed",
            Self::DifferentInfoPending => "different_info_pending",
            Self::OriginalRejected => "original_rejected",
            Self::NoInvoicePotential => "no_invoice_potential",
            Self::MultiplePotential => "multiple_potential",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "exact_duplicate" => Some(Self::ExactDuplicate),
            "different_info_confirmed" => Some(Self::DifferentInfoConfirmed),
            "different_info_pending" => Some(Self::DifferentInfoPending),
            "original_rejected" => Some(Self::OriginalRejected),
            "no_invoice_potential" => Some(Self::NoInvoicePotential),
            "multiple_potential" => Some(Self::MultiplePotential),
            _ => None,
        }
    }
}

/// Confidence band label on a candidate. Explanatory only — inclusion is
/// decided by the threshold, never by the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Partial,
    DateProximity,
    WbsBased,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::Partial => "partial",
            Self::DateProximity => "date_proximity",
            Self::WbsBased => "wbs_based",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "fuzzy" => Some(Self::Fuzzy),
            "partial" => Some(Self::Partial),
            "date_proximity" => Some(Self::DateProximity),
            "wbs_based" => Some(Self::WbsBased),
            _ => None,
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s)
                    .ok_or_else(|| FromSqlError::Other(format!("unrecognized value: {s}").into()))
            }
        }
    };
}

sql_text_enum!(SessionStatus);
sql_text_enum!(TransactionStatus);
sql_text_enum!(DuplicateType);
sql_text_enum!(MatchKind);

// ---------------------------------------------------------------------------
// Rows and cells
// ---------------------------------------------------------------------------

/// One spreadsheet cell after the file reader has normalized CSV/XLSX input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

/// Which column holds which field, persisted as JSON on the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub program_code_column: usize,
    pub vendor_column: usize,
    pub description_column: usize,
    pub amount_column: usize,
    pub date_column: usize,
    #[serde(default)]
    pub period_column: Option<usize>,
    #[serde(default)]
    pub category_column: Option<usize>,
    #[serde(default)]
    pub subcategory_column: Option<usize>,
    #[serde(default)]
    pub invoice_column: Option<usize>,
    #[serde(default)]
    pub reference_column: Option<usize>,
    #[serde(default)]
    pub transaction_id_column: Option<usize>,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: f64,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_true")]
    pub has_header: bool,
}

fn default_amount_tolerance() -> f64 {
    0.01
}

fn default_match_threshold() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            program_code_column: 0,
            vendor_column: 1,
            description_column: 2,
            amount_column: 3,
            date_column: 4,
            period_column: None,
            category_column: None,
            subcategory_column: None,
            invoice_column: Some(5),
            reference_column: None,
            transaction_id_column: None,
            date_format: None,
            amount_tolerance: default_amount_tolerance(),
            match_threshold: default_match_threshold(),
            has_header: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Program {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: i64,
    pub program_id: i64,
    pub vendor: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub planned_amount: f64,
    pub planned_date: String,
    pub actual_amount: Option<f64>,
    pub actual_date: Option<String>,
    pub invoice_link_url: Option<String>,
    pub invoice_link_text: Option<String>,
    pub notes: Option<String>,
}

impl LedgerEntry {
    /// An entry with actuals already written is spent as a match target.
    pub fn has_actuals(&self) -> bool {
        self.actual_amount.is_some() || self.actual_date.is_some()
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ImportSession {
    pub id: i64,
    pub program_id: i64,
    pub filename: String,
    pub status: SessionStatus,
    pub mapping: String,
    pub checksum: Option<String>,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub matched_rows: i64,
    pub unmatched_rows: i64,
    pub error_rows: i64,
    pub skipped_rows: i64,
    pub replaced_by_session_id: Option<i64>,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ImportTransaction {
    pub id: i64,
    pub session_id: i64,
    pub program_code: String,
    pub vendor: String,
    pub description: String,
    pub amount: f64,
    pub date: String,
    pub period: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub invoice_number: Option<String>,
    pub reference_number: Option<String>,
    pub external_id: Option<String>,
    pub status: TransactionStatus,
    pub duplicate_type: DuplicateType,
    pub duplicate_of_id: Option<i64>,
    pub matched_ledger_entry_id: Option<i64>,
    pub match_confidence: Option<f64>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct PotentialMatch {
    pub id: i64,
    pub transaction_id: i64,
    pub ledger_entry_id: i64,
    pub confidence: f64,
    pub kind: MatchKind,
    pub reasons: Vec<String>,
}

/// Normalized output of the row parser, not yet persisted.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub program_code: String,
    pub vendor: String,
    pub description: String,
    pub amount: f64,
    pub date: String,
    pub period: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub invoice_number: Option<String>,
    pub reference_number: Option<String>,
    pub external_id: Option<String>,
    pub raw_json: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for s in [
            TransactionStatus::Unmatched,
            TransactionStatus::Matched,
            TransactionStatus::Confirmed,
            TransactionStatus::Rejected,
            TransactionStatus::AddedToLedger,
            TransactionStatus::Replaced,
        ] {
            assert_eq!(TransactionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TransactionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(TransactionStatus::AddedToLedger.is_terminal());
        assert!(TransactionStatus::Replaced.is_terminal());
        assert!(!TransactionStatus::Unmatched.is_terminal());
        assert!(!TransactionStatus::Matched.is_terminal());
    }

    #[test]
    fn test_completed_is_narrower_than_terminal() {
        assert!(TransactionStatus::Confirmed.is_completed());
        assert!(TransactionStatus::AddedToLedger.is_completed());
        assert!(!TransactionStatus::Rejected.is_completed());
        assert!(!TransactionStatus::Replaced.is_completed());
    }

    #[test]
    fn test_mapping_defaults_from_partial_json() {
        let json = r#"{
            "program_code_column": 0,
            "vendor_column": 1,
            "description_column": 2,
            "amount_column": 3,
            "date_column": 4
        }"#;
        let mapping: ColumnMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.amount_tolerance, 0.01);
        assert_eq!(mapping.match_threshold, 0.7);
        assert!(mapping.has_header);
        assert!(mapping.invoice_column.is_none());
    }

    #[test]
    fn test_duplicate_type_roundtrip() {
        for d in [
            DuplicateType::None,
            DuplicateType::ExactDuplicate,
            DuplicateType::DifferentInfoConfirmed,
            DuplicateType::DifferentInfoPending,
            DuplicateType::OriginalRejected,
            DuplicateType::NoInvoicePotential,
            DuplicateType::MultiplePotential,
        ] {
            assert_eq!(DuplicateType::parse(d.as_str()), Some(d));
        }
    }
}
