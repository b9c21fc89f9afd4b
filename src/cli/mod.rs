pub mod import;
pub mod init;
pub mod ledger;
pub mod programs;
pub mod replace;
pub mod review;
pub mod sessions;
pub mod status;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db;
use crate::error::{MatchbookError, Result};
use crate::settings;

/// Open (and if needed initialize) the database under the data directory.
pub(crate) fn open_db() -> Result<Connection> {
    let dir = settings::get_data_dir();
    std::fs::create_dir_all(&dir)?;
    let conn = db::get_connection(&settings::db_path())?;
    db::init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn resolve_program(arg: Option<&str>) -> Result<String> {
    arg.map(str::to_string)
        .or_else(settings::default_program)
        .ok_or_else(|| {
            MatchbookError::Validation(
                "no --program given and no default program set".to_string(),
            )
        })
}

#[derive(Parser)]
#[command(
    name = "matchbook",
    about = "Import reconciliation CLI for program budget ledgers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up matchbook: choose a data directory and initialize the database.
    Init {
        /// Path for matchbook data (default: ~/Documents/matchbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage programs.
    Programs {
        #[command(subcommand)]
        command: ProgramsCommands,
    },
    /// Manage planned-budget ledger entries.
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Import a vendor transaction file (CSV/XLSX) and match it against the ledger.
    Import {
        /// Path to the vendor export file
        file: String,
        /// Program code, e.g. ABC.1001 (default: settings default_program)
        #[arg(long)]
        program: Option<String>,
        /// Path to a column-mapping JSON file
        #[arg(long)]
        mapping: Option<String>,
    },
    /// Inspect and manage import sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommands,
    },
    /// Review candidate matches and act on them.
    Matches {
        #[command(subcommand)]
        command: MatchesCommands,
    },
    /// Replace a prior import session with a corrected file.
    Replace {
        /// Session ID to replace
        session_id: i64,
        /// Path to the corrected vendor export file
        file: String,
        /// Reverse ledger side-effects and replace every prior transaction
        #[arg(long)]
        force: bool,
        /// Keep matched, confirmed, and added transactions
        #[arg(long = "preserve-all")]
        preserve_all: bool,
        /// Keep only confirmed and added transactions
        #[arg(long = "preserve-confirmed")]
        preserve_confirmed: bool,
    },
    /// Show the current database and per-program summary.
    Status,
    /// Generate shell completions.
    Completions {
        /// Shell: bash, zsh, fish, elvish, powershell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ProgramsCommands {
    /// Add a program.
    Add {
        /// Program code, e.g. ABC.1001
        code: String,
        /// Program name
        #[arg(long)]
        name: String,
        /// Make this the default program for imports
        #[arg(long)]
        default: bool,
    },
    /// List all programs.
    List,
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Load planned-budget lines from a CSV (vendor, description, category,
    /// planned_amount, planned_date).
    Load {
        /// Path to the ledger CSV
        file: String,
        /// Program code
        #[arg(long)]
        program: Option<String>,
    },
    /// Add a single planned-budget line.
    Add {
        /// Program code
        #[arg(long)]
        program: Option<String>,
        /// Vendor name
        #[arg(long)]
        vendor: String,
        /// Planned amount
        #[arg(long)]
        amount: f64,
        /// Planned date: YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Expense description
        #[arg(long)]
        description: Option<String>,
        /// Category
        #[arg(long)]
        category: Option<String>,
    },
    /// List ledger entries for a program.
    List {
        /// Program code
        #[arg(long)]
        program: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionsCommands {
    /// List import sessions.
    List {
        /// Filter by program code
        #[arg(long)]
        program: Option<String>,
    },
    /// Show one session and its transactions.
    Show {
        /// Session ID (shown in `matchbook sessions list`)
        id: i64,
    },
    /// Cancel a pending or processing session.
    Cancel {
        /// Session ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum MatchesCommands {
    /// List candidate matches for a transaction.
    List {
        /// Transaction ID
        transaction_id: i64,
    },
    /// Confirm a candidate: bind the transaction and write ledger actuals.
    Confirm {
        /// Transaction ID
        transaction_id: i64,
        /// Ledger entry ID
        ledger_entry_id: i64,
    },
    /// Reject a candidate pair.
    Reject {
        /// Transaction ID
        transaction_id: i64,
        /// Ledger entry ID
        ledger_entry_id: i64,
    },
    /// Undo a rejection and regenerate candidates.
    UndoReject {
        /// Transaction ID
        transaction_id: i64,
        /// Ledger entry ID
        ledger_entry_id: i64,
    },
    /// Remove a confirmed match and reverse the ledger actuals.
    Remove {
        /// Transaction ID
        transaction_id: i64,
    },
    /// Create a ledger entry from an unmatched transaction.
    AddToLedger {
        /// Transaction ID
        transaction_id: i64,
    },
}
