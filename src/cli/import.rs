use std::path::Path;

use colored::Colorize;

use crate::cli::{open_db, resolve_program};
use crate::error::{MatchbookError, Result};
use crate::models::ColumnMapping;
use crate::session::{create_session, process_file, ProcessOutcome};

pub fn run(file: &str, program: Option<&str>, mapping_path: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let code = resolve_program(program)?;
    let mapping = load_mapping(mapping_path)?;

    let path = Path::new(file);
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or(file);
    let session_id = create_session(&conn, &code, filename, &mapping)?;
    let out = process_file(&conn, session_id, path)?;

    println!("Session #{session_id} {}", "completed".green());
    print_summary(&out);
    if out.matched > 0 {
        println!("Run `matchbook sessions show {session_id}` to review candidate matches.");
    }
    Ok(())
}

fn load_mapping(mapping_path: Option<&str>) -> Result<ColumnMapping> {
    match mapping_path {
        Some(p) => {
            let content = std::fs::read_to_string(p)?;
            serde_json::from_str(&content)
                .map_err(|e| MatchbookError::Validation(format!("bad mapping file {p}: {e}")))
        }
        None => Ok(ColumnMapping::default()),
    }
}

pub(crate) fn print_summary(out: &ProcessOutcome) {
    println!(
        "{} rows: {} imported ({} matched, {} unmatched), {} skipped, {} errors",
        out.total,
        out.processed,
        out.matched.to_string().green(),
        out.unmatched.to_string().yellow(),
        out.skipped,
        if out.errors > 0 {
            out.errors.to_string().red().to_string()
        } else {
            out.errors.to_string()
        },
    );
}
