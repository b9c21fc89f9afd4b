use std::path::Path;

use crate::cli::import::print_summary;
use crate::cli::open_db;
use crate::error::Result;
use crate::replace::{replace_session, ReplaceOptions};

pub fn run(
    session_id: i64,
    file: &str,
    force: bool,
    preserve_all: bool,
    preserve_confirmed: bool,
) -> Result<()> {
    let conn = open_db()?;
    let path = Path::new(file);
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or(file);
    let out = replace_session(
        &conn,
        session_id,
        path,
        filename,
        ReplaceOptions {
            force_replace: force,
            preserve_all_matches: preserve_all,
            preserve_confirmed_matches: preserve_confirmed,
        },
    )?;
    println!(
        "Session #{session_id} replaced by #{} ({} preserved, {} replaced).",
        out.new_session_id, out.preserved, out.replaced
    );
    print_summary(&out.pipeline);
    Ok(())
}
