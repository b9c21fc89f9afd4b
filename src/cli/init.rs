use std::path::PathBuf;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{self, Settings};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let env_override = std::env::var("MATCHBOOK_DATA_DIR")
        .ok()
        .filter(|v| !v.is_empty());

    let dir = match (&env_override, &data_dir) {
        (Some(env), _) => PathBuf::from(env),
        (None, Some(d)) => PathBuf::from(d),
        (None, None) => settings::get_data_dir(),
    };
    std::fs::create_dir_all(&dir)?;
    let conn = get_connection(&dir.join("matchbook.db"))?;
    init_db(&conn)?;

    // MATCHBOOK_DATA_DIR already pins the location; don't persist over it.
    if env_override.is_none() {
        let mut s: Settings = settings::load_settings();
        s.data_dir = dir.to_string_lossy().to_string();
        settings::save_settings(&s)?;
    }

    println!("Initialized matchbook at {}", dir.display());
    Ok(())
}
