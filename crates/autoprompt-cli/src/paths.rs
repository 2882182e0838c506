//! Data and config file locations.
//!
//! Priority for the data directory:
//! 1. `AUTOPROMPT_DATA_DIR` (explicit override)
//! 2. Platform data dir (`$XDG_DATA_HOME/autoprompt`, `~/Library/Application Support/autoprompt`)
//! 3. `~/.autoprompt` (home directory fallback)
//! 4. System temp dir (last resort)
//!
//! The optional user pattern file lives at `{config_dir}/autoprompt/patterns.json`.

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "autoprompt";

/// Get data directory with priority fallback (empty override is ignored).
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("AUTOPROMPT_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(data) = dirs::data_dir() {
        return data.join(APP_DIR);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".autoprompt");
    }

    env::temp_dir().join(APP_DIR)
}

/// Path of the persisted busy-duration record.
pub fn get_record_path() -> PathBuf {
    get_data_dir().join("records.json")
}

/// Default user pattern file, if a config directory exists.
pub fn get_default_patterns_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("patterns.json"))
}
