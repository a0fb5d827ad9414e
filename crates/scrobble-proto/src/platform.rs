//! Where scrobble-feed keeps its files.
//!
//! Unix-likes, macOS included, use the XDG layout (`$XDG_DATA_HOME`,
//! `$XDG_CONFIG_HOME`, falling back to `~/.local/share` and `~/.config`).
//! Other platforms use their native per-user directories.

use std::path::PathBuf;

const APP_DIR: &str = "scrobble-feed";

fn xdg_or_home(var: &str, home_relative: &str) -> PathBuf {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(home_relative)))
        .unwrap_or_else(std::env::temp_dir)
}

/// Session file and log.
pub fn data_dir() -> PathBuf {
    let base = if cfg!(unix) {
        xdg_or_home("XDG_DATA_HOME", ".local/share")
    } else {
        dirs::data_local_dir().unwrap_or_else(std::env::temp_dir)
    };
    base.join(APP_DIR)
}

/// `config.toml`.
pub fn config_dir() -> PathBuf {
    let base = if cfg!(unix) {
        xdg_or_home("XDG_CONFIG_HOME", ".config")
    } else {
        dirs::config_dir().unwrap_or_else(std::env::temp_dir)
    };
    base.join(APP_DIR)
}

pub fn log_path() -> PathBuf {
    data_dir().join("scrobble-feed.log")
}
