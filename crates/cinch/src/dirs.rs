//! Platform directory lookup for user-level configuration

use std::path::PathBuf;

use etcetera::{BaseStrategy, choose_base_strategy};

/// Name of the per-user and per-project configuration file
pub const CONFIG_FILE_NAME: &str = "cinch.toml";

/// Directory holding the user's cinch configuration, e.g. `~/.config/cinch`
pub fn user_config_dir() -> Option<PathBuf> {
    choose_base_strategy()
        .ok()
        .map(|strategy| strategy.config_dir().join("cinch"))
}

/// Full path of the user-level configuration file, whether or not it exists
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}
