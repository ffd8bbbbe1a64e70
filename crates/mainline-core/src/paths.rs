use dirs::home_dir;
use std::path::PathBuf;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "MAINLINE_HOME";

/// Returns the primary data directory, or None if the user's home cannot be resolved.
pub fn try_mainline_home() -> Option<PathBuf> {
    if let Some(val) = std::env::var_os(HOME_ENV) {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".mainline"))
}

/// Returns the mainline home directory (`~/.mainline`), falling back to a
/// relative `.mainline` when no home directory exists.
pub fn mainline_home() -> PathBuf {
    try_mainline_home().unwrap_or_else(|| PathBuf::from(".mainline"))
}

/// Content store: ~/.mainline/cache
pub fn cache_path() -> PathBuf {
    mainline_home().join("cache")
}

/// Configuration file: ~/.mainline/config.toml
pub fn config_path() -> PathBuf {
    mainline_home().join("config.toml")
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}
