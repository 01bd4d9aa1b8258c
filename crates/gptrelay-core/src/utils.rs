//! Utility helpers: data paths and log-safe string handling.

use std::path::PathBuf;

/// Get the gptrelay data directory (e.g. `~/.gptrelay/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".gptrelay")
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Mask a credential for logging: keep the first four characters.
pub fn mask_secret(s: &str) -> String {
    let visible: String = s.chars().take(4).collect();
    if s.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
