//! Shared CLI helpers: path expansion, banner, status marks.

use std::path::PathBuf;

use colored::Colorize;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

pub fn print_banner(title: &str) {
    println!();
    println!(
        "{}  v{}",
        format!("gptrelay {}", title).cyan().bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!();
}

/// `✓` when `ok`, otherwise `note` in red.
pub fn mark(ok: bool, note: &str) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        note.red().to_string()
    }
}
