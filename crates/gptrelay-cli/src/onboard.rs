//! `gptrelay onboard`: write `~/.gptrelay/config.json` with defaults.

use anyhow::{Context, Result};
use colored::Colorize;

use gptrelay_core::config::{get_config_path, save_config, Config};

use crate::helpers::print_banner;

pub fn run() -> Result<()> {
    print_banner("setup");

    let config_path = get_config_path();
    if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        save_config(&Config::default(), Some(&config_path))
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
    }

    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Set an apiKey for each channel in the config file");
    println!("  2. Change auth.secret from its default");
    println!("  3. Run {}", "gptrelay serve".cyan());
    println!();
    Ok(())
}
