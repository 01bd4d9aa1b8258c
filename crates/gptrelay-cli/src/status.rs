//! `gptrelay status`: show configuration and channel status.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use gptrelay_core::config::{get_config_path, load_config, ChannelKind};
use gptrelay_core::utils::mask_secret;

use crate::helpers::{mark, print_banner};

pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(get_config_path);
    let config = load_config(Some(&path));

    print_banner("status");

    println!(
        "  {:<14} {} {}",
        "Config:".bold(),
        path.display(),
        mark(path.exists(), "(not found, using defaults)")
    );
    println!(
        "  {:<14} {}:{}",
        "Listen:".bold(),
        config.server.host,
        config.server.port
    );
    println!(
        "  {:<14} {}",
        "Secret:".bold(),
        mask_secret(&config.auth.secret).dimmed()
    );
    if let Some(ref proxy) = config.transport.proxy {
        println!("  {:<14} {}", "Proxy:".bold(), proxy);
    }
    if config.transport.insecure_tls {
        println!(
            "  {:<14} {}",
            "TLS:".bold(),
            "certificate verification disabled".yellow()
        );
    }

    println!();
    println!("  {}", "Channels:".bold());
    if config.channels.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for channel in &config.channels {
        let kind = match channel.kind {
            ChannelKind::Openai => "openai",
            ChannelKind::Compat => "compat",
        };
        let state = if !channel.enabled {
            "· disabled".dimmed().to_string()
        } else if channel.is_configured() {
            format!("{} (key set)", "✓".green())
        } else {
            "· no API key".yellow().to_string()
        };
        println!(
            "    {:<12} {:<7} w={:<3} {:<40} {}",
            channel.name,
            kind,
            channel.weight,
            channel.endpoint(),
            state
        );
    }
    println!();
    Ok(())
}
