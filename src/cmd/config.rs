//! Configuration view and validation commands (`dispatch-board config`).

use anyhow::Result;
use dispatch_board::config::{BoardConfig, BoardToml};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config = super::resolve_config(cli)?;
    let config_path = config.path.clone();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Dispatch Board Configuration");
            println!("============================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No board.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();
            print_effective(&config);

            if !config_path.exists() {
                println!("Run 'dispatch-board config init' to create a board.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No board.toml found. Using defaults.");
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("board.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            BoardToml::default().save(&config_path)?;

            println!("Created board.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [board] kind, channel");
            println!("  - [server] base_url, ws_url, token");
            println!("  - [sync] request_timeout_secs, poll_interval_secs, keepalive_secs");
            println!("  - [sync.backoff] initial_ms, max_ms, multiplier");
            println!("  - [filters] search_debounce_ms");
            println!();
        }
    }

    Ok(())
}

/// Effective values after environment and CLI overrides.
fn print_effective(config: &BoardConfig) {
    let toml = &config.toml;

    println!("[board]");
    println!("  kind = \"{}\"", toml.board.kind);
    println!("  channel = \"{}\"", toml.channel());
    println!();

    println!("[server]");
    println!("  base_url = \"{}\"", toml.server.base_url);
    match toml.ws_url() {
        Some(url) => println!("  ws_url = \"{}\"", url),
        None => println!("  ws_url = (none)"),
    }
    println!(
        "  token = {}",
        if toml.server.token.is_some() { "(set)" } else { "(none)" }
    );
    println!(
        "  status_path = \"{}\"",
        toml.server
            .status_path
            .as_deref()
            .unwrap_or(toml.board.kind.default_status_path())
    );
    println!(
        "  snapshot_path = \"{}\"",
        toml.server
            .snapshot_path
            .as_deref()
            .unwrap_or(toml.board.kind.default_snapshot_path())
    );
    println!();

    let sync = &toml.sync;
    println!("[sync]");
    println!("  request_timeout_secs = {}", sync.request_timeout_secs);
    println!("  poll_interval_secs = {}", sync.poll_interval_secs);
    println!("  keepalive_secs = {}", sync.keepalive_secs);
    println!("  connect_timeout_secs = {}", sync.connect_timeout_secs);
    println!("  resync_on_connect = {}", sync.resync_on_connect);
    println!(
        "  backoff = {}ms .. {}ms x{}",
        sync.backoff.initial_ms, sync.backoff.max_ms, sync.backoff.multiplier
    );
    println!();

    println!("[filters]");
    println!("  search_debounce_ms = {}", toml.filters.search_debounce_ms);
    println!();
}
