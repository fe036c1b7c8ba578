use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use dispatch_board::board::{BoardKind, Priority};
use dispatch_board::config::CliOverrides;

mod cmd;

#[derive(Parser)]
#[command(name = "dispatch-board")]
#[command(version, about = "Realtime Kanban board for field-service dispatch")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to board.toml (defaults to ./board.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// REST base URL. Overrides board.toml and DISPATCH_BOARD_SERVER_URL.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// WebSocket URL. Derived from the server URL when not set.
    #[arg(long, global = true)]
    pub ws: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true, env = "DISPATCH_BOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Which board to open: work-orders or technicians
    #[arg(long, global = true)]
    pub board: Option<BoardKind>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            server: self.server.clone(),
            ws: self.ws.clone(),
            token: self.token.clone(),
            kind: self.board,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mount the board and redraw it on every change until Ctrl-C
    Watch {
        /// Only show cards matching this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Move a card to another column and wait for the server's answer
    Move {
        /// Card id
        card: String,
        /// Target status, e.g. `assigned` or `en_route`
        status: String,
    },
    /// Fetch the board once and print it
    Snapshot {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Shorthand for `--format html`
        #[arg(long)]
        html: bool,

        /// Only show cards matching this text
        #[arg(short, long)]
        search: Option<String>,

        /// Only show cards with this priority (repeatable)
        #[arg(short, long)]
        priority: Vec<Priority>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default board.toml file
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Html,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch_board::logging::init_tracing(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Watch { search } => cmd::cmd_watch(&cli, search.as_deref()).await?,
        Commands::Move { card, status } => cmd::cmd_move(&cli, card, status).await?,
        Commands::Snapshot {
            format,
            html,
            search,
            priority,
        } => {
            let format = if *html { OutputFormat::Html } else { *format };
            cmd::cmd_snapshot(&cli, format, search.as_deref(), priority).await?
        }
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
