//! CLI command implementations.
//!
//! | Module       | Commands handled           |
//! |--------------|----------------------------|
//! | `watch`      | `Watch`                    |
//! | `move_card`  | `Move`                     |
//! | `snapshot`   | `Snapshot`                 |
//! | `config`     | `Config`                   |
//! | `display`    | Terminal rendering helpers |

pub mod config;
pub mod display;
pub mod move_card;
pub mod snapshot;
pub mod watch;

pub use config::cmd_config;
pub use move_card::cmd_move;
pub use snapshot::cmd_snapshot;
pub use watch::cmd_watch;

use anyhow::Result;
use dispatch_board::config::BoardConfig;

use super::Cli;

/// Resolve `board.toml` plus environment plus CLI flags.
pub(crate) fn resolve_config(cli: &Cli) -> Result<BoardConfig> {
    BoardConfig::resolve(cli.config.as_deref(), &cli.overrides())
}
