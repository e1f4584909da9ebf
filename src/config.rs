use crate::console::ConsoleOptions;
use crate::session::INITIAL_BANK;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "chip-tracker", about = "Track poker chips and bank balances shared across a room")]
pub struct Cli {
    /// Directory holding the shared room files.
    #[arg(long, default_value = ".chip-tracker")]
    pub data_dir: PathBuf,
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(250..=10_000))]
    pub poll_interval_ms: u64,
    #[arg(long, default_value_t = INITIAL_BANK)]
    pub initial_bank: i64,
    /// Enter this room directly.
    #[arg(long)]
    pub room: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    /// Keep rooms in memory only; nothing is shared with other processes.
    #[arg(long)]
    pub memory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub initial_bank: i64,
    pub console: ConsoleOptions,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let store = if cli.memory {
            StoreConfig::Memory
        } else {
            StoreConfig::Directory(cli.data_dir)
        };
        Self {
            store,
            initial_bank: cli.initial_bank,
            console: ConsoleOptions {
                poll_interval: Duration::from_millis(cli.poll_interval_ms),
                initial_room: cli.room,
                name: cli.name,
            },
        }
    }
}
