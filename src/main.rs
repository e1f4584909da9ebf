use anyhow::Context;
use chip_tracker::config::{Cli, Config, StoreConfig};
use chip_tracker::console;
use chip_tracker::session::{SessionContext, SessionStore};
use chip_tracker::store::{FileStore, KeyValueStore, MemoryStore};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_target(false)
        .format_timestamp_millis()
        .init();

    let config = Config::from(Cli::parse());
    let store: Arc<dyn KeyValueStore> = match &config.store {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Directory(dir) => Arc::new(
            FileStore::open(dir).with_context(|| format!("opening store at {}", dir.display()))?,
        ),
    };
    let session = Arc::new(Mutex::new(SessionStore::new(store, SessionContext::generate(config.initial_bank))));

    let (tx, writer) = console::spawn_writer(tokio::io::stdout());
    let result = console::run(BufReader::new(tokio::io::stdin()), session, config.console, tx).await;
    // the console dropped its sender; let the writer flush what is left
    let _ = writer.await;
    result.context("reading console input")
}
