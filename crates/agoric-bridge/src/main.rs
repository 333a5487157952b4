#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

mod amount;
mod bridge;
mod chain;
mod config;
mod errors;
mod fallback;
mod invitation;
mod marshal;
mod network;
mod offers;
mod paths;
mod session;
mod store;
#[cfg(test)]
mod testutil;
mod wallet;
mod watcher;

#[derive(Parser, Debug)]
#[command(name = "agoric-bridge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge over stdio.
    ///
    /// Each input line is one request (`{"type", "id", "data"}`); each output line is one reply
    /// tagged `AGORIC_RESPONSE`, plus a single `AGORIC_READY` once the chain watcher is up.
    Serve {
        /// Network to start on (mainnet, devnet, emerynet, local). Overrides config.
        #[arg(long)]
        network: Option<String>,
    },

    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print the known network profiles.
    Networks,
}

fn init_logging(paths: &paths::BridgePaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("agoric-bridge.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // stdout carries the message protocol; logs go to stderr and the log file only.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

async fn serve(paths: &paths::BridgePaths, network: Option<String>) -> eyre::Result<()> {
    let mut cfg = store::ConfigStore::new(paths).load_or_init_default()?;
    if let Some(n) = network {
        cfg.default_network = n;
    }

    let storage: Arc<dyn watcher::ChainStorage> =
        Arc::new(chain::VstorageClient::new(cfg.poll_interval())?);
    let extension: Option<Arc<dyn wallet::WalletExtension>> =
        match store::load_mnemonic(paths).context("load keyring mnemonic")? {
            Some(phrase) => {
                let keyring = chain::LocalKeyring::from_mnemonic(&phrase, &cfg.keyring)?;
                info!(address = keyring.address(), "local keyring loaded");
                Some(Arc::new(keyring))
            }
            None => {
                info!("no keyring mnemonic; wallet requests will report no extension");
                None
            }
        };
    let offers = Arc::new(chain::AgdOfferBackend::new(
        cfg.agd.clone(),
        Arc::clone(&storage),
    ));
    let tx_search = Arc::new(chain::RestTxSearch::new()?);

    let start_network = cfg.default_network.clone();
    let bridge = Arc::new(session::Bridge::new(
        cfg, extension, storage, offers, tx_search,
    ));
    info!(network = %start_network, "bridge starting");
    bridge::serve(bridge, tokio::io::stdin(), tokio::io::stdout()).await
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::BridgePaths::discover()?;
    std::fs::create_dir_all(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Serve { network } => serve(&paths, network).await.context("bridge failed"),
        Command::Paths => {
            use std::io::Write as _;
            let s = serde_json::to_string(&serde_json::json!({
              "config_dir": paths.config_dir,
              "data_dir": paths.data_dir,
              "log_file": paths.log_file,
            }))
            .context("serialize paths")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write paths")?;
            Ok(())
        }
        Command::Networks => {
            use std::io::Write as _;
            let s = serde_json::to_string_pretty(network::PROFILES)
                .context("serialize network profiles")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write network profiles")?;
            Ok(())
        }
    }
}
