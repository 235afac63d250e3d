use anyhow::Context;
use chain_indexer::{init_tracing, Driver, IndexerConfig};
use clap::{Arg, ArgAction, Command};
use std::sync::atomic::Ordering;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("chain-indexer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Indexes proof-of-work block files and tracks the best chain")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .default_value("chain-indexer.toml"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Exit after one pass over the sources")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_tracing();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("chain-indexer.toml");
    let config = IndexerConfig::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    let follow = config.follow && !matches.get_flag("once");

    let mut driver = Driver::open(&config).context("opening the index")?;
    tracing::info!(
        "Indexing {} source(s) for {} chain(s)",
        config.sources.len(),
        config.chains.len()
    );

    let shutdown = driver.shutdown_handle();
    let signal_flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current block");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    loop {
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = driver.run_round();
            (driver, result)
        })
        .await
        .context("indexing task panicked")?;
        driver = returned;
        result.context("indexing stopped on an unrecoverable error")?;

        if !follow || shutdown.load(Ordering::Relaxed) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval()) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    tracing::info!("Indexer stopped");
    Ok(())
}
