pub mod ai;
pub mod app;
pub mod cli;
pub mod config;
pub mod models;
pub mod notify;
pub mod stats;
pub mod storage;
pub mod timer;
mod utils;

use clap::Parser;

pub fn run() {
    let cli = cli::Cli::parse();

    // Initialize logging (reads RUST_LOG env var)
    let level = if cli.verbose || config::debug_from_env() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("FocusPal starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(cli::execute(cli)) {
        log::error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
