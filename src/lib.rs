pub mod cli;
pub mod core;
pub mod extract;
pub mod providers;
pub mod server;
pub mod store;
pub mod update;

use crate::core::config::AppConfig;
use crate::core::store::RateStore;
use crate::providers::document::DocumentFetcher;
use crate::store::disk::DiskRateStore;
use crate::update::{Trigger, UpdateCoordinator};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Serve,
    Update,
    Latest { currency: Option<String> },
    History,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxrates starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = open_store(&config)?;

    match command {
        AppCommand::Serve => {
            let coordinator = Arc::new(build_coordinator(&config, Arc::clone(&store))?);
            let timer = Arc::clone(&coordinator)
                .spawn_timer(Duration::from_secs(config.schedule.tick_secs.max(1)));

            let state = server::AppState {
                store,
                coordinator,
                default_currency: config.default_currency.clone(),
            };
            let result = server::serve(&config.server.bind, state).await;
            timer.abort();
            result
        }
        AppCommand::Update => {
            let coordinator = build_coordinator(&config, store)?;
            let spinner = cli::ui::new_spinner("Fetching rate document...");
            let report = coordinator.run_cycle(Trigger::Manual).await;
            spinner.finish_and_clear();
            println!("{}", cli::rates::display_report(&report));
            cli::rates::report_result(&report)
        }
        AppCommand::Latest { currency } => {
            let code = currency.unwrap_or_else(|| config.default_currency.clone());
            let rate = store.latest(&code.to_uppercase()).await?;
            println!("{}", cli::rates::display_rates(&[rate]));
            Ok(())
        }
        AppCommand::History => {
            let rates = store.all().await?;
            println!("{}", cli::rates::display_rates(&rates));
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn RateStore>> {
    let path = config.store_path()?;
    let store = DiskRateStore::open(&path)
        .with_context(|| format!("Failed to open rate store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_coordinator(config: &AppConfig, store: Arc<dyn RateStore>) -> Result<UpdateCoordinator> {
    let fetcher = DocumentFetcher::new(
        &config.source.url,
        config.cache_file_path()?,
        Duration::from_secs(config.source.timeout_secs),
        config.source.retries,
    )
    .context("Failed to build document fetcher")?;

    Ok(UpdateCoordinator::new(
        Arc::new(fetcher),
        store,
        config.symbols.clone(),
        config.extraction.on_malformed,
    ))
}
