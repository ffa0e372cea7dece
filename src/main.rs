use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vidfeed::cache::{
    CacheManager, CacheService, CacheStorage, CacheStore, Downloader, EvictionPolicy,
    PrefetchOutcome,
};
use vidfeed::config::Config;
use vidfeed::models::ContentDescriptor;
use vidfeed::workers::{NetworkMonitor, PathUpdate};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidfeed=info")),
        )
        .init();

    let mut args = std::env::args().skip(1).peekable();
    let config = if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        let path = args.next().context("--config needs a path")?;
        Config::load_from(&PathBuf::from(path))?
    } else {
        Config::load()?
    };

    let descriptors = args
        .map(|arg| parse_descriptor(&arg))
        .collect::<Result<Vec<_>>>()?;
    if descriptors.is_empty() {
        bail!("usage: vidfeed [--config <path>] <id=url>...");
    }

    info!("Starting vidfeed");
    let cache_dir = config.cache.cache_directory()?;
    let storage = CacheStorage::spawn(cache_dir)
        .await
        .context("Failed to open video cache")?;
    let store: Arc<dyn CacheStore> = Arc::new(storage.clone());

    let manager = Arc::new(CacheManager::new(
        store.clone(),
        EvictionPolicy::from_config(&config.cache),
    ));

    let monitor = Arc::new(NetworkMonitor::new());
    let (path_tx, path_rx) = mpsc::unbounded_channel();
    tokio::spawn(monitor.clone().run(path_rx));
    // No OS path observer here; report the configured interface once
    monitor.handle_path_update(PathUpdate::from_interface(config.network.assumed_interface));

    let service = CacheService::new(
        store,
        manager,
        monitor,
        Downloader::new(&config.cache)?,
        config.cache.prefetch_limit,
    );

    for handle in service.prefetch(&descriptors) {
        let key = handle.key().clone();
        match handle.outcome().await {
            PrefetchOutcome::Completed => info!("Cached {}", key),
            PrefetchOutcome::AlreadyCached => info!("{} already cached", key),
            PrefetchOutcome::Cancelled => warn!("Prefetch of {} cancelled", key),
            PrefetchOutcome::Failed(e) => warn!("Prefetch of {} failed: {}", key, e),
        }
    }

    info!("{}", service.current_metrics().format_report());
    info!(
        "{}",
        service
            .prefetch_stats()
            .format_report(service.active_prefetches())
    );

    drop(path_tx);
    storage.shutdown()?;
    Ok(())
}

fn parse_descriptor(arg: &str) -> Result<ContentDescriptor> {
    match arg.split_once('=') {
        Some((id, url)) if !id.is_empty() && !url.is_empty() => Ok(ContentDescriptor::new(id, url)),
        _ => bail!("expected <id>=<url>, got {arg:?}"),
    }
}
