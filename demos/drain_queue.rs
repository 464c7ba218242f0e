//! Queue drain example
//!
//! Loads a configuration file, optionally searches a cached catalog listing,
//! queues the matches and drains the queue while printing progress lines.
//! Ctrl+C interrupts the active item; it resumes on the next run.
//!
//! ```bash
//! cargo run --example drain_queue -- config.json 0 "game title words"
//! ```

use myrient_dl::catalog::{self, ListingCache};
use myrient_dl::{Config, Event, MyrientDownloader, QueueItem, run_with_shutdown};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("myrient_dl=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "config.json".to_string()));
    let config = if config_path.is_file() {
        Config::from_file(&config_path)?
    } else {
        println!("{} not found, using defaults", config_path.display());
        Config::default()
    };

    let downloader = MyrientDownloader::new(config.clone()).await?;

    // Queue everything matching the query from the catalog's cached listing
    if let (Some(index), Some(query)) = (args.next(), args.next()) {
        let index: usize = index.parse()?;
        let profile = config
            .catalog(index)
            .ok_or_else(|| format!("no catalog with index {}", index))?;
        let cache = ListingCache::new(&config.listing_cache_dir);
        match cache.load(&profile.name) {
            Some(entries) => {
                for entry in catalog::search(&entries, &query) {
                    let item = QueueItem::new(entry.filename.clone(), index);
                    if downloader.add_to_queue(item).await? {
                        println!("Queued {} ({})", entry.display_name(), entry.size);
                    }
                }
            }
            None => println!(
                "No cached listing at {}",
                cache.path_for(&profile.name).display()
            ),
        }
    }

    let mut events = downloader.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("{}", event.message());
            if matches!(event, Event::QueueDrained { .. } | Event::Shutdown) {
                break;
            }
        }
    });

    let drain = downloader.start_queue_processor();
    tokio::select! {
        result = drain => {
            let processed = result??;
            println!("Processed {} item(s)", processed);
        }
        result = run_with_shutdown(downloader.clone()) => result?,
    }

    printer.await?;
    Ok(())
}
