#![forbid(unsafe_code)]

mod cli;

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{self, bail};

use cli::Cli;
use s3browse::model::event::{Event, EventBus};
use s3browse::model::session_state::SessionState;
use s3browse::services::s3_store::S3Store;
use s3browse::services::view_state::ViewState;
use s3browse::settings;
use s3browse::utils::{format_bytes, initialize_logging, initialize_panic_handler};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    initialize_logging()?;
    initialize_panic_handler()?;
    let args = Cli::parse();

    let mut settings = settings::load(args.config.as_deref())?;
    if let Some(bucket) = args.bucket {
        settings.bucket = bucket;
    }
    if let Some(prefix) = args.prefix {
        settings.prefix = prefix;
    }
    if args.flat {
        settings.delimiter = String::new();
    }
    if settings.bucket.is_empty() {
        bail!("no bucket configured; pass --bucket or set one in the settings file");
    }

    let (events, mut event_rx) = EventBus::new();
    let store = Arc::new(S3Store::new(&settings));
    let mut view = ViewState::new(store, events, settings);
    view.refresh();

    while let Some(event) = event_rx.recv().await {
        view.apply_event(&event);
        match event {
            Event::Page { entries, .. } => {
                for entry in &entries {
                    if entry.is_folder {
                        println!("{:>10}  {}", "DIR", entry.key);
                    } else {
                        let size = entry.size.map(format_bytes).unwrap_or_default();
                        println!("{:>10}  {}", size, entry.key);
                    }
                }
            }
            Event::Error(report) => eprintln!("{}", report),
            Event::ListingFinished { state, .. } => {
                let counts = view.counts();
                println!(
                    "{}: {} objects, {} folders",
                    state, counts.objects, counts.folders
                );
                if state == SessionState::Failed {
                    std::process::exit(1);
                }
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
