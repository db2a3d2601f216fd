//! Line-driven scanning session over a JSON product catalog.
//!
//! ```bash
//! scanq --catalog products.json --journal scans.db
//! > scan 0123456789 sale
//! > del gid://shopify/Product/1 sale
//! > history
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use scanqueue::{
    catalog::memory::InMemoryCatalog,
    channel::{executor::collect_tagged, fetcher::FetcherChannel},
    config::SessionConfig,
    core::session::SessionState,
    persist::{HistorySink, sqlite::SqliteHistorySink},
    record::ResultRecord,
    runtime::{
        events::SessionEvent,
        handle::{SessionHandle, spawn_session_with_state},
    },
};

#[derive(Parser)]
#[command(name = "scanq")]
#[command(version, about = "Sequential barcode scan and tag queue")]
struct Cli {
    /// Product catalog as a JSON array
    #[arg(long)]
    catalog: PathBuf,

    /// Session config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite journal of settled scans
    #[arg(long)]
    journal: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scanqueue=info,scanq=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("scanq failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let raw = tokio::fs::read_to_string(&cli.catalog).await?;
    let catalog = Arc::new(InMemoryCatalog::from_json(&raw)?);

    let (state, sink) = match &cli.journal {
        Some(path) => {
            let sink = SqliteHistorySink::open(path)?;
            let state = sink.load_session(&config)?;
            (state, Some(Box::new(sink) as Box<dyn HistorySink>))
        }
        None => (SessionState::with_config(&config), None),
    };
    let page_size = config.page_size;
    let handle = spawn_session_with_state(
        state,
        FetcherChannel::new(Arc::clone(&catalog)),
        sink,
        config,
    );
    info!("session ready");

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::Settled { seq, success, .. } = event {
                println!("#{seq} {}", if success { "ok" } else { "FAILED" });
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let queued = match words.as_slice() {
            [] => continue,
            ["quit" | "exit"] => break,
            ["scan", barcode] => handle.search_and_tag(*barcode, None),
            ["scan", barcode, tag] => handle.search_and_tag(*barcode, Some(*tag)),
            ["del", product, tag] => handle.delete_tag(*product, *tag),
            ["add", product, tag] => handle.add_tag(*product, *tag),
            ["refresh", product] => handle.refresh(*product),
            ["cancel", seq] => {
                match seq.parse() {
                    Ok(seq) => println!("cancelled: {}", handle.cancel(seq)),
                    Err(_) => println!("bad sequence {seq:?}"),
                }
                continue;
            }
            ["tagged", tag] => {
                match collect_tagged(&*catalog, tag, page_size).await {
                    Ok(products) => {
                        for product in products {
                            println!("{}  {}", product.id, product.title);
                        }
                    }
                    Err(e) => println!("tag search failed: {e}"),
                }
                continue;
            }
            ["wait"] => {
                handle.wait_idle().await;
                continue;
            }
            ["history"] => {
                handle.wait_idle().await;
                print_history(&handle);
                continue;
            }
            ["reset"] => {
                handle.reset_tag_status();
                continue;
            }
            _ => {
                println!("commands: scan <barcode> [tag] | del <id> <tag> | add <id> <tag> | refresh <id> | cancel <seq> | tagged <tag> | wait | history | reset | quit");
                continue;
            }
        };
        match queued {
            Ok(seq) => println!("queued #{seq}"),
            Err(e) => println!("rejected: {e}"),
        }
    }

    handle.shutdown().await?;
    Ok(())
}

fn print_history(handle: &SessionHandle) {
    for record in handle.history() {
        print_record(handle, &record);
    }
}

fn print_record(handle: &SessionHandle, record: &ResultRecord) {
    let tag = record.tag_used.as_deref().unwrap_or("-");
    match (&record.error, record.primary()) {
        (Some(err), _) => println!("#{} [{tag}] error: {err}", record.op_seq),
        (None, Some(product)) => {
            let link = handle.admin_url(&product.id).unwrap_or_default();
            println!(
                "#{} [{tag}] {} (inventory {}) {link}",
                record.op_seq, product.title, product.total_inventory
            );
            for variant in &product.variants {
                for batch in &variant.expiration_batches {
                    println!("    {} {:?}: {}", variant.title, batch.severity, batch.label());
                }
            }
        }
        (None, None) => println!("#{} [{tag}] no product", record.op_seq),
    }
}
