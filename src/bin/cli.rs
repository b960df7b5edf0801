//! cowkv CLI
//!
//! Command-line interface for inspecting and editing a cowkv store file.

use std::process;

use clap::{Parser, Subcommand};
use cowkv::{Config, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// cowkv CLI
#[derive(Parser, Debug)]
#[command(name = "cowkv")]
#[command(about = "Embedded copy-on-write B+tree key-value store")]
#[command(version)]
struct Args {
    /// Store file
    #[arg(short, long, default_value = "./cowkv.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List key-value pairs in key order
    Scan {
        /// First key (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Last key (exclusive)
        #[arg(long)]
        to: Option<String>,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show committed store state
    Stats,

    /// Verify tree structure and page accounting
    Check,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cowkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let create = matches!(args.command, Commands::Set { .. });
    let config = Config::builder()
        .path(&args.db)
        .create_if_missing(create)
        .build();

    let store = match Store::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.db, e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&store, args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(store: &Store, command: Commands) -> cowkv::Result<()> {
    match command {
        Commands::Get { key } => match store.get(key.as_bytes())? {
            Some(val) => println!("{}", String::from_utf8_lossy(&val)),
            None => {
                println!("(nil)");
                process::exit(2);
            }
        },
        Commands::Set { key, value } => {
            store.set(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            let deleted = store.del(key.as_bytes())?;
            println!("{}", if deleted { "1" } else { "0" });
        }
        Commands::Scan { from, to, limit } => {
            let start = from.map(String::into_bytes);
            let end = to.map(String::into_bytes);
            let range = (
                start.map_or(std::ops::Bound::Unbounded, std::ops::Bound::Included),
                end.map_or(std::ops::Bound::Unbounded, std::ops::Bound::Excluded),
            );
            let entries = store.scan::<Vec<u8>, _>(range)?;
            for entry in entries.take(limit.unwrap_or(usize::MAX)) {
                let (key, val) = entry?;
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&val)
                );
            }
        }
        Commands::Stats => {
            let stats = store.stats();
            println!("txid        {}", stats.txid);
            println!("root        {}", stats.root);
            println!("pages       {}", stats.page_count);
            println!("free pages  {}", stats.free_pages);
        }
        Commands::Check => {
            let tree = store.verify()?;
            println!(
                "ok: {} keys, height {}, {} internal nodes, {} leaves",
                tree.keys, tree.height, tree.internal_nodes, tree.leaves
            );
        }
    }
    Ok(())
}
