//! partkv Inspect Binary
//!
//! Looks at a store directory on local disk.

use std::path::Path;

use clap::{Parser, Subcommand};
use partkv::store_dir::StoreDirectory;
use partkv::{StoreConfig, StoreStorageEngine, TableFormat};
use tracing_subscriber::{fmt, EnvFilter};

/// partkv store inspector
#[derive(Parser, Debug)]
#[command(name = "partkv-inspect")]
#[command(about = "Inspect a partkv store directory")]
#[command(version)]
struct Args {
    /// Root directory holding all stores
    #[arg(short, long, default_value = "./partkv_data")]
    root: String,

    /// Store name
    #[arg(short, long)]
    store: String,

    /// Open with the plain table format instead of block based
    #[arg(long)]
    plain_table: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List partition ids persisted on disk
    Ids,

    /// Print the store's on-disk size in bytes
    Size,

    /// Open the store as its owner and print a summary
    ///
    /// A table format conflict wipes the store, as it would for the server.
    Open,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,partkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> partkv::Result<()> {
    let store_dir = StoreDirectory::resolve(Path::new(&args.root), &args.store)?;

    match args.command {
        Commands::Ids => {
            for id in store_dir.list_persisted_partition_ids()? {
                println!("{}", id);
            }
        }
        Commands::Size => {
            println!("{}", store_dir.size_in_bytes());
        }
        Commands::Open => {
            let table_format = if args.plain_table {
                TableFormat::PlainTable
            } else {
                TableFormat::BlockBasedTable
            };
            let config = StoreConfig::builder()
                .root_dir(&args.root)
                .store_name(&args.store)
                .table_format(table_format)
                .build();

            let engine = StoreStorageEngine::open(config)?;
            println!("store:      {}", engine.store_name());
            println!("directory:  {}", engine.store_dir().display());
            println!("partitions: {:?}", engine.partition_ids());
            println!("size:       {} bytes", engine.size_in_bytes());
            engine.close()?;
        }
    }

    Ok(())
}
