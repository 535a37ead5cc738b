//! vibestore - inspect and edit a record store file

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use std::path::{Path, PathBuf};
use vibestore::config::{CacheOptions, StoreOptions};
use vibestore::database::Database;
use vibestore::inspect::StoreSummary;
use vibestore::record::{BaseRecordManager, RecordId};
use vibestore::storage::PageType;

/// vibestore - embedded record store tool
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store file
    #[arg(short = 'f', long, default_value = "./vibestore.db")]
    file: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Write blocks straight to the data file instead of logging them
    #[arg(long)]
    no_transactions: bool,

    /// Compress records (only honoured when the store is created)
    #[arg(long)]
    compress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show block, page list, root and name counts
    Info,
    /// List the pages of every page list
    Pages,
    /// Print a record
    Get { id: u64 },
    /// Store a record, creating the store if needed
    Put {
        data: String,
        /// Replace this record instead of inserting a new one
        #[arg(long)]
        id: Option<u64>,
        /// Bind the record to a name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Delete a record
    Delete { id: u64 },
    /// List named records
    Names,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let options = StoreOptions::default()
        .with_transactions(!args.no_transactions)
        .with_compression(args.compress)
        .with_cache(CacheOptions::Disabled);

    match args.command {
        Command::Info => {
            let summary = summarize(&args.file, &options)?;
            print!("{}", summary);
        }
        Command::Pages => {
            let summary = summarize(&args.file, &options)?;
            for list in &summary.page_lists {
                let ids: Vec<String> = list.pages.iter().map(|id| id.to_string()).collect();
                println!("{}: [{}]", list.page_type, ids.join(", "));
            }
            let total: usize = PageType::ALL
                .iter()
                .map(|&page_type| summary.page_count(page_type))
                .sum();
            println!("{} pages in {} blocks", total, summary.block_count);
        }
        Command::Get { id } => {
            let db = Database::open_with_options(&args.file, options)?;
            match db.fetch_bytes(RecordId(id))? {
                Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                None => bail!("Record {} does not exist", id),
            }
        }
        Command::Put { data, id, name } => {
            let db = if args.file.exists() {
                Database::open_with_options(&args.file, options)?
            } else {
                Database::create_with_options(&args.file, options)?
            };
            let id = match id {
                Some(id) => {
                    let id = RecordId(id);
                    db.update_bytes(id, data.as_bytes())
                        .with_context(|| format!("Failed to update record {}", id))?;
                    id
                }
                None => db.insert_bytes(data.as_bytes())?,
            };
            if let Some(name) = name {
                db.set_named_object(&name, id)?;
            }
            db.close().context("Failed to close store")?;
            println!("{}", id);
        }
        Command::Delete { id } => {
            let db = Database::open_with_options(&args.file, options)?;
            db.delete(RecordId(id))
                .with_context(|| format!("Failed to delete record {}", id))?;
            db.close().context("Failed to close store")?;
        }
        Command::Names => {
            let summary = summarize(&args.file, &options)?;
            for (name, id) in &summary.names {
                println!("{}\t{}", name, id);
            }
        }
    }

    Ok(())
}

fn summarize(path: &Path, options: &StoreOptions) -> Result<StoreSummary> {
    if !path.exists() {
        bail!("Store file does not exist at {:?}", path);
    }
    let mut recman =
        BaseRecordManager::open_for_inspection(path, options).context("Failed to open store")?;
    Ok(StoreSummary::collect(&mut recman)?)
}
