//! countstore Dump Tool
//!
//! Inspects a counts store directory: prints headers, records or the live
//! merged view, and verifies file structure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use countstore::storage::{DurableStore, Slot, StoreFiles};
use countstore::{Config, CountsKey, CountsStore, CountsValue};
use tracing_subscriber::{fmt, EnvFilter};

/// countstore Dump Tool
#[derive(Parser, Debug)]
#[command(name = "countstore-dump")]
#[command(about = "Inspect a counts store directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./counts_data")]
    data_dir: PathBuf,

    /// Base file name (the pair is <base>.a / <base>.b)
    #[arg(short, long, default_value = "counts.db")]
    base_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every count
    Dump {
        /// Print the raw records of one file instead of the live view
        #[arg(short, long)]
        file: Option<FileArg>,
    },

    /// Print the headers of both files
    Header,

    /// Check both files for structural problems
    Verify,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FileArg {
    A,
    B,
}

impl From<FileArg> for Slot {
    fn from(arg: FileArg) -> Self {
        match arg {
            FileArg::A => Slot::A,
            FileArg::B => Slot::B,
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,countstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let files = StoreFiles::new(&args.data_dir, &args.base_name);

    let result = match args.command {
        Commands::Dump { file: Some(slot) } => dump_file(&files.path(slot.into())),
        Commands::Dump { file: None } => dump_live(&args.data_dir, &args.base_name),
        Commands::Header => print_headers(&files),
        Commands::Verify => verify(&files),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_entry(key: CountsKey, value: CountsValue) {
    println!("{} = {}", key, value);
}

fn dump_live(data_dir: &Path, base_name: &str) -> countstore::Result<bool> {
    let config = Config::builder()
        .data_dir(data_dir)
        .base_name(base_name)
        .read_only(true)
        .build();
    let store = CountsStore::open(config)?;

    println!("# live file {}", store.live_file().display());
    println!("# tx {} minor {}", store.tx_id(), store.minor_version());
    store.visit_all(&mut print_entry)?;
    Ok(true)
}

fn dump_file(path: &Path) -> countstore::Result<bool> {
    let store = DurableStore::open(path)?;
    print_header(&store);
    store.accept(&mut print_entry)?;
    Ok(true)
}

fn print_header(store: &DurableStore) {
    let header = store.header();
    println!("# file {}", store.path().display());
    println!("#   last committed tx  {}", header.last_committed_tx_id);
    println!("#   minor version      {}", header.minor_version);
    println!("#   records            {}", header.record_count);
    println!("#   gap-free tx        {}", header.highest_gap_free_tx_id);
    println!("#   stray tx ids       {:?}", store.stray_tx_ids());
}

fn print_headers(files: &StoreFiles) -> countstore::Result<bool> {
    let mut all_valid = true;
    for slot in [Slot::A, Slot::B] {
        let path = files.path(slot);
        match DurableStore::open(&path) {
            Ok(store) => print_header(&store),
            Err(e) => {
                println!("# file {}: {}", path.display(), e);
                all_valid = false;
            }
        }
    }
    Ok(all_valid)
}

fn verify(files: &StoreFiles) -> countstore::Result<bool> {
    let mut all_valid = true;
    for slot in [Slot::A, Slot::B] {
        let path = files.path(slot);
        let store = match DurableStore::open(&path) {
            Ok(store) => store,
            Err(e) => {
                println!("{}: {}", path.display(), e);
                all_valid = false;
                continue;
            }
        };
        let report = store.consistency_check()?;
        if report.is_consistent() {
            println!("{}: ok ({} records)", path.display(), report.records_checked);
        } else {
            all_valid = false;
            for issue in &report.issues {
                println!("{}: {}", path.display(), issue);
            }
        }
    }
    Ok(all_valid)
}
