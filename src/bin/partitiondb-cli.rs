//! Thin inspection CLI exposing the Core API as shell subcommands, one
//! subcommand per operation, built with `clap::Parser` derive macros.

use clap::{Parser, Subcommand};
use partitiondb::{Engine, EngineConfig, PatchOp};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "partitiondb-cli", about = "Inspect and drive a partitiondb data directory")]
struct Cli {
    /// Root data directory for the engine (holds the catalog and every database's files).
    #[arg(long, default_value = "./partitiondb-data")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every active logical database.
    ListDbs,
    /// Create a new logical database.
    CreateDb { name: String },
    /// Show engine-level stats for a database.
    Stats { db: String },
    /// List a database's collections.
    ListCollections { db: String },
    /// Create a collection.
    CreateCollection { db: String, name: String },
    /// Insert a document (JSON payload read as a raw argument).
    Put { db: String, collection: String, doc_id: u64, json: String },
    /// Read a document's current value.
    Get { db: String, collection: String, doc_id: u64 },
    /// Delete a document.
    Delete { db: String, collection: String, doc_id: u64 },
    /// Apply a JSON-encoded patch op list (`[{"Set":{"path":"/a","value":1}}]`).
    Patch { db: String, collection: String, doc_id: u64, patch_json: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("partitiondb-cli: error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> partitiondb::Result<()> {
    let engine = Engine::open(&cli.root, EngineConfig::default())?;

    match cli.command {
        Command::ListDbs => {
            for name in engine.list_dbs() {
                println!("{name}");
            }
        }
        Command::CreateDb { name } => {
            engine.create_db(&name)?;
            println!("created database '{name}'");
        }
        Command::Stats { db } => {
            let db = engine.get_db(&db)?;
            let stats = db.stats()?;
            println!(
                "db_id={} partitions={} live_tx={} wal_bytes={} memory_used={}",
                stats.db_id, stats.partition_count, stats.live_tx_count, stats.wal_bytes, stats.memory_used
            );
        }
        Command::ListCollections { db } => {
            let db = engine.get_db(&db)?;
            for name in db.list_collections() {
                println!("{name}");
            }
        }
        Command::CreateCollection { db, name } => {
            let db = engine.get_db(&db)?;
            db.create_collection(&name)?;
            println!("created collection '{name}'");
        }
        Command::Put { db, collection, doc_id, json } => {
            let db = engine.get_db(&db)?;
            db.create(&collection, doc_id, json.into_bytes())?;
            println!("created {collection}/{doc_id}");
        }
        Command::Get { db, collection, doc_id } => {
            let db = engine.get_db(&db)?;
            let payload = db.read(&collection, doc_id)?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Command::Delete { db, collection, doc_id } => {
            let db = engine.get_db(&db)?;
            db.delete(&collection, doc_id)?;
            println!("deleted {collection}/{doc_id}");
        }
        Command::Patch { db, collection, doc_id, patch_json } => {
            let db = engine.get_db(&db)?;
            let ops: Vec<PatchOp> = serde_json::from_str(&patch_json)
                .map_err(|e| partitiondb::EngineError::InvalidJson(e.to_string()))?;
            db.patch(&collection, doc_id, &ops)?;
            println!("patched {collection}/{doc_id}");
        }
    }
    Ok(())
}
