use std::{path::PathBuf, process, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use contentgraph::{
    ChunkConfig, GraphStore, StoreConfig, Table, open_store,
    import::{
        ChebiImporter, ImportOptions, OntologyImporter, RheaImporter, SourceImporter,
        TaxonomyImporter, run_import,
    },
};

#[derive(Parser, Debug)]
#[command(
    name = "contentgraph",
    version,
    about = "Load scientific datasets into a content-addressed graph store"
)]
struct Cli {
    /// SQLite file, or `memory`; falls back to CONTENTGRAPH_DATABASE
    #[arg(long)]
    database: Option<String>,

    /// Rows per chunk transaction
    #[arg(long, default_value_t = contentgraph::bulk::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Pause between chunks, in milliseconds
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print schema version and row counts
    Status,
    /// Apply pending schema migrations
    Migrate {
        #[arg(long)]
        dry_run: bool,
    },
    /// Parse a source dataset and optionally load it
    #[command(subcommand)]
    Import(ImportCommand),
}

#[derive(Subcommand, Debug)]
enum ImportCommand {
    /// NCBI taxonomy dump
    Taxonomy {
        #[arg(long)]
        nodes: PathBuf,
        #[arg(long)]
        names: PathBuf,
        #[command(flatten)]
        flags: ImportFlags,
    },
    /// ChEBI SDF file
    Chebi {
        #[arg(long)]
        sdf: PathBuf,
        #[command(flatten)]
        flags: ImportFlags,
    },
    /// Rhea reactions as JSON lines
    Rhea {
        #[arg(long)]
        reactions: PathBuf,
        #[command(flatten)]
        flags: ImportFlags,
    },
    /// ChEBI ontology in OBO format
    Ontology {
        #[arg(long)]
        obo: PathBuf,
        #[command(flatten)]
        flags: ImportFlags,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct ImportFlags {
    /// Write to the database
    #[arg(long)]
    load_db: bool,
    /// Load only the first N source records
    #[arg(long)]
    number: Option<usize>,
    /// Migrate existing rows by previous hash
    #[arg(long)]
    upsert: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match StoreConfig::from_args(cli.database.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    config.without_migrations = matches!(cli.command, Command::Migrate { .. });

    let store = match open_store(&config) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&store, &cli) {
        eprintln!("command failed: {err:#}");
        process::exit(1);
    }
    if let Err(err) = store.close() {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn chunk_config(cli: &Cli) -> ChunkConfig {
    let chunk = ChunkConfig::with_chunk_size(cli.chunk_size);
    if cli.chunk_delay_ms > 0 {
        chunk.delay(Duration::from_millis(cli.chunk_delay_ms))
    } else {
        chunk
    }
}

fn run_command(store: &GraphStore, cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Status => {
            let payload = json!({
                "schema_version": store.schema_version()?,
                "nodes": store.count(Table::Node)?,
                "edges": store.count(Table::Edge)?,
                "node_history": store.count(Table::NodeHistory)?,
                "edge_history": store.count(Table::EdgeHistory)?,
            });
            println!("{payload}");
        }
        Command::Migrate { dry_run } => {
            let report = store.run_pending_migrations(*dry_run)?;
            let payload = json!({
                "from_version": report.from_version,
                "to_version": report.to_version,
                "statements": report.statements.len(),
                "dry_run": report.dry_run,
            });
            println!("{payload}");
        }
        Command::Import(command) => {
            let (importer, flags): (Box<dyn SourceImporter>, ImportFlags) = match command {
                ImportCommand::Taxonomy {
                    nodes,
                    names,
                    flags,
                } => (Box::new(TaxonomyImporter::new(nodes, names)), *flags),
                ImportCommand::Chebi { sdf, flags } => (Box::new(ChebiImporter::new(sdf)), *flags),
                ImportCommand::Rhea { reactions, flags } => {
                    (Box::new(RheaImporter::new(reactions)), *flags)
                }
                ImportCommand::Ontology { obo, flags } => {
                    (Box::new(OntologyImporter::new(obo)), *flags)
                }
            };
            let options = ImportOptions {
                write: flags.load_db,
                limit: flags.number,
                upsert: flags.upsert,
                chunk: chunk_config(cli),
                ..ImportOptions::default()
            };
            let report = run_import(store, importer.as_ref(), &options)
                .with_context(|| format!("{} import", importer.source()))?;
            println!("{}", serde_json::to_string(&report)?);
        }
    }
    Ok(())
}
