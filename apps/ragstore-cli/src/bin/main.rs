use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragstore_core::chunk_file::load_chunks_from;
use ragstore_core::config::{resolve_with_base, Config, Settings};
use ragstore_core::error::Error;
use ragstore_core::types::{ScoreMode, Topology};
use ragstore_embed::{embedder_from_config, BatchEmbedder};
use ragstore_vector::{format_context_grouped, persist, ContextOptions, IndexSpec, IvfParams, RetrievalEngine, VectorStore};

#[derive(Parser)]
#[command(name = "ragstore", about = "Incremental vector store for retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Store directory (overrides `data.store_dir`)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Add chunk files (`[{"chunk", "metadata"}]` JSON) to the store
    Ingest {
        /// A chunk file or a directory of them
        path: PathBuf,
    },
    /// Search the store
    Query {
        text: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// reciprocal | negative | linear
        #[arg(long)]
        mode: Option<ScoreMode>,
        #[arg(long)]
        min_score: Option<f32>,
        /// Print results grouped by document and page
        #[arg(long)]
        grouped: bool,
        #[arg(long)]
        with_score: bool,
    },
    /// Print a summary of the store
    Describe,
    /// Rebuild the index under another topology
    Rebuild {
        /// flatl2 | flatip | ivfflat | ivfpq
        #[arg(long)]
        topology: Topology,
        /// Size IVF lists and PQ codes from the current vector count
        #[arg(long)]
        suggest: bool,
    },
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

fn batch_embedder(settings: &Settings, progress: bool) -> anyhow::Result<BatchEmbedder> {
    let inner = embedder_from_config(&settings.embedding)?;
    Ok(BatchEmbedder::new(inner, settings.embedding.batch_size)?
        .with_timeout(settings.embedding.timeout())
        .with_progress(progress))
}

fn open_existing(dir: &Path) -> anyhow::Result<VectorStore> {
    match persist::load(dir) {
        Err(Error::NotFound(_)) => bail!("no store at {} (run `ragstore ingest` first)", dir.display()),
        other => other.with_context(|| format!("Failed to load store at {}", dir.display())),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let cwd = env::current_dir()?;
    let store_dir = match &cli.store {
        Some(p) => resolve_with_base(&cwd, p.to_string_lossy()),
        None => settings.data.store_path(&cwd),
    };

    match cli.command {
        Command::Ingest { path } => {
            let chunks = load_chunks_from(&path)?;
            info!(chunks = chunks.len(), source = %path.display(), "loaded chunks");
            let embedder = batch_embedder(&settings, true)?;
            let mut store = persist::load_or_create(&store_dir, &settings.index)?;
            let report = store.ingest(chunks, &embedder)?;
            persist::save(&store, &store_dir)?;
            println!(
                "✅ Ingested {} of {} chunks ({} duplicates skipped); store now holds {}",
                report.accepted,
                report.submitted,
                report.duplicates,
                store.len()
            );
            if report.trained {
                println!("📊 Trained {} index on this batch", store.topology());
            }
        }
        Command::Query { text, k, mode, min_score, grouped, with_score } => {
            let store = open_existing(&store_dir)?;
            let embedder = batch_embedder(&settings, false)?;
            let k = k.unwrap_or(settings.search.default_k).min(settings.search.max_k);
            let mode = mode.unwrap_or(settings.search.score_mode);
            let min_score = min_score.unwrap_or(settings.search.min_score);

            let engine = RetrievalEngine::new(&store, &embedder);
            let results = engine.search(&text, k, mode, min_score)?;
            if results.is_empty() {
                println!("No results.");
            } else if grouped {
                let opts = ContextOptions { with_score, ..ContextOptions::default() };
                println!("{}", format_context_grouped(&results, &opts));
            } else {
                for (rank, r) in results.iter().enumerate() {
                    let doc = r.meta.get("document").map(ToString::to_string).unwrap_or_default();
                    println!("{:>2}. [{:.4}] #{} {}", rank + 1, r.score, r.offset, doc);
                    println!("    {}", r.text.trim());
                }
            }
        }
        Command::Describe => {
            let store = open_existing(&store_dir)?;
            println!("{}\n{}", store_dir.display(), store.describe());
        }
        Command::Rebuild { topology, suggest } => {
            let mut store = open_existing(&store_dir)?;
            let mut spec = IndexSpec::from_config(&settings.index).with_topology(topology);
            if suggest {
                let Some(dim) = store.index().map(|i| i.dim()) else {
                    bail!("store is empty; nothing to size parameters from");
                };
                spec = spec.with_params(IvfParams::suggest(store.len(), dim));
            }
            store.rebuild(spec).context("Rebuild failed; the previous index is unchanged")?;
            persist::save(&store, &store_dir)?;
            println!("✅ Rebuilt {} vectors as {}", store.len(), store.topology());
        }
    }
    Ok(())
}
