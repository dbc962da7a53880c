//! SAGE CLI entry point.
//!
//! Subcommands:
//! - `sage ingest` - batch-ingest the corpus directory into the store
//! - `sage ask <question>` - answer a question from the stored transcripts
//! - `sage sources` - list ingested source files
//! - `sage stats` - show store health and size
//! - `sage clear` - destroy and recreate the collection

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use sage::config::Settings;
use sage::embedding::EmbeddingClient;
use sage::ingest::{BatchPolicy, IngestionPipeline};
use sage::llm::OllamaClient;
use sage::rag::{ContextBuilder, RetrievalOutcome, TextChunker};
use sage::store::KnowledgeStore;
use sage::types::StoreStatus;

#[derive(Parser)]
#[command(name = "sage")]
#[command(
    author,
    version,
    about = "S.A.G.E - Semantic Archive & Generation Engine: local transcript knowledge base"
)]
struct Cli {
    /// Path to the config file (defaults to ./sage.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new text files from the corpus directory
    Ingest {
        /// Corpus directory (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Files per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum number of files to process this run (0 = all)
        #[arg(long)]
        max_files: Option<usize>,

        /// Seconds to pause between files
        #[arg(long)]
        file_pause: Option<u64>,

        /// Seconds to pause between batches
        #[arg(long)]
        batch_pause: Option<u64>,
    },

    /// Ask a question against the ingested transcripts
    Ask {
        /// The question to answer
        question: String,

        /// Stream the answer token by token
        #[arg(long)]
        stream: bool,

        /// Minimum similarity score for retrieved chunks
        #[arg(long)]
        score_threshold: Option<f32>,

        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// List ingested source files
    Sources,

    /// Show store statistics
    Stats,

    /// Destroy and recreate the collection (removes every stored chunk)
    Clear {
        /// Confirm the destructive reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "sage=debug,sage_vector=debug"
    } else {
        "sage=info,sage_vector=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let settings = Settings::load(cli.config.as_ref())?;

    match cli.command {
        Commands::Ingest {
            corpus,
            batch_size,
            max_files,
            file_pause,
            batch_pause,
        } => {
            run_ingest(settings, corpus, batch_size, max_files, file_pause, batch_pause).await
        }
        Commands::Ask {
            question,
            stream,
            score_threshold,
            top_k,
        } => run_ask(settings, &question, stream, score_threshold, top_k).await,
        Commands::Sources => run_sources(settings).await,
        Commands::Stats => run_stats(settings).await,
        Commands::Clear { yes } => run_clear(settings, yes).await,
    }
}

async fn run_ingest(
    mut settings: Settings,
    corpus: Option<PathBuf>,
    batch_size: Option<usize>,
    max_files: Option<usize>,
    file_pause: Option<u64>,
    batch_pause: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(corpus) = corpus {
        settings.ingest.corpus_dir = corpus;
    }
    if let Some(batch_size) = batch_size {
        settings.ingest.batch_size = batch_size;
    }
    if let Some(max_files) = max_files {
        settings.ingest.max_files = max_files;
    }
    if let Some(file_pause) = file_pause {
        settings.ingest.file_pause_secs = file_pause;
    }
    if let Some(batch_pause) = batch_pause {
        settings.ingest.batch_pause_secs = batch_pause;
    }
    settings.validate()?;

    let store = KnowledgeStore::open(&settings.store, settings.embedding.dimensions).await?;
    let embedder = EmbeddingClient::new(&settings.embedding);
    let chunker = TextChunker::from_settings(&settings.chunking)?;

    println!(
        "{} {} (model {}, {} dims)",
        "Ingesting from".cyan().bold(),
        settings.ingest.corpus_dir.display(),
        settings.embedding.model,
        settings.embedding.dimensions
    );

    let pipeline = IngestionPipeline::new(
        &chunker,
        &embedder,
        &store,
        BatchPolicy::from_settings(&settings.ingest),
    )
    .with_checkpoint(settings.ingest.checkpoint_path.clone());

    let report = pipeline.run(&settings.ingest.corpus_dir).await?;

    println!();
    print!("{}", report);
    if report.failed > 0 {
        println!("{}", "Some files failed; see the log for details.".yellow());
    }
    Ok(())
}

async fn run_ask(
    settings: Settings,
    question: &str,
    stream: bool,
    score_threshold: Option<f32>,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let store = KnowledgeStore::open(&settings.store, settings.embedding.dimensions).await?;
    let embedder = EmbeddingClient::new(&settings.embedding);

    let mut builder = ContextBuilder::new(&settings.retrieval);
    if let Some(score_threshold) = score_threshold {
        builder = builder.with_score_threshold(score_threshold);
    }
    if let Some(top_k) = top_k {
        builder = builder.with_top_k(top_k);
    }

    let outcome = builder.answer_context(&embedder, &store, question).await?;
    let context = match outcome {
        RetrievalOutcome::NoMatch => {
            println!(
                "{}",
                "No relevant information found in the ingested transcripts.".yellow()
            );
            return Ok(());
        }
        RetrievalOutcome::Answer(context) => context,
    };

    let prompt = builder.build_prompt(question, &context);
    let client = OllamaClient::new(&settings.generation);

    if stream {
        let mut tokens = client.generate_stream(&prompt).await?;
        while let Some(fragment) = tokens.next().await {
            print!("{}", fragment?);
            use std::io::Write;
            std::io::stdout().flush().ok();
        }
        println!();
    } else {
        let answer = client.generate(&prompt).await?;
        println!("{}", answer.trim());
    }

    println!();
    println!(
        "{} {}",
        "Sources:".cyan().bold(),
        context.sources.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

async fn run_sources(settings: Settings) -> anyhow::Result<()> {
    let store = KnowledgeStore::open(&settings.store, settings.embedding.dimensions).await?;

    let mut sources: Vec<String> = store.ingested_sources().await.into_iter().collect();
    sources.sort();

    if sources.is_empty() {
        println!("{}", "No sources ingested yet.".yellow());
        return Ok(());
    }

    println!("{} {} sources", "Ingested".green().bold(), sources.len());
    for source in sources {
        println!("  {}", source);
    }
    Ok(())
}

async fn run_stats(settings: Settings) -> anyhow::Result<()> {
    let store = KnowledgeStore::open(&settings.store, settings.embedding.dimensions).await?;
    let stats = store.stats().await;

    let status = match stats.status {
        StoreStatus::Green => "green".green().bold().to_string(),
        StoreStatus::Yellow => "yellow".yellow().bold().to_string(),
        StoreStatus::Red => "red".red().bold().to_string(),
    };

    println!("{}", "Knowledge store".cyan().bold());
    println!("  path:       {}", settings.store.path.display());
    println!("  collection: {}", settings.store.collection);
    println!("  points:     {}", stats.points);
    println!("  dimensions: {}", stats.dimensions);
    println!("  metric:     {}", stats.metric);
    println!("  status:     {}", status);
    Ok(())
}

async fn run_clear(settings: Settings, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!(
            "{}",
            "This permanently removes every stored chunk. Re-run with --yes to confirm."
                .yellow()
        );
        return Ok(());
    }

    let store = KnowledgeStore::open(&settings.store, settings.embedding.dimensions).await?;
    if store.clear().await {
        println!("{}", "Collection cleared.".green().bold());
    } else {
        anyhow::bail!("failed to clear the collection");
    }
    Ok(())
}
