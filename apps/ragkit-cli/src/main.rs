#![forbid(unsafe_code)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ragkit_core::config::{expand_path, Config, Settings};
use ragkit_core::corpus::Corpus;
use ragkit_core::traits::Embedder;
use ragkit_core::types::RetrievedRecord;
use ragkit_embed::get_embedder;
use ragkit_hybrid::{embed_corpus, write_bundle, ArtifactBundle, BundleHandle, BundlePaths, FetchCounts, FusionPolicy, Retriever};

#[derive(Parser, Debug)]
#[command(author, version, about = "ragkit: hybrid dense + sparse retrieval over a prebuilt bundle", long_about = None)]
struct Cli {
    /// Directory holding the bundle artifacts (overrides `bundle.dir`).
    #[arg(long, global = true)]
    bundle_dir: Option<PathBuf>,

    /// Artifact file prefix (overrides `bundle.prefix`).
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Retrieve the best matching records for a query.
    Query(QueryArgs),
    /// Show what the bundle contains.
    Inspect,
    /// Embed an already chunked document table and write a new bundle.
    Build(BuildArgs),
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Query text.
    text: String,

    #[arg(long)]
    top_k: Option<usize>,

    /// equal, weighted or rrf.
    #[arg(long)]
    policy: Option<String>,

    /// Dense weight for the weighted policy.
    #[arg(long)]
    alpha: Option<f64>,

    /// Rank constant for rrf.
    #[arg(long)]
    rrf_k: Option<u32>,

    /// Emit JSON instead of a listing.
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Document table in `<prefix>_info.json` layout.
    #[arg(long)]
    from: PathBuf,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RAGKIT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() { "ragkit=debug,info" } else { "ragkit=info,warn" })
    });
    let format = env::var("RAGKIT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => registry.with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr)).init(),
        _ => registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init(),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let mut settings = config.settings()?;
    if let Some(dir) = &cli.bundle_dir {
        settings.bundle.dir = dir.to_string_lossy().into_owned();
    }
    if let Some(prefix) = &cli.prefix {
        settings.bundle.prefix = prefix.clone();
    }
    debug!(?settings, "effective settings");

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Query(args) => run_query(&rt, &settings, args),
        Commands::Inspect => run_inspect(&rt, &settings),
        Commands::Build(args) => run_build(&rt, &settings, args),
    }
}

fn load_bundle(rt: &tokio::runtime::Runtime, settings: &Settings) -> anyhow::Result<ArtifactBundle> {
    let dir = settings.bundle_dir();
    rt.block_on(ArtifactBundle::load(&dir, &settings.bundle.prefix))
        .with_context(|| format!("loading bundle '{}' from {}", settings.bundle.prefix, dir.display()))
}

fn run_query(rt: &tokio::runtime::Runtime, settings: &Settings, args: QueryArgs) -> anyhow::Result<()> {
    let retrieval = &settings.retrieval;
    let policy = FusionPolicy::from_name(
        args.policy.as_deref().unwrap_or(&retrieval.policy),
        args.alpha.unwrap_or(retrieval.alpha),
        args.rrf_k.unwrap_or(retrieval.rrf_k),
    )?;
    let top_k = args.top_k.unwrap_or(retrieval.top_k);

    let handle = Arc::new(BundleHandle::new(load_bundle(rt, settings)?));
    let embedder: Arc<dyn Embedder> = Arc::from(get_embedder(&settings.embedding)?);
    let retriever = Retriever::new(embedder, handle, FetchCounts::from(retrieval))?;

    let hits = retriever.retrieve(&args.text, top_k, &policy)?;
    info!(policy = %policy, top_k, hits = hits.len(), "query done");
    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hits(&args.text, &hits);
    }
    Ok(())
}

fn print_hits(query: &str, hits: &[RetrievedRecord]) {
    println!("🔍 {} results for: \"{}\"", hits.len(), query);
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "\n  {}. score={:.4}  via={}  position={}  chunk_idx={}",
            i + 1,
            hit.score,
            hit.retrieval,
            hit.record.position,
            hit.record.chunk_idx
        );
        for (k, v) in &hit.record.metadata {
            println!("     {k}: {v}");
        }
        println!("     📝 {}", hit.record.chunk.replace('\n', "\n        "));
    }
}

fn run_inspect(rt: &tokio::runtime::Runtime, settings: &Settings) -> anyhow::Result<()> {
    let dir = settings.bundle_dir();
    let paths = BundlePaths::new(&dir, &settings.bundle.prefix);
    let bundle = load_bundle(rt, settings)?;
    println!("📊 bundle '{}'", settings.bundle.prefix);
    println!("  records:     {}", bundle.len());
    println!("  dimension:   {}", bundle.dense().dim());
    println!("  fingerprint: {}", bundle.fingerprint());
    println!("  info:        {}", paths.info.display());
    println!("  dense:       {} (table {})", paths.lance_dir.display(), paths.dense_table);
    println!("  sparse:      {}", paths.sparse.display());
    Ok(())
}

fn run_build(rt: &tokio::runtime::Runtime, settings: &Settings, args: BuildArgs) -> anyhow::Result<()> {
    let source = expand_path(args.from.to_string_lossy());
    let corpus = Corpus::load(&source)?;
    let embedder = get_embedder(&settings.embedding)?;
    let vectors = embed_corpus(embedder.as_ref(), &corpus, args.batch_size)?;

    let dir = settings.bundle_dir();
    let paths = rt.block_on(write_bundle(&dir, &settings.bundle.prefix, &corpus, embedder.dim(), &vectors))?;
    report_build(&paths, &corpus);
    Ok(())
}

fn report_build(paths: &BundlePaths, corpus: &Corpus) {
    let dir = paths.info.parent().unwrap_or(Path::new("."));
    println!("✅ Bundle written to {} ({} records, fingerprint {})", dir.display(), corpus.len(), corpus.fingerprint());
}
