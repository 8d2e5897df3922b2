use anyhow::Context;
use barrel_index_core::{
    build_backward_index, build_forward_indexes, build_lexicon, run_pipeline, summarize_barrels,
    BarrelReader, CleanedTextSource, Dictionary, IndexLayout, IndexingOptions, Lexicon,
    SkippedFile, WordFilter,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "barrel-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root folder for the lexicon, forward indexes and barrels.
    #[arg(long, env = "BARREL_INDEX_OUTPUT", default_value = "res", global = true)]
    output: PathBuf,

    /// Documents per batch.
    #[arg(long, env = "BARREL_INDEX_BATCH_SIZE", global = true)]
    batch_size: Option<usize>,

    /// Worker threads per stage.
    #[arg(long, env = "BARREL_INDEX_WORKERS", global = true)]
    workers: Option<usize>,
}

#[derive(Args)]
struct CorpusArgs {
    /// Folder of cleaned `.txt` documents.
    #[arg(long, env = "BARREL_INDEX_CORPUS")]
    corpus: PathBuf,
}

#[derive(Args)]
struct DictionaryArgs {
    /// Word list (one per line) accepted without gibberish checks.
    #[arg(long, env = "BARREL_INDEX_DICTIONARY")]
    dictionary: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the lexicon from the cleaned corpus.
    Lexicon {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[command(flatten)]
        dictionary: DictionaryArgs,
    },
    /// Build one forward index per document using the saved lexicon.
    Forward {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
    /// Invert the forward indexes into barrel files.
    Backward,
    /// Run lexicon, forward and backward stages in order.
    All {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[command(flatten)]
        dictionary: DictionaryArgs,
    },
    /// Print size and fill statistics for the written barrels.
    Inspect,
    /// Print the postings of one word.
    Lookup {
        /// Word to look up.
        word: String,
    },
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let layout = IndexLayout::new(&cli.output);
    let options = indexing_options(cli.batch_size, cli.workers);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        output = %layout.root().display(),
        "barrel-index boot"
    );

    match cli.command {
        Command::Lexicon { corpus, dictionary } => {
            let filter = word_filter(&dictionary)?;
            let source = CleanedTextSource::new()?;
            let report = build_lexicon(&source, &corpus.corpus, &filter, &layout, &options)
                .with_context(|| format!("building lexicon from {}", corpus.corpus.display()))?;
            log_skipped("lexicon", &report.skipped_files);

            println!(
                "{} unique words from {} files ({} failed) in {:.2}s",
                report.stats.unique_words,
                report.stats.total_files,
                report.stats.failed_files,
                report.stats.processing_time
            );
        }
        Command::Forward { corpus } => {
            let lexicon = load_lexicon(&layout)?;
            let source = CleanedTextSource::new()?;
            let report = build_forward_indexes(&source, &corpus.corpus, &lexicon, &layout, &options)
                .with_context(|| format!("building forward indexes from {}", corpus.corpus.display()))?;
            log_skipped("forward", &report.skipped_files);

            println!(
                "{} forward indexes written ({} failed), {} positions, {} tokens not in lexicon",
                report.stats.files_processed,
                report.stats.files_failed,
                report.stats.total_word_positions,
                report.stats.words_not_in_lexicon
            );
        }
        Command::Backward => {
            let lexicon = load_lexicon(&layout)?;
            let report = build_backward_index(&lexicon, &layout, &options)
                .context("building inverted index")?;
            log_skipped("backward", &report.skipped_files);

            println!(
                "{} barrels written for {} words from {} forward indexes ({} failed)",
                report.stats.barrels_created,
                report.stats.total_words_indexed,
                report.stats.files_processed,
                report.stats.files_failed
            );
            if report.stats.orphaned_word_ids > 0 {
                println!(
                    "{} word ids ({} positions) had no lexicon entry",
                    report.stats.orphaned_word_ids, report.stats.orphaned_postings
                );
            }
        }
        Command::All { corpus, dictionary } => {
            let filter = word_filter(&dictionary)?;
            let source = CleanedTextSource::new()?;
            let report = run_pipeline(&source, &corpus.corpus, &filter, &layout, &options)
                .with_context(|| format!("indexing {}", corpus.corpus.display()))?;
            log_skipped("lexicon", &report.lexicon.skipped_files);
            log_skipped("forward", &report.forward.skipped_files);
            log_skipped("backward", &report.backward.skipped_files);

            println!(
                "lexicon={} words, forward={} documents, barrels={} at {}",
                report.lexicon.stats.unique_words,
                report.forward.stats.files_processed,
                report.backward.stats.barrels_created,
                Utc::now().to_rfc3339()
            );
        }
        Command::Inspect => {
            let summary = summarize_barrels(&layout.backward_dir())
                .context("reading barrel directory")?;

            println!("barrels: {}", summary.barrels);
            println!(
                "bytes: total={} min={} max={} avg={:.1}",
                summary.total_bytes, summary.min_bytes, summary.max_bytes, summary.avg_bytes
            );
            println!(
                "words: total={} min={} max={} avg={:.1}",
                summary.total_words, summary.min_words, summary.max_words, summary.avg_words
            );
            println!("postings: {}", summary.total_postings);
        }
        Command::Lookup { word } => {
            let lexicon = load_lexicon(&layout)?;
            let reader = BarrelReader::open(layout.backward_dir())?;

            match reader.postings_for_word(&lexicon, &word)? {
                Some(postings) => {
                    println!("{word}: {} documents", postings.len());
                    for (document, positions) in postings {
                        println!("  {document}: {positions:?}");
                    }
                }
                None => println!("{word}: no postings"),
            }
        }
    }

    Ok(())
}

fn indexing_options(batch_size: Option<usize>, workers: Option<usize>) -> IndexingOptions {
    let defaults = IndexingOptions::default();
    IndexingOptions {
        batch_size: batch_size.unwrap_or(defaults.batch_size),
        workers: workers.unwrap_or(defaults.workers),
    }
}

fn word_filter(args: &DictionaryArgs) -> anyhow::Result<WordFilter> {
    let Some(path) = &args.dictionary else {
        warn!("no dictionary given, using heuristics only");
        return Ok(WordFilter::default());
    };

    let dictionary = Dictionary::load(path)
        .with_context(|| format!("loading dictionary {}", path.display()))?;
    info!(words = dictionary.len(), "dictionary loaded");
    Ok(WordFilter::new(dictionary))
}

fn load_lexicon(layout: &IndexLayout) -> anyhow::Result<Lexicon> {
    let path = layout.lexicon_file();
    let lexicon = Lexicon::load(&path)
        .with_context(|| format!("loading lexicon {}", path.display()))?;
    info!(words = lexicon.len(), "lexicon loaded");
    Ok(lexicon)
}

fn log_skipped(stage: &str, skipped: &[SkippedFile]) {
    if skipped.is_empty() {
        return;
    }
    warn!(stage, skipped_files = skipped.len(), "stage skipped files");
    for file in skipped {
        warn!(stage, path = %file.path.display(), reason = %file.reason, "skipped file");
    }
}
