use crate::corpus::{discover_documents, discover_files, document_name, Discovery};
use crate::error::IndexError;
use crate::filter::normalize_token;
use crate::lexicon::Lexicon;
use crate::models::{
    ForwardIndexRecord, IndexLayout, IndexingOptions, Position, SkippedFile, WordPosition,
    FORWARD_STATS_FILE,
};
use crate::stats::{persist_stats, ForwardStats};
use crate::store::{read_json, write_json, JsonStyle};
use crate::traits::TokenSource;
use chrono::Utc;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A document's forward index plus the number of tokens the lexicon did not
/// know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub record: ForwardIndexRecord,
    pub unresolved: u64,
}

/// Maps each token to `(word_id, position)`. Tokens missing from the lexicon
/// are counted and dropped; the positions of the remaining tokens are
/// unchanged, so pair order is always token order.
pub fn index_document<S: AsRef<str>>(
    lexicon: &Lexicon,
    document: &str,
    tokens: &[S],
) -> Result<IndexedDocument, IndexError> {
    let mut postings = Vec::new();
    let mut unresolved = 0u64;

    for (index, token) in tokens.iter().enumerate() {
        let position = Position::try_from(index).map_err(|_| {
            IndexError::InvalidArgument(format!(
                "document {document} has more tokens than positions can address"
            ))
        })?;

        match lexicon.id(&normalize_token(token.as_ref())) {
            Some(word_id) => postings.push(WordPosition::new(word_id, position)),
            None => unresolved += 1,
        }
    }

    Ok(IndexedDocument {
        record: ForwardIndexRecord::new(document, postings),
        unresolved,
    })
}

pub fn forward_record_path(dir: &Path, document: &str) -> PathBuf {
    dir.join(format!("{document}.json"))
}

pub fn write_forward_record(dir: &Path, record: &ForwardIndexRecord) -> Result<PathBuf, IndexError> {
    let path = forward_record_path(dir, &record.document);
    write_json(&path, record, JsonStyle::Compact)?;
    Ok(path)
}

/// Reads and validates one forward index file.
pub fn read_forward_record(path: &Path) -> Result<ForwardIndexRecord, IndexError> {
    read_json(path).map_err(|error| match error {
        IndexError::Json(json) => IndexError::MalformedRecord(format!("{}: {json}", path.display())),
        other => other,
    })
}

/// Forward index files in `dir`, sorted, without the stats file.
pub fn discover_forward_files(dir: &Path) -> Result<Discovery, IndexError> {
    discover_files(dir, "json", &[FORWARD_STATS_FILE])
}

/// Deletes every forward index file in `dir`, keeping the stats file.
/// Returns how many were removed.
pub fn remove_forward_records(dir: &Path) -> Result<usize, IndexError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let records = discover_forward_files(dir)?.files;
    for path in &records {
        std::fs::remove_file(path)?;
    }
    Ok(records.len())
}

pub struct ForwardReport {
    pub stats: ForwardStats,
    pub skipped_files: Vec<SkippedFile>,
}

struct DocumentCounts {
    resolved: u64,
    unresolved: u64,
}

fn process_document<S: TokenSource>(
    source: &S,
    lexicon: &Lexicon,
    output_dir: &Path,
    path: &Path,
) -> Result<DocumentCounts, IndexError> {
    let document = document_name(path)?;
    let tokens = source.tokens(path)?;
    let indexed = index_document(lexicon, &document, &tokens)?;
    drop(tokens);

    write_forward_record(output_dir, &indexed.record)?;

    Ok(DocumentCounts {
        resolved: indexed.record.postings.len() as u64,
        unresolved: indexed.unresolved,
    })
}

/// Writes one forward index file per document in `corpus_dir`, replacing
/// every record left by a previous build.
///
/// Each document is tokenized, mapped, persisted and dropped before its
/// worker picks up the next one, so only the current batch is ever in memory.
/// A document that cannot be read or written is logged and counted as failed.
pub fn build_forward_indexes<S: TokenSource>(
    source: &S,
    corpus_dir: &Path,
    lexicon: &Lexicon,
    layout: &IndexLayout,
    options: &IndexingOptions,
) -> Result<ForwardReport, IndexError> {
    let started = Instant::now();
    let Discovery {
        files: documents,
        skipped: mut skipped_files,
    } = discover_documents(corpus_dir)?;
    let pool = options.worker_pool()?;
    let output_dir = layout.forward_dir();
    let removed = remove_forward_records(&output_dir)?;
    if removed > 0 {
        debug!(removed, dir = %output_dir.display(), "removed stale forward indexes");
    }
    std::fs::create_dir_all(&output_dir)?;
    let total_batches = documents.len().div_ceil(options.batch_size);

    info!(
        corpus = %corpus_dir.display(),
        files = documents.len(),
        lexicon_words = lexicon.len(),
        batch_size = options.batch_size,
        "building forward indexes"
    );

    let mut files_processed = 0usize;
    let mut total_word_positions = 0u64;
    let mut words_not_in_lexicon = 0u64;

    for (batch_index, batch) in documents.chunks(options.batch_size).enumerate() {
        let results = pool.install(|| {
            batch
                .par_iter()
                .map(|path| process_document(source, lexicon, &output_dir, path))
                .collect::<Vec<_>>()
        });

        for (path, result) in batch.iter().zip(results) {
            match result {
                Ok(counts) => {
                    files_processed += 1;
                    total_word_positions += counts.resolved;
                    words_not_in_lexicon += counts.unresolved;
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped document");
                    skipped_files.push(SkippedFile::new(path, &error));
                }
            }
        }

        info!(
            batch = batch_index + 1,
            total_batches,
            succeeded = files_processed,
            failed = skipped_files.len(),
            "forward batch complete"
        );
    }

    let stats = ForwardStats {
        files_processed,
        files_failed: skipped_files.len(),
        total_word_positions,
        words_not_in_lexicon,
        processing_time: started.elapsed().as_secs_f64(),
        completed_at: Utc::now(),
    };
    persist_stats(&layout.forward_stats_file(), &stats)?;

    info!(
        files_processed = stats.files_processed,
        files_failed = stats.files_failed,
        positions = stats.total_word_positions,
        unresolved = stats.words_not_in_lexicon,
        "forward indexing complete"
    );

    Ok(ForwardReport {
        stats,
        skipped_files,
    })
}
