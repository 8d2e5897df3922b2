//! Inversion of the forward indexes into barrel-sharded postings.
//!
//! Aggregation is single-writer: worker threads each fold a batch slice into
//! their own [`PostingsAccumulator`], the slices are reduced into one batch
//! partial, and only the stage driver merges that partial into the run's
//! accumulator. No two threads ever touch the same postings list.

use crate::barrel::{barrel_key, remove_barrels, BarrelKey};
use crate::corpus::Discovery;
use crate::error::IndexError;
use crate::forward::{discover_forward_files, read_forward_record};
use crate::lexicon::Lexicon;
use crate::models::{
    BarrelPostings, ForwardIndexRecord, IndexLayout, IndexingOptions, Position, PostingsList,
    SkippedFile, WordId,
};
use crate::stats::{persist_stats, BackwardStats};
use crate::store::{digest_bytes, to_json_bytes, write_bytes_atomic, write_json, JsonStyle};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Barrel key → hex SHA-256 of the barrel file's bytes.
pub type BarrelManifest = BTreeMap<String, String>;

/// Word id → document → positions, built up from forward index records.
///
/// Ordered maps throughout, so serializing the same content always yields
/// the same bytes no matter which order records arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsAccumulator {
    postings: BTreeMap<WordId, PostingsList>,
    positions: u64,
}

impl PostingsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, record: ForwardIndexRecord) {
        let document: Arc<str> = Arc::from(record.document);
        let mut by_word: BTreeMap<WordId, Vec<Position>> = BTreeMap::new();
        for pair in record.postings {
            by_word.entry(pair.word_id).or_default().push(pair.position);
        }

        for (word_id, positions) in by_word {
            self.add_positions(word_id, Arc::clone(&document), positions);
        }
    }

    /// Folds `other` into `self`. Consumes `other` so no postings are shared.
    pub fn merge(&mut self, other: PostingsAccumulator) {
        for (word_id, documents) in other.postings {
            for (document, positions) in documents {
                self.add_positions(word_id, document, positions);
            }
        }
    }

    fn add_positions(&mut self, word_id: WordId, document: Arc<str>, mut positions: Vec<Position>) {
        self.positions += positions.len() as u64;
        match self.postings.entry(word_id).or_default().entry(document) {
            Entry::Vacant(slot) => {
                slot.insert(positions);
            }
            // The same document name arriving twice: keep every position, in
            // position order.
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.append(&mut positions);
                existing.sort_unstable();
            }
        }
    }

    pub fn postings(&self, word_id: WordId) -> Option<&PostingsList> {
        self.postings.get(&word_id)
    }

    pub fn word_count(&self) -> usize {
        self.postings.len()
    }

    pub fn position_count(&self) -> u64 {
        self.positions
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Groups every word id under its barrel key. Ids the lexicon does not
    /// know cannot be addressed and are counted instead.
    pub fn into_barrels(self, lexicon: &Lexicon) -> BarrelDistribution {
        let mut distribution = BarrelDistribution::default();

        for (word_id, documents) in self.postings {
            if documents.is_empty() {
                continue;
            }

            let Some(word) = lexicon.word(word_id) else {
                distribution.orphaned_word_ids += 1;
                distribution.orphaned_postings += count_positions(&documents);
                continue;
            };

            distribution.words += 1;
            distribution.postings += count_positions(&documents);
            distribution
                .barrels
                .entry(barrel_key(word))
                .or_default()
                .insert(word_id, documents);
        }

        distribution
    }
}

impl Extend<ForwardIndexRecord> for PostingsAccumulator {
    fn extend<I: IntoIterator<Item = ForwardIndexRecord>>(&mut self, records: I) {
        for record in records {
            self.absorb(record);
        }
    }
}

impl FromIterator<ForwardIndexRecord> for PostingsAccumulator {
    fn from_iter<I: IntoIterator<Item = ForwardIndexRecord>>(records: I) -> Self {
        let mut accumulator = Self::new();
        accumulator.extend(records);
        accumulator
    }
}

fn count_positions(documents: &PostingsList) -> u64 {
    documents.values().map(|positions| positions.len() as u64).sum()
}

/// Postings grouped by barrel, ready to flush.
#[derive(Debug, Default)]
pub struct BarrelDistribution {
    pub barrels: BTreeMap<BarrelKey, BarrelPostings>,
    pub words: usize,
    pub postings: u64,
    pub orphaned_word_ids: usize,
    pub orphaned_postings: u64,
}

/// Writes one file per non-empty barrel, each by exactly one writer, and
/// returns the manifest of their digests. Barrels left over from a previous
/// build are removed first.
pub fn flush_barrels(
    dir: &Path,
    barrels: BTreeMap<BarrelKey, BarrelPostings>,
    pool: &rayon::ThreadPool,
) -> Result<BarrelManifest, IndexError> {
    std::fs::create_dir_all(dir)?;
    let removed = remove_barrels(dir)?;
    if removed > 0 {
        debug!(removed, dir = %dir.display(), "removed stale barrels");
    }

    pool.install(|| {
        barrels
            .into_par_iter()
            .filter(|(_, postings)| !postings.is_empty())
            .map(|(key, postings)| {
                let bytes = to_json_bytes(&postings, JsonStyle::Compact)?;
                let digest = digest_bytes(&bytes);
                write_bytes_atomic(&dir.join(key.file_name()), &bytes)?;
                debug!(barrel = %key, words = postings.len(), bytes = bytes.len(), "wrote barrel");
                Ok((key.to_string(), digest))
            })
            .collect::<Result<BarrelManifest, IndexError>>()
    })
}

pub struct BackwardReport {
    pub stats: BackwardStats,
    pub skipped_files: Vec<SkippedFile>,
    pub manifest: BarrelManifest,
}

#[derive(Default)]
struct BatchPartial {
    postings: PostingsAccumulator,
    processed: usize,
    skipped: Vec<SkippedFile>,
}

impl BatchPartial {
    fn merge(mut self, other: BatchPartial) -> Self {
        self.postings.merge(other.postings);
        self.processed += other.processed;
        self.skipped.extend(other.skipped);
        self
    }
}

fn aggregate_batch(batch: &[PathBuf], pool: &rayon::ThreadPool) -> BatchPartial {
    pool.install(|| {
        batch
            .par_iter()
            .fold(BatchPartial::default, |mut partial, path| {
                match read_forward_record(path) {
                    Ok(record) => {
                        partial.postings.absorb(record);
                        partial.processed += 1;
                    }
                    Err(error) => {
                        warn!(path = %path.display(), reason = %error, "skipped forward index");
                        partial.skipped.push(SkippedFile::new(path, &error));
                    }
                }
                partial
            })
            .reduce(BatchPartial::default, BatchPartial::merge)
    })
}

/// Inverts every forward index under `layout` into barrel files.
///
/// The whole corpus's postings are held in memory until the flush; batches
/// only bound how many forward records are parsed at once. A forward index
/// that cannot be read or fails validation is skipped without affecting the
/// postings of any other document.
pub fn build_backward_index(
    lexicon: &Lexicon,
    layout: &IndexLayout,
    options: &IndexingOptions,
) -> Result<BackwardReport, IndexError> {
    let started = Instant::now();
    let forward_dir = layout.forward_dir();
    let Discovery {
        files,
        skipped: mut skipped_files,
    } = discover_forward_files(&forward_dir)?;
    if files.is_empty() {
        return Err(IndexError::EmptyCorpus(forward_dir));
    }
    let pool = options.worker_pool()?;
    let total_batches = files.len().div_ceil(options.batch_size);

    info!(
        forward_dir = %forward_dir.display(),
        files = files.len(),
        batch_size = options.batch_size,
        "building inverted index"
    );

    let mut accumulator = PostingsAccumulator::new();
    let mut files_processed = 0usize;

    for (batch_index, batch) in files.chunks(options.batch_size).enumerate() {
        let partial = aggregate_batch(batch, &pool);
        accumulator.merge(partial.postings);
        files_processed += partial.processed;
        skipped_files.extend(partial.skipped);

        info!(
            batch = batch_index + 1,
            total_batches,
            processed = files_processed,
            unique_words = accumulator.word_count(),
            "backward batch complete"
        );
    }
    skipped_files.sort_by(|left, right| left.path.cmp(&right.path));

    let distribution = accumulator.into_barrels(lexicon);
    if distribution.orphaned_word_ids > 0 {
        warn!(
            word_ids = distribution.orphaned_word_ids,
            postings = distribution.orphaned_postings,
            "forward indexes reference word ids missing from the lexicon"
        );
    }

    let BarrelDistribution {
        barrels,
        words,
        postings,
        orphaned_word_ids,
        orphaned_postings,
    } = distribution;

    let backward_dir = layout.backward_dir();
    let manifest = flush_barrels(&backward_dir, barrels, &pool)?;
    write_json(&layout.barrel_manifest_file(), &manifest, JsonStyle::Pretty)?;

    let stats = BackwardStats {
        files_processed,
        files_failed: skipped_files.len(),
        total_words_indexed: words,
        total_postings: postings,
        orphaned_word_ids,
        orphaned_postings,
        barrels_created: manifest.len(),
        processing_time: started.elapsed().as_secs_f64(),
        completed_at: Utc::now(),
    };
    persist_stats(&layout.backward_stats_file(), &stats)?;

    info!(
        files_processed = stats.files_processed,
        files_failed = stats.files_failed,
        words = stats.total_words_indexed,
        barrels = stats.barrels_created,
        seconds = stats.processing_time,
        "inverted index complete"
    );

    Ok(BackwardReport {
        stats,
        skipped_files,
        manifest,
    })
}
