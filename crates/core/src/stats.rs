//! Per-stage counters. Written once at the end of each stage and never read
//! back by the pipeline itself.

use crate::error::IndexError;
use crate::store::{write_json, JsonStyle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LexiconStats {
    pub total_files: usize,
    pub failed_files: usize,
    pub unique_words: usize,
    /// Seconds.
    pub processing_time: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub total_word_positions: u64,
    pub words_not_in_lexicon: u64,
    /// Seconds.
    pub processing_time: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackwardStats {
    pub files_processed: usize,
    pub files_failed: usize,
    /// Distinct word ids written to barrels.
    pub total_words_indexed: usize,
    /// Position entries written to barrels.
    pub total_postings: u64,
    /// Word ids seen in forward indexes with no lexicon entry.
    pub orphaned_word_ids: usize,
    pub orphaned_postings: u64,
    pub barrels_created: usize,
    /// Seconds.
    pub processing_time: f64,
    pub completed_at: DateTime<Utc>,
}

pub fn persist_stats<T: Serialize>(path: &Path, stats: &T) -> Result<(), IndexError> {
    write_json(path, stats, JsonStyle::Pretty)
}
