use crate::error::IndexError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type WordId = u32;
pub type Position = u32;

/// Document → ordered positions for one word id.
pub type PostingsList = BTreeMap<Arc<str>, Vec<Position>>;

/// Word id → postings, the content of one barrel file.
pub type BarrelPostings = BTreeMap<WordId, PostingsList>;

pub const LEXICON_DIR: &str = "lexicon";
pub const LEXICON_FILE: &str = "lexicon.json";
pub const LEXICON_STATS_FILE: &str = "lexicon_stats.json";
pub const FORWARD_DIR: &str = "forward_indexing";
pub const FORWARD_STATS_FILE: &str = "indexing_stats.json";
pub const BACKWARD_DIR: &str = "backward_indexing";
pub const BACKWARD_STATS_FILE: &str = "backward_indexing_stats.json";
pub const BARREL_MANIFEST_FILE: &str = "barrel_manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(WordId, Position)", into = "(WordId, Position)")]
pub struct WordPosition {
    pub word_id: WordId,
    pub position: Position,
}

impl WordPosition {
    pub fn new(word_id: WordId, position: Position) -> Self {
        Self { word_id, position }
    }
}

impl From<(WordId, Position)> for WordPosition {
    fn from((word_id, position): (WordId, Position)) -> Self {
        Self { word_id, position }
    }
}

impl From<WordPosition> for (WordId, Position) {
    fn from(value: WordPosition) -> Self {
        (value.word_id, value.position)
    }
}

/// One document's forward index: `(word_id, position)` pairs in token order.
///
/// On disk this is `{ "<document>": [[word_id, position], ...] }`. Decoding
/// goes through [`ForwardIndexRecord::validate`], so a record that made it into
/// memory always has exactly one document, non-zero word ids and strictly
/// increasing positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardIndexRecord {
    pub document: String,
    pub postings: Vec<WordPosition>,
}

impl ForwardIndexRecord {
    pub fn new(document: impl Into<String>, postings: Vec<WordPosition>) -> Self {
        Self {
            document: document.into(),
            postings,
        }
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.document.is_empty() {
            return Err(IndexError::MalformedRecord(
                "forward index record has an empty document name".to_string(),
            ));
        }

        if let Some(zero) = self.postings.iter().find(|pair| pair.word_id == 0) {
            return Err(IndexError::MalformedRecord(format!(
                "document {} has word id 0 at position {}",
                self.document, zero.position
            )));
        }

        let ordered = self
            .postings
            .windows(2)
            .all(|pair| pair[0].position < pair[1].position);
        if !ordered {
            return Err(IndexError::MalformedRecord(format!(
                "document {} has positions out of order",
                self.document
            )));
        }

        Ok(())
    }
}

impl TryFrom<BTreeMap<String, Vec<WordPosition>>> for ForwardIndexRecord {
    type Error = IndexError;

    fn try_from(raw: BTreeMap<String, Vec<WordPosition>>) -> Result<Self, Self::Error> {
        if raw.len() != 1 {
            return Err(IndexError::MalformedRecord(format!(
                "forward index record must have exactly one document key, found {}",
                raw.len()
            )));
        }

        let (document, postings) = raw
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::MalformedRecord("empty forward index record".to_string()))?;

        let record = Self { document, postings };
        record.validate()?;
        Ok(record)
    }
}

impl Serialize for ForwardIndexRecord {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.document, &self.postings)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ForwardIndexRecord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Vec<WordPosition>>::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// A work unit that failed and was left out of a stage's output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedFile {
    pub fn new(path: impl Into<PathBuf>, error: &IndexError) -> Self {
        Self {
            path: path.into(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexingOptions {
    /// Documents in flight per batch.
    pub batch_size: usize,
    /// Size of the per-stage worker pool.
    pub workers: usize,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);

        Self {
            batch_size: 100,
            workers: available.saturating_sub(1).max(1),
        }
    }
}

impl IndexingOptions {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.batch_size == 0 {
            return Err(IndexError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(IndexError::InvalidArgument(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_pool(&self) -> Result<rayon::ThreadPool, IndexError> {
        self.validate()?;
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("barrel-index-worker-{index}"))
            .build()?)
    }
}

/// Where every stage reads and writes, relative to one output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lexicon_dir(&self) -> PathBuf {
        self.root.join(LEXICON_DIR)
    }

    pub fn lexicon_file(&self) -> PathBuf {
        self.lexicon_dir().join(LEXICON_FILE)
    }

    pub fn lexicon_stats_file(&self) -> PathBuf {
        self.lexicon_dir().join(LEXICON_STATS_FILE)
    }

    pub fn forward_dir(&self) -> PathBuf {
        self.root.join(FORWARD_DIR)
    }

    pub fn forward_stats_file(&self) -> PathBuf {
        self.forward_dir().join(FORWARD_STATS_FILE)
    }

    pub fn backward_dir(&self) -> PathBuf {
        self.root.join(BACKWARD_DIR)
    }

    pub fn backward_stats_file(&self) -> PathBuf {
        self.backward_dir().join(BACKWARD_STATS_FILE)
    }

    pub fn barrel_manifest_file(&self) -> PathBuf {
        self.backward_dir().join(BARREL_MANIFEST_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_record_serializes_as_single_key_object() -> Result<(), Box<dyn std::error::Error>> {
        let record = ForwardIndexRecord::new(
            "paper",
            vec![WordPosition::new(1, 0), WordPosition::new(1, 1), WordPosition::new(2, 2)],
        );

        let json = serde_json::to_string(&record)?;
        assert_eq!(json, r#"{"paper":[[1,0],[1,1],[2,2]]}"#);
        Ok(())
    }

    #[test]
    fn forward_record_rejects_multiple_documents() {
        let result = serde_json::from_str::<ForwardIndexRecord>(r#"{"a":[[1,0]],"b":[[1,0]]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn forward_record_rejects_unordered_positions() {
        let result = serde_json::from_str::<ForwardIndexRecord>(r#"{"a":[[1,4],[2,3]]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn forward_record_rejects_bad_pair_shape() {
        assert!(serde_json::from_str::<ForwardIndexRecord>(r#"{"a":[[1,0,7]]}"#).is_err());
        assert!(serde_json::from_str::<ForwardIndexRecord>(r#"{"a":[["x",0]]}"#).is_err());
        assert!(serde_json::from_str::<ForwardIndexRecord>(r#"{"a":[[0,0]]}"#).is_err());
    }

    #[test]
    fn forward_record_accepts_empty_postings() -> Result<(), Box<dyn std::error::Error>> {
        let record: ForwardIndexRecord = serde_json::from_str(r#"{"empty":[]}"#)?;
        assert_eq!(record.document, "empty");
        assert!(record.postings.is_empty());
        Ok(())
    }

    #[test]
    fn options_reject_zero_batch() {
        let options = IndexingOptions {
            batch_size: 0,
            workers: 1,
        };
        assert!(options.validate().is_err());
        assert!(IndexingOptions::default().validate().is_ok());
    }
}
