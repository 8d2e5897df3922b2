//! Barrel addressing and read access to the sharded inverted index.
//!
//! A barrel holds the postings of every word whose first three letters match
//! its key. The key depends on the word text alone, so a reader can find the
//! right file for a word without opening any index.

use crate::error::IndexError;
use crate::filter::normalize_token;
use crate::lexicon::Lexicon;
use crate::models::{BarrelPostings, PostingsList};
use crate::store::read_json;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const BARREL_KEY_LEN: usize = 3;
pub const BARREL_PAD: char = 'a';
/// Every possible key, `aaa` through `zzz`.
pub const BARREL_KEY_SPACE: usize = 26 * 26 * 26;

const BARREL_FILE_PREFIX: &str = "inverted_";
const BARREL_FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BarrelKey(String);

impl BarrelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{BARREL_FILE_PREFIX}{}{BARREL_FILE_SUFFIX}", self.0)
    }

    /// Recovers the key from an `inverted_<key>.json` file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let key = name
            .strip_prefix(BARREL_FILE_PREFIX)?
            .strip_suffix(BARREL_FILE_SUFFIX)?;
        let valid = key.len() == BARREL_KEY_LEN && key.bytes().all(|c| c.is_ascii_lowercase());
        valid.then(|| Self(key.to_string()))
    }
}

impl fmt::Display for BarrelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First three characters of the lowercased word, right-padded with `'a'`.
pub fn barrel_key(word: &str) -> BarrelKey {
    let key = word
        .to_lowercase()
        .chars()
        .chain(std::iter::repeat(BARREL_PAD))
        .take(BARREL_KEY_LEN)
        .collect();
    BarrelKey(key)
}

pub fn all_barrel_keys() -> impl Iterator<Item = BarrelKey> {
    let letters = || b'a'..=b'z';
    letters().flat_map(move |first| {
        letters().flat_map(move |second| {
            letters().map(move |third| {
                BarrelKey(String::from_utf8_lossy(&[first, second, third]).into_owned())
            })
        })
    })
}

/// Barrel files present in `dir`, sorted by key.
pub fn discover_barrels(dir: &Path) -> Result<Vec<(BarrelKey, PathBuf)>, IndexError> {
    if !dir.is_dir() {
        return Err(IndexError::MissingInput(dir.to_path_buf()));
    }

    let mut barrels = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let key = entry.file_name().to_str().and_then(BarrelKey::from_file_name);
        if let Some(key) = key {
            barrels.push((key, entry.path()));
        }
    }

    barrels.sort_unstable();
    Ok(barrels)
}

/// Deletes every barrel file in `dir`. Returns how many were removed.
pub fn remove_barrels(dir: &Path) -> Result<usize, IndexError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let barrels = discover_barrels(dir)?;
    for (_, path) in &barrels {
        fs::remove_file(path)?;
    }
    Ok(barrels.len())
}

pub struct BarrelReader {
    dir: PathBuf,
}

impl BarrelReader {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(IndexError::MissingInput(dir));
        }
        Ok(Self { dir })
    }

    pub fn barrel_path(&self, key: &BarrelKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// `None` when no barrel was written for `key`.
    pub fn read_barrel(&self, key: &BarrelKey) -> Result<Option<BarrelPostings>, IndexError> {
        let path = self.barrel_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Postings for `word`, or `None` if the word is not in the lexicon or has
    /// no postings.
    pub fn postings_for_word(
        &self,
        lexicon: &Lexicon,
        word: &str,
    ) -> Result<Option<PostingsList>, IndexError> {
        let word = normalize_token(word);
        let Some(word_id) = lexicon.id(&word) else {
            return Ok(None);
        };

        let barrel = self.read_barrel(&barrel_key(&word))?;
        Ok(barrel.and_then(|mut postings| postings.remove(&word_id)))
    }
}

/// Size and fill distribution across the barrels of one output directory.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BarrelSummary {
    pub barrels: usize,
    pub total_bytes: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub avg_bytes: f64,
    pub total_words: usize,
    pub min_words: usize,
    pub max_words: usize,
    pub avg_words: f64,
    pub total_postings: u64,
}

pub fn summarize_barrels(dir: &Path) -> Result<BarrelSummary, IndexError> {
    let barrels = discover_barrels(dir)?;
    if barrels.is_empty() {
        return Ok(BarrelSummary::default());
    }

    let mut summary = BarrelSummary {
        barrels: barrels.len(),
        min_bytes: u64::MAX,
        min_words: usize::MAX,
        ..BarrelSummary::default()
    };

    for (_, path) in &barrels {
        let bytes = fs::metadata(path)?.len();
        let postings: BarrelPostings = read_json(path)?;
        let words = postings.len();

        summary.total_bytes += bytes;
        summary.min_bytes = summary.min_bytes.min(bytes);
        summary.max_bytes = summary.max_bytes.max(bytes);
        summary.total_words += words;
        summary.min_words = summary.min_words.min(words);
        summary.max_words = summary.max_words.max(words);
        summary.total_postings += postings
            .values()
            .flat_map(|documents| documents.values())
            .map(|positions| positions.len() as u64)
            .sum::<u64>();
    }

    summary.avg_bytes = summary.total_bytes as f64 / summary.barrels as f64;
    summary.avg_words = summary.total_words as f64 / summary.barrels as f64;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn keys_are_prefixes_padded_with_a() {
        assert_eq!(barrel_key("nebula").as_str(), "neb");
        assert_eq!(barrel_key("a").as_str(), "aaa");
        assert_eq!(barrel_key("ab").as_str(), "aba");
        assert_eq!(barrel_key("").as_str(), "aaa");
        assert_eq!(barrel_key("NEBULA"), barrel_key("nebula"));
    }

    #[test]
    fn key_space_covers_aaa_to_zzz() {
        let keys = all_barrel_keys().collect::<Vec<_>>();
        assert_eq!(keys.len(), BARREL_KEY_SPACE);
        assert_eq!(keys[0].as_str(), "aaa");
        assert_eq!(keys[keys.len() - 1].as_str(), "zzz");
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn file_names_round_trip_and_reject_foreign_files() {
        let key = barrel_key("star");
        assert_eq!(key.file_name(), "inverted_sta.json");
        assert_eq!(BarrelKey::from_file_name("inverted_sta.json"), Some(key));
        assert_eq!(BarrelKey::from_file_name("inverted_st.json"), None);
        assert_eq!(BarrelKey::from_file_name("inverted_St1.json"), None);
        assert_eq!(BarrelKey::from_file_name("barrel_manifest.json"), None);
    }

    #[test]
    fn reader_finds_postings_from_word_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("inverted_neb.json"),
            r#"{"2":{"paper":[2,9],"notes":[0]}}"#,
        )?;
        let lexicon = Lexicon::from_words(["nebula", "star"]);
        let reader = BarrelReader::open(dir.path())?;

        let postings = reader
            .postings_for_word(&lexicon, "Nebula")?
            .expect("nebula has postings");
        let expected: PostingsList = BTreeMap::from([
            (Arc::from("notes"), vec![0]),
            (Arc::from("paper"), vec![2, 9]),
        ]);
        assert_eq!(postings, expected);

        assert_eq!(reader.postings_for_word(&lexicon, "star")?, None);
        assert_eq!(reader.postings_for_word(&lexicon, "comet")?, None);
        Ok(())
    }

    #[test]
    fn summary_counts_words_and_postings() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("inverted_neb.json"), r#"{"2":{"paper":[2,9]}}"#)?;
        fs::write(
            dir.path().join("inverted_sta.json"),
            r#"{"3":{"paper":[1]},"4":{"notes":[0,5,7]}}"#,
        )?;
        fs::write(dir.path().join("barrel_manifest.json"), "{}")?;

        let summary = summarize_barrels(dir.path())?;
        assert_eq!(summary.barrels, 2);
        assert_eq!(summary.total_words, 3);
        assert_eq!(summary.min_words, 1);
        assert_eq!(summary.max_words, 2);
        assert_eq!(summary.total_postings, 6);
        Ok(())
    }

    #[test]
    fn remove_barrels_only_touches_barrel_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("inverted_neb.json"), "{}")?;
        fs::write(dir.path().join("backward_indexing_stats.json"), "{}")?;

        assert_eq!(remove_barrels(dir.path())?, 1);
        assert!(!dir.path().join("inverted_neb.json").exists());
        assert!(dir.path().join("backward_indexing_stats.json").exists());
        Ok(())
    }
}
