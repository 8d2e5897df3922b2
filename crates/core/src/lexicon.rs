use crate::corpus::{discover_documents, Discovery};
use crate::error::IndexError;
use crate::filter::{is_lexicon_word, normalize_token, WordFilter};
use crate::models::{IndexLayout, IndexingOptions, SkippedFile, WordId};
use crate::stats::{persist_stats, LexiconStats};
use crate::store::{read_json, write_json, JsonStyle};
use crate::traits::TokenSource;
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Word → id vocabulary. Ids are always the dense range `1..=len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexicon {
    ids: HashMap<String, WordId>,
    /// `words[id - 1]` is the word with that id.
    words: Vec<String>,
}

impl Lexicon {
    /// Assigns ids `1..=N` to the distinct words in lexicographic order, so the
    /// same word set always produces the same ids.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted = words.into_iter().map(Into::into).collect::<BTreeSet<String>>();
        let words = sorted.into_iter().collect::<Vec<_>>();
        let ids = words
            .iter()
            .enumerate()
            .map(|(index, word)| (word.clone(), index as WordId + 1))
            .collect();

        Self { ids, words }
    }

    /// Rebuilds a lexicon from a persisted mapping, rejecting anything that
    /// breaks the dense-id or word-shape invariants.
    pub fn from_entries(entries: HashMap<String, WordId>) -> Result<Self, IndexError> {
        let count = entries.len();
        let mut slots: Vec<Option<String>> = vec![None; count];

        for (word, &id) in &entries {
            if !is_lexicon_word(word) {
                return Err(IndexError::InvalidLexicon(format!(
                    "word {word:?} is not 2-30 lowercase letters"
                )));
            }

            let slot = (id as usize)
                .checked_sub(1)
                .and_then(|index| slots.get_mut(index))
                .ok_or_else(|| {
                    IndexError::InvalidLexicon(format!(
                        "id {id} for {word:?} is outside 1..={count}"
                    ))
                })?;

            if let Some(existing) = slot {
                return Err(IndexError::InvalidLexicon(format!(
                    "id {id} is assigned to both {existing:?} and {word:?}"
                )));
            }
            *slot = Some(word.clone());
        }

        // `count` distinct words landed in `count` slots without collisions,
        // so every slot is filled.
        let words = slots.into_iter().flatten().collect();
        Ok(Self {
            ids: entries,
            words,
        })
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.is_file() {
            return Err(IndexError::MissingInput(path.to_path_buf()));
        }
        let entries: HashMap<String, WordId> = read_json(path)?;
        Self::from_entries(entries)
    }

    /// Writes `{ word: id }` with keys in sorted order.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let ordered = self
            .ids
            .iter()
            .map(|(word, &id)| (word.as_str(), id))
            .collect::<BTreeMap<_, _>>();
        write_json(path, &ordered, JsonStyle::Pretty)
    }

    pub fn id(&self, word: &str) -> Option<WordId> {
        self.ids.get(word).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.words.get(index))
            .map(String::as_str)
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, WordId)> + '_ {
        self.words
            .iter()
            .enumerate()
            .map(|(index, word)| (word.as_str(), index as WordId + 1))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Distinct accepted words of one document.
pub fn candidate_words<S: AsRef<str>>(tokens: &[S], filter: &WordFilter) -> HashSet<String> {
    tokens
        .iter()
        .map(|token| normalize_token(token.as_ref()))
        .filter(|word| filter.accepts(word))
        .collect()
}

pub struct LexiconReport {
    pub lexicon: Lexicon,
    pub stats: LexiconStats,
    pub skipped_files: Vec<SkippedFile>,
}

/// Scans every document in `corpus_dir`, unions the accepted words and writes
/// the lexicon plus its stats under `layout`.
///
/// Documents are read in batches on a pool of `options.workers` threads. The
/// union happens before ids are assigned, so the worker count and batch size
/// never change the result. Unreadable documents are skipped and reported.
pub fn build_lexicon<S: TokenSource>(
    source: &S,
    corpus_dir: &Path,
    filter: &WordFilter,
    layout: &IndexLayout,
    options: &IndexingOptions,
) -> Result<LexiconReport, IndexError> {
    let started = Instant::now();
    let Discovery {
        files: documents,
        skipped: mut skipped_files,
    } = discover_documents(corpus_dir)?;
    let total_files = documents.len() + skipped_files.len();
    let pool = options.worker_pool()?;
    let total_batches = documents.len().div_ceil(options.batch_size);

    info!(
        corpus = %corpus_dir.display(),
        files = documents.len(),
        batch_size = options.batch_size,
        workers = options.workers,
        "building lexicon"
    );

    let mut vocabulary = HashSet::new();

    for (batch_index, batch) in documents.chunks(options.batch_size).enumerate() {
        let results = pool.install(|| {
            batch
                .par_iter()
                .map(|path| {
                    source
                        .tokens(path)
                        .map(|tokens| candidate_words(&tokens, filter))
                })
                .collect::<Vec<_>>()
        });

        for (path, result) in batch.iter().zip(results) {
            match result {
                Ok(words) => vocabulary.extend(words),
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped document");
                    skipped_files.push(SkippedFile::new(path, &error));
                }
            }
        }

        info!(
            batch = batch_index + 1,
            total_batches,
            unique_words = vocabulary.len(),
            "lexicon batch complete"
        );
    }

    let lexicon = Lexicon::from_words(vocabulary);
    lexicon.save(&layout.lexicon_file())?;

    let stats = LexiconStats {
        total_files,
        failed_files: skipped_files.len(),
        unique_words: lexicon.len(),
        processing_time: started.elapsed().as_secs_f64(),
        completed_at: Utc::now(),
    };
    persist_stats(&layout.lexicon_stats_file(), &stats)?;

    info!(
        unique_words = stats.unique_words,
        failed_files = stats.failed_files,
        seconds = stats.processing_time,
        "lexicon complete"
    );

    Ok(LexiconReport {
        lexicon,
        stats,
        skipped_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CleanedTextSource;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn ids_follow_sorted_word_order() {
        let lexicon = Lexicon::from_words(["star", "nebula", "comet", "star"]);

        assert_eq!(lexicon.len(), 3);
        assert_eq!(lexicon.id("comet"), Some(1));
        assert_eq!(lexicon.id("nebula"), Some(2));
        assert_eq!(lexicon.id("star"), Some(3));
        assert_eq!(lexicon.word(2), Some("nebula"));
        assert_eq!(lexicon.word(0), None);
        assert_eq!(lexicon.word(4), None);
    }

    #[test]
    fn from_entries_rejects_gaps_duplicates_and_bad_words() {
        let gap = HashMap::from([("star".to_string(), 1), ("nebula".to_string(), 3)]);
        assert!(Lexicon::from_entries(gap).is_err());

        let duplicate = HashMap::from([("star".to_string(), 1), ("nebula".to_string(), 1)]);
        assert!(Lexicon::from_entries(duplicate).is_err());

        let zero = HashMap::from([("star".to_string(), 0)]);
        assert!(Lexicon::from_entries(zero).is_err());

        let shape = HashMap::from([("Star".to_string(), 1)]);
        assert!(Lexicon::from_entries(shape).is_err());
    }

    #[test]
    fn save_and_load_preserve_mapping() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("lexicon.json");
        let lexicon = Lexicon::from_words(["star", "nebula"]);

        lexicon.save(&path)?;
        let loaded = Lexicon::load(&path)?;

        assert_eq!(loaded, lexicon);
        let text = fs::read_to_string(&path)?;
        assert!(text.find("nebula") < text.find("star"));
        Ok(())
    }

    #[test]
    fn load_fails_when_file_is_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = Lexicon::load(&dir.path().join("lexicon.json"));
        assert!(matches!(result, Err(IndexError::MissingInput(_))));
        Ok(())
    }

    #[test]
    fn candidates_are_normalized_and_filtered() {
        let tokens = ["Star", "star", "xyzzyqq", "a", "nebula"];
        let words = candidate_words(&tokens, &WordFilter::default());
        assert_eq!(
            words,
            HashSet::from(["star".to_string(), "nebula".to_string()])
        );
    }

    #[test]
    fn build_is_deterministic_across_worker_counts() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = tempdir()?;
        fs::write(corpus.path().join("one.txt"), "star nebula star")?;
        fs::write(corpus.path().join("two.txt"), "comet orbit nebula")?;
        fs::write(corpus.path().join("three.txt"), "galaxy zzzzz")?;

        let source = CleanedTextSource::new()?;
        let filter = WordFilter::default();

        let first_out = tempdir()?;
        let first = build_lexicon(
            &source,
            corpus.path(),
            &filter,
            &IndexLayout::new(first_out.path()),
            &IndexingOptions {
                batch_size: 1,
                workers: 1,
            },
        )?;

        let second_out = tempdir()?;
        let second = build_lexicon(
            &source,
            corpus.path(),
            &filter,
            &IndexLayout::new(second_out.path()),
            &IndexingOptions {
                batch_size: 10,
                workers: 4,
            },
        )?;

        assert_eq!(first.lexicon, second.lexicon);
        assert_eq!(
            first.lexicon.iter().map(|(word, _)| word).collect::<Vec<_>>(),
            vec!["comet", "galaxy", "nebula", "orbit", "star"]
        );
        assert_eq!(
            fs::read(IndexLayout::new(first_out.path()).lexicon_file())?,
            fs::read(IndexLayout::new(second_out.path()).lexicon_file())?
        );
        assert_eq!(first.stats.total_files, 3);
        assert_eq!(first.stats.unique_words, 5);
        Ok(())
    }

    #[test]
    fn unreadable_document_is_skipped_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = tempdir()?;
        fs::write(corpus.path().join("good.txt"), "star nebula")?;
        fs::write(corpus.path().join("bad.txt"), [0xff, 0xfe, 0x00, 0x80])?;
        let out = tempdir()?;
        let layout = IndexLayout::new(out.path());

        let report = build_lexicon(
            &CleanedTextSource::new()?,
            corpus.path(),
            &WordFilter::default(),
            &layout,
            &IndexingOptions::default(),
        )?;

        assert_eq!(report.lexicon.len(), 2);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.stats.failed_files, 1);
        assert!(layout.lexicon_stats_file().is_file());
        Ok(())
    }

    #[test]
    fn empty_corpus_produces_no_lexicon() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = tempdir()?;
        let out = tempdir()?;
        let layout = IndexLayout::new(out.path());

        let result = build_lexicon(
            &CleanedTextSource::new()?,
            corpus.path(),
            &WordFilter::default(),
            &layout,
            &IndexingOptions::default(),
        );

        assert!(matches!(result, Err(IndexError::EmptyCorpus(_))));
        assert!(!layout.lexicon_file().exists());
        Ok(())
    }
}
