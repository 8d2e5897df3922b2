use crate::error::IndexError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const MIN_WORD_LEN: usize = 2;
pub const MAX_WORD_LEN: usize = 30;

const MAX_CONSONANT_RUN: usize = 5;
const MAX_VOWEL_RUN: usize = 4;
const MAX_REPEAT_RUN: usize = 2;

fn is_vowel(c: u8) -> bool {
    matches!(c, b'a' | b'e' | b'i' | b'o' | b'u')
}

pub fn normalize_token(token: &str) -> String {
    token.trim().to_lowercase()
}

/// `[a-z]{2,30}`.
pub fn is_lexicon_word(word: &str) -> bool {
    (MIN_WORD_LEN..=MAX_WORD_LEN).contains(&word.len())
        && word.bytes().all(|c| c.is_ascii_lowercase())
}

/// Letter patterns that almost never occur in real words: long consonant or
/// vowel runs, a character tripled, or a longer word with no vowel at all.
pub fn is_gibberish(word: &str) -> bool {
    let bytes = word.as_bytes();

    let mut consonants = 0;
    let mut vowels = 0;
    let mut repeats = 1;
    let mut previous = None;

    for &c in bytes {
        if is_vowel(c) {
            vowels += 1;
            consonants = 0;
        } else {
            consonants += 1;
            vowels = 0;
        }

        repeats = if previous == Some(c) { repeats + 1 } else { 1 };
        previous = Some(c);

        if consonants > MAX_CONSONANT_RUN || vowels > MAX_VOWEL_RUN || repeats > MAX_REPEAT_RUN {
            return true;
        }
    }

    bytes.len() > 3 && !bytes.iter().copied().any(is_vowel)
}

/// Known-good words that bypass the gibberish heuristics.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    /// Loads a plain word list, one word per line. Blank lines are ignored.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.is_file() {
            return Err(IndexError::MissingInput(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(text.lines().collect())
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Dictionary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter
                .into_iter()
                .map(|word| word.as_ref().trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect(),
        }
    }
}

/// Decides which candidate words enter the lexicon.
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    dictionary: Dictionary,
}

impl WordFilter {
    pub fn new(dictionary: Dictionary) -> Self {
        Self { dictionary }
    }

    pub fn accepts(&self, word: &str) -> bool {
        if !is_lexicon_word(word) {
            return false;
        }
        self.dictionary.contains(word) || !is_gibberish(word)
    }
}
