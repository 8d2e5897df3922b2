use crate::error::IndexError;
use crate::models::{SkippedFile, FORWARD_STATS_FILE};
use crate::traits::TokenSource;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Words the cleaning stage leaves behind: 2 to 30 ASCII letters.
pub const WORD_PATTERN: &str = r"\b[a-zA-Z]{2,30}\b";

/// Bookkeeping files the cleaning stage writes next to the documents.
const CLEANING_ARTIFACTS: [&str; 2] = ["vocabulary.txt", "processing_progress.json"];

/// Files found directly inside a folder, plus the entries that could not be
/// read or claimed.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

/// Lists the files with `extension` directly inside `folder`, sorted by path.
/// Symlinks are followed; entries that cannot be read are logged and reported
/// in [`Discovery::skipped`].
///
/// Fails with [`IndexError::MissingInput`] when the folder does not exist.
pub fn discover_files(
    folder: &Path,
    extension: &str,
    excluded: &[&str],
) -> Result<Discovery, IndexError> {
    if !folder.is_dir() {
        return Err(IndexError::MissingInput(folder.to_path_buf()));
    }

    let mut discovery = Discovery::default();

    for item in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) => {
                let path = error.path().unwrap_or(folder).to_path_buf();
                let error = IndexError::from(error);
                warn!(path = %path.display(), reason = %error, "unreadable directory entry");
                discovery.skipped.push(SkippedFile::new(path, &error));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let matches_extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));

        let is_excluded = entry
            .file_name()
            .to_str()
            .is_some_and(|name| excluded.contains(&name));

        if matches_extension && !is_excluded {
            discovery.files.push(entry.path().to_path_buf());
        }
    }

    discovery.files.sort_unstable();
    discovery
        .skipped
        .sort_by(|left, right| left.path.cmp(&right.path));
    Ok(discovery)
}

/// Cleaned documents in a corpus folder. An empty corpus is an error.
///
/// Every document owns the forward record named after it, so the first file
/// (in path order) to claim a name keeps it. Later files with the same stem,
/// and files whose record would land on the forward stats file, are skipped.
pub fn discover_documents(folder: &Path) -> Result<Discovery, IndexError> {
    let found = discover_files(folder, "txt", &CLEANING_ARTIFACTS)?;
    if found.files.is_empty() {
        return Err(IndexError::EmptyCorpus(folder.to_path_buf()));
    }

    let mut discovery = Discovery {
        files: Vec::with_capacity(found.files.len()),
        skipped: found.skipped,
    };
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for path in found.files {
        let name = match document_name(&path) {
            Ok(name) => name,
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                discovery.skipped.push(SkippedFile::new(path, &error));
                continue;
            }
        };

        let conflict = if format!("{name}.json") == FORWARD_STATS_FILE {
            Some(format!("{name} is reserved for forward index stats"))
        } else {
            claimed.get(&name).map(|owner| {
                format!("{name} is already taken by {}", owner.display())
            })
        };

        match conflict {
            Some(reason) => {
                let error = IndexError::NameConflict(reason);
                warn!(path = %path.display(), reason = %error, "skipped document");
                discovery.skipped.push(SkippedFile::new(path, &error));
            }
            None => {
                claimed.insert(name, path.clone());
                discovery.files.push(path);
            }
        }
    }

    discovery
        .skipped
        .sort_by(|left, right| left.path.cmp(&right.path));
    Ok(discovery)
}

/// The document name is the file name without its extension.
pub fn document_name(path: &Path) -> Result<String, IndexError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IndexError::MissingFileName(path.display().to_string()))
}

/// Reads cleaned `.txt` files and yields their lowercased words in order.
#[derive(Debug, Clone)]
pub struct CleanedTextSource {
    pattern: Regex,
}

impl CleanedTextSource {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            pattern: Regex::new(WORD_PATTERN)?,
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.pattern
            .find_iter(text)
            .map(|word| word.as_str().to_ascii_lowercase())
            .collect()
    }
}

impl TokenSource for CleanedTextSource {
    fn tokens(&self, path: &Path) -> Result<Vec<String>, IndexError> {
        let text = fs::read_to_string(path)?;
        Ok(self.tokenize(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tokenizer_keeps_order_and_drops_non_words() -> Result<(), Box<dyn std::error::Error>> {
        let source = CleanedTextSource::new()?;
        let tokens = source.tokenize("Star star42 x NEBULA, dark-matter");
        assert_eq!(tokens, vec!["star", "nebula", "dark", "matter"]);
        Ok(())
    }

    #[test]
    fn discovery_is_flat_sorted_and_skips_cleaning_artifacts(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        fs::write(base.join("b.txt"), "beta")?;
        fs::write(base.join("a.txt"), "alpha")?;
        fs::write(base.join("vocabulary.txt"), "alpha beta")?;
        fs::write(base.join("notes.md"), "ignored")?;
        fs::create_dir(base.join("nested"))?;
        fs::write(base.join("nested").join("c.txt"), "gamma")?;

        let discovery = discover_documents(base)?;
        assert!(discovery.skipped.is_empty());
        let names = discovery
            .files
            .iter()
            .map(|path| document_name(path))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(names, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn discovery_fails_for_missing_or_empty_corpus() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        assert!(matches!(
            discover_documents(&dir.path().join("missing")),
            Err(IndexError::MissingInput(_))
        ));
        assert!(matches!(
            discover_documents(dir.path()),
            Err(IndexError::EmptyCorpus(_))
        ));
        Ok(())
    }

    #[test]
    fn colliding_document_names_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        fs::write(base.join("doc.TXT"), "upper")?;
        fs::write(base.join("doc.txt"), "lower")?;
        fs::write(base.join("indexing_stats.txt"), "reserved")?;
        fs::write(base.join("other.txt"), "other")?;

        let discovery = discover_documents(base)?;
        assert_eq!(
            discovery.files,
            vec![base.join("doc.TXT"), base.join("other.txt")]
        );

        let skipped = discovery
            .skipped
            .iter()
            .map(|file| file.path.clone())
            .collect::<Vec<_>>();
        assert_eq!(skipped, vec![base.join("doc.txt"), base.join("indexing_stats.txt")]);
        assert!(discovery.skipped[0].reason.contains("already taken"));
        assert!(discovery.skipped[1].reason.contains("reserved"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        fs::write(base.join("good.txt"), "star")?;
        std::os::unix::fs::symlink(base.join("missing.txt"), base.join("dangling.txt"))?;

        let discovery = discover_documents(base)?;
        assert_eq!(discovery.files, vec![base.join("good.txt")]);
        assert_eq!(discovery.skipped.len(), 1);
        assert_eq!(discovery.skipped[0].path, base.join("dangling.txt"));
        Ok(())
    }
}
