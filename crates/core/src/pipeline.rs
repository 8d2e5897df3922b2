use crate::backward::{build_backward_index, BackwardReport};
use crate::error::IndexError;
use crate::filter::WordFilter;
use crate::forward::{build_forward_indexes, ForwardReport};
use crate::lexicon::{build_lexicon, LexiconReport};
use crate::models::{IndexLayout, IndexingOptions};
use crate::traits::TokenSource;
use std::path::Path;
use tracing::info;

pub struct PipelineReport {
    pub lexicon: LexiconReport,
    pub forward: ForwardReport,
    pub backward: BackwardReport,
}

/// Runs lexicon → forward → backward. Each stage writes all of its output
/// before the next one starts; the later stages reuse the in-memory lexicon
/// that was just persisted.
pub fn run_pipeline<S: TokenSource>(
    source: &S,
    corpus_dir: &Path,
    filter: &WordFilter,
    layout: &IndexLayout,
    options: &IndexingOptions,
) -> Result<PipelineReport, IndexError> {
    options.validate()?;
    info!(corpus = %corpus_dir.display(), output = %layout.root().display(), "pipeline start");

    let lexicon = build_lexicon(source, corpus_dir, filter, layout, options)?;
    let forward = build_forward_indexes(source, corpus_dir, &lexicon.lexicon, layout, options)?;
    let backward = build_backward_index(&lexicon.lexicon, layout, options)?;

    Ok(PipelineReport {
        lexicon,
        forward,
        backward,
    })
}
