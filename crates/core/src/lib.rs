pub mod backward;
pub mod barrel;
pub mod corpus;
pub mod error;
pub mod filter;
pub mod forward;
pub mod lexicon;
pub mod models;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod traits;

pub use backward::{
    build_backward_index, flush_barrels, BackwardReport, BarrelDistribution, BarrelManifest,
    PostingsAccumulator,
};
pub use barrel::{
    all_barrel_keys, barrel_key, discover_barrels, summarize_barrels, BarrelKey, BarrelReader,
    BarrelSummary, BARREL_KEY_SPACE,
};
pub use corpus::{discover_documents, document_name, CleanedTextSource, Discovery, WORD_PATTERN};
pub use error::{IndexError, Result};
pub use filter::{is_gibberish, is_lexicon_word, Dictionary, WordFilter};
pub use forward::{
    build_forward_indexes, discover_forward_files, index_document, read_forward_record,
    remove_forward_records, write_forward_record, ForwardReport, IndexedDocument,
};
pub use lexicon::{build_lexicon, candidate_words, Lexicon, LexiconReport};
pub use models::{
    BarrelPostings, ForwardIndexRecord, IndexLayout, IndexingOptions, Position, PostingsList,
    SkippedFile, WordId, WordPosition,
};
pub use pipeline::{run_pipeline, PipelineReport};
pub use stats::{BackwardStats, ForwardStats, LexiconStats};
pub use traits::TokenSource;
