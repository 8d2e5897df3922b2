use crate::error::IndexError;
use std::path::Path;

/// Supplies the ordered, normalized token stream of one document.
///
/// Position `p` in the returned vector is the token's position in the
/// document; the builders never reorder it.
pub trait TokenSource: Sync {
    fn tokens(&self, path: &Path) -> Result<Vec<String>, IndexError>;
}
