use std::time::Duration;

use crate::types::AnimalId;

/// Result type for pedigree operations
pub type Result<T> = std::result::Result<T, PedigreeError>;

/// Failures reported by a backing store adapter.
///
/// A missing record is not an error at this level: lookups return `Ok(None)`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    #[error("Repository lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Error types surfaced to callers of the engine
#[derive(Debug, thiserror::Error)]
pub enum PedigreeError {
    #[error("Animal not found: {0}")]
    NotFound(AnimalId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Lookup for animal {id} timed out after {elapsed:?}")]
    LookupTimeout { id: AnimalId, elapsed: Duration },

    #[error("Ancestry traversal from {root} exceeded its deadline of {deadline:?}")]
    TraversalDeadlineExceeded { root: AnimalId, deadline: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PedigreeError {
    /// Map an adapter failure seen while resolving a caller-supplied animal.
    pub(crate) fn from_root_lookup(id: &AnimalId, err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(reason) => PedigreeError::RepositoryUnavailable(reason),
            RepositoryError::Timeout(elapsed) => PedigreeError::LookupTimeout {
                id: id.clone(),
                elapsed,
            },
        }
    }
}

impl From<RepositoryError> for PedigreeError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(reason) => PedigreeError::RepositoryUnavailable(reason),
            RepositoryError::Timeout(elapsed) => {
                PedigreeError::RepositoryUnavailable(format!("timed out after {:?}", elapsed))
            }
        }
    }
}
