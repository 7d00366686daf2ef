//! # Embedding Provider
//!
//! Seam for an external text-to-vector model. A provider failure never fails
//! ingestion: the unit is stored without a vector.

use std::fmt;
use thiserror::Error;

/// Errors reported by an [`EmbeddingProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    /// No model is configured.
    #[error("no embedding model configured")]
    Disabled,

    /// The model could not produce a vector for this input.
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Turns text into a vector of floats.
pub trait EmbeddingProvider: Send + Sync + fmt::Debug {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Provider used when no model is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbeddings;

impl EmbeddingProvider for NoEmbeddings {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_provider_yields_no_vector() {
        assert_eq!(NoEmbeddings.embed("cats"), Err(EmbeddingError::Disabled));
    }
}
