//! Service-Level Error Types

use crate::models::GraphError;
use thiserror::Error;

/// Errors surfaced by graph service operations
#[derive(Error, Debug)]
pub enum GraphServiceError {
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Structural problem in the document (cycles, diverged leveling)
    #[error("Graph structure error: {0}")]
    Structure(#[from] GraphError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl GraphServiceError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphServiceError::node_not_found("ghost");
        assert_eq!(err.to_string(), "Node not found: ghost");

        let err: GraphServiceError = GraphError::LevelingDiverged { iterations: 9 }.into();
        assert!(err.to_string().contains("9 iterations"));
    }
}
