//! Error types for the analysis and the model files.

use std::path::PathBuf;

use thiserror::Error;

use crate::tree::NodeId;

/// Non-fatal failures of one heuristic or one refactoring step.
///
/// None of these aborts the analysis of other commands: attribution turns them
/// into an empty candidate set, the refactorer skips the affected widget usage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A declaration, parent link or type is missing from the model.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Several registration calls or abstract methods qualify.
    #[error("ambiguous evidence: {0}")]
    AmbiguousEvidence(String),

    /// The tree does not have the shape a transformation requires.
    #[error("structural precondition violated: {0}")]
    StructuralPrecondition(String),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while reading or writing front-end model files.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid model in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("node handle {0} does not exist in the model")]
    DanglingNode(NodeId),

    #[error("node {node} sits in two slots, under {first} and {second}")]
    SharedNode {
        node: NodeId,
        first: NodeId,
        second: NodeId,
    },

    #[error("node {0} is its own ancestor")]
    Cycle(NodeId),

    #[error("command {index} refers to {node}, which is not a listener executable")]
    NotAnExecutable { index: usize, node: NodeId },
}
