//! Error taxonomy for ConceptGraph.
//!
//! Store failures are classified into the same small set of variants no matter
//! which backend produced them, so callers (and the HTTP layer) can react to
//! the kind of failure without knowing about SQLite.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConceptGraphError>;

/// The stage of a neighborhood traversal that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalStep {
    Root,
    Ancestors,
    Descendants,
    Paths,
}

impl TraversalStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root resolution",
            Self::Ancestors => "ancestor expansion",
            Self::Descendants => "descendant expansion",
            Self::Paths => "path expansion",
        }
    }
}

impl fmt::Display for TraversalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConceptGraphError {
    /// Connection-level failure: the store could not be reached or is busy.
    #[error("graph store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed statement or parameters. Always a programming error.
    #[error("query error: {0}")]
    QuerySyntax(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A store record did not have the shape the decoder expects.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("concept '{0}' not found")]
    ConceptNotFound(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{step} failed: {source}")]
    Traversal {
        step: TraversalStep,
        #[source]
        source: Box<ConceptGraphError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ConceptGraphError {
    /// Annotate an error with the traversal step it came from.
    ///
    /// Already-annotated errors keep their original step.
    pub fn during(self, step: TraversalStep) -> Self {
        match self {
            Self::Traversal { .. } => self,
            other => Self::Traversal {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any traversal annotation stripped.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Traversal { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The traversal step this error was raised in, if any.
    pub fn step(&self) -> Option<TraversalStep> {
        match self {
            Self::Traversal { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn during_wraps_once() {
        let err = ConceptGraphError::StoreUnavailable("socket closed".into())
            .during(TraversalStep::Ancestors)
            .during(TraversalStep::Root);

        assert_eq!(err.step(), Some(TraversalStep::Ancestors));
        assert!(matches!(
            err.root_cause(),
            ConceptGraphError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn traversal_message_names_step() {
        let err = ConceptGraphError::Decode("missing property 'title'".into())
            .during(TraversalStep::Descendants);
        assert_eq!(
            err.to_string(),
            "descendant expansion failed: decode error: missing property 'title'"
        );
    }

    #[test]
    fn unannotated_error_has_no_step() {
        let err = ConceptGraphError::DeadlineExceeded;
        assert_eq!(err.step(), None);
        assert!(matches!(err.root_cause(), ConceptGraphError::DeadlineExceeded));
    }
}
