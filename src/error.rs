//! Error types for the streaming buffer.
//!
//! Every variant is fatal for the run that produced it: a token stream is
//! processed exactly once and an inconsistency aborts evaluation instead of
//! producing a partial result.

use crate::buffer::NodeRef;
use crate::roles::RoleId;
use thiserror::Error;

/// Convenience type alias for Results using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the buffer, the collector, the driver and the iterators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Token order does not describe a well-formed tree, or a blocking read
    /// needs data the exhausted stream can no longer deliver.
    #[error("stream consistency: {message}")]
    StreamConsistency { message: String },

    /// Malformed markup reported by the XML tokenizer.
    #[error("syntax error at byte {position}: {message}")]
    Syntax { message: String, position: usize },

    /// Role bookkeeping diverged from the evaluator (sign-off of a role that
    /// is not attached, or a role id the registry never minted).
    #[error("role consistency: {message} (role {role:?} on node {node:?})")]
    RoleConsistency {
        role: RoleId,
        node: NodeRef,
        message: &'static str,
    },

    /// A node handle outlived the node it referred to.
    #[error("node {node:?} was collected while still referenced")]
    IteratorMisuse { node: NodeRef },

    /// Location path could not be parsed.
    #[error("query error at byte {position}: {message}")]
    Query { message: String, position: usize },

    /// Reading from the underlying input failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver already reported a fatal error.
    #[error("stream aborted by an earlier error")]
    Aborted,
}

impl Error {
    pub(crate) fn stream(message: impl Into<String>) -> Self {
        Error::StreamConsistency {
            message: message.into(),
        }
    }

    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Error::Syntax {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn query(message: impl Into<String>, position: usize) -> Self {
        Error::Query {
            message: message.into(),
            position,
        }
    }

    /// Short static label, used as the reason atom on the NIF boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Error::StreamConsistency { .. } => "stream_consistency",
            Error::Syntax { .. } => "syntax",
            Error::RoleConsistency { .. } => "role_consistency",
            Error::IteratorMisuse { .. } => "iterator_misuse",
            Error::Query { .. } => "query",
            Error::Io(_) => "io",
            Error::Aborted => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_code() {
        let err = Error::syntax("unterminated comment", 12);
        assert_eq!(err.to_string(), "syntax error at byte 12: unterminated comment");
        assert_eq!(err.code(), "syntax");
        assert_eq!(Error::stream("x").code(), "stream_consistency");
    }
}
