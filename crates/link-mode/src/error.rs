//! Error taxonomy for link-mode

use std::io;

/// Errors produced by the link-mode subsystem.
///
/// "No targets", "no key match" and an exhausted label pool are ordinary
/// control flow and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum LinkModeError {
    /// The composed-character key space (or its configured capacity) is full.
    #[error("composed character table exhausted ({capacity} entries)")]
    TableExhausted { capacity: usize },

    /// The detection pattern failed to compile or execute.
    #[error("pattern engine error: {0}")]
    PatternEngine(#[from] regex::Error),

    /// A programming contract was broken; only the current operation is aborted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The label alphabet cannot produce the requested number of labels.
    #[error("label alphabet {alphabet:?} cannot produce {count} distinct labels")]
    InvalidAlphabet { alphabet: String, count: usize },

    #[error("invalid key binding {0:?}")]
    InvalidKeyBinding(String),

    /// Malformed launch request or reply.
    #[error("launch protocol error: {0}")]
    Protocol(String),

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LinkModeError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        LinkModeError::InvariantViolation(message.into())
    }
}

pub type Result<T, E = LinkModeError> = std::result::Result<T, E>;
