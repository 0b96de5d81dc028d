//! Argument construction errors.

use thiserror::Error;

/// Errors raised while constructing operation arguments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A selection named both an allow-list and a relation graph.
    #[error("choose select or include, not both")]
    SelectAndInclude,

    /// A JSON argument document had an unexpected shape.
    #[error("invalid argument at '{path}': {message}")]
    InvalidArgument { path: String, message: String },

    /// An operation name was not recognized.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
}

impl Error {
    /// Create an invalid-argument error at a JSON path.
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            path: path.into(),
            message: message.into(),
        }
    }
}
