//! CLI errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Schema(#[from] ormkit_core::SchemaError),

    #[error(transparent)]
    Arguments(#[from] ormkit_core::proto::Error),

    #[error(transparent)]
    Engine(#[from] ormkit_core::Error),
}

impl CliError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CliError::Json {
            context: context.into(),
            source,
        }
    }
}
