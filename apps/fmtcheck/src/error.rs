//! Error type shared by the library.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },

    #[error("invalid configuration in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid exclude glob '{pattern}'")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("worker count must be at least 1")]
    InvalidWorkers,

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("invalid rule pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Wrap an I/O error for `path`, mapping undecodable text to `Encoding`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::InvalidData {
            Error::Encoding { path }
        } else {
            Error::Io { path, source }
        }
    }

    /// Render the error with its full source chain on one line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut cur = std::error::Error::source(self);
        while let Some(src) = cur {
            out.push_str(": ");
            out.push_str(&src.to_string());
            cur = src.source();
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, Error>;
