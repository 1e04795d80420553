//! Error taxonomy for a bundling run
//!
//! Every failure is fatal for the run. Pipeline functions return
//! `anyhow::Result`, and the typed variants below travel inside the
//! `anyhow::Error` so callers can `downcast_ref::<BundleError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    /// Unsupported or malformed syntax in a `require` or export position
    #[error("{}:{line}:{column}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// A module reference that matches neither a file nor a global module
    #[error("Cannot find module '{reference}' referenced from {}", from.display())]
    Resolution { reference: String, from: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage produced state that a later stage cannot accept. Always a bug.
    #[error("internal invariant violated: {message}")]
    InternalInvariant { message: String },
}

impl BundleError {
    pub fn parse(path: impl Into<PathBuf>, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InternalInvariant {
            message: message.into(),
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}
