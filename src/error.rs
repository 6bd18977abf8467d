//! Error type shared by the extraction, font and rendering stages.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by the report pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// A regulation document could not be parsed as a PDF at all.
    #[error("malformed regulation document: {source}")]
    MalformedDocument {
        /// Parser error reported by `lopdf`.
        #[source]
        source: lopdf::Error,
    },

    /// A font candidate exists on disk but cannot be loaded as a font.
    #[error("invalid font asset '{name}' at {}: {reason}", path.display())]
    InvalidFontAsset {
        /// Logical font name of the candidate.
        name: String,
        /// Location of the rejected file.
        path: PathBuf,
        /// Loader message.
        reason: String,
    },

    /// The report document could not be assembled.
    #[error("failed to render report: {message}")]
    RenderingFailure {
        /// What went wrong while rendering.
        message: String,
        /// Underlying rendering error, if any.
        #[source]
        source: Option<genpdf::error::Error>,
    },

    /// The external analysis service did not return a result.
    #[error("analysis failed: {message}")]
    AnalysisFailure {
        /// Description supplied by the service adapter.
        message: String,
    },

    /// Reading an input file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ReportError {
    pub(crate) fn rendering(message: impl Into<String>) -> Self {
        Self::RenderingFailure {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<genpdf::error::Error> for ReportError {
    fn from(err: genpdf::error::Error) -> Self {
        Self::RenderingFailure {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ReportError> = std::result::Result<T, E>;
