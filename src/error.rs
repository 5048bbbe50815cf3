use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::remover::Stage;

/// Boxed error returned by the pluggable backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors of the markup and path layer.
#[derive(Debug, Error)]
pub enum SvgError {
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("Invalid SVG: {0}")]
    InvalidSvg(String),

    #[error("Invalid path data: {0}")]
    InvalidPath(String),

    #[error("Invalid <{element}> (shape {index}): {reason}")]
    InvalidShape {
        index: usize,
        element: String,
        reason: String,
    },

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// A pipeline step, used to tell where a [`ProcessingError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Load,
    Normalize,
    GuardClipPaths,
    Parse,
    Canonicalize,
    Filter,
    Union,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Load => "load",
            Step::Normalize => "normalization",
            Step::GuardClipPaths => "clip-path protection",
            Step::Parse => "parsing",
            Step::Canonicalize => "canonicalization",
            Step::Filter => "shape filtering",
            Step::Union => "union",
        })
    }
}

/// A failure of one of the processing steps, whatever backend raised it.
#[derive(Debug)]
pub struct ProcessingError {
    pub step: Step,
    /// Document-order index of the shape being processed, if any.
    pub shape: Option<usize>,
    pub source: BoxError,
}

impl ProcessingError {
    pub fn new(step: Step, source: impl Into<BoxError>) -> Self {
        Self {
            step,
            shape: None,
            source: source.into(),
        }
    }

    pub fn with_shape(mut self, index: usize) -> Self {
        self.shape = Some(index);
        self
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            Some(index) => write!(f, "{} failed at shape {}: {}", self.step, index, self.source),
            None => write!(f, "{} failed: {}", self.step, self.source),
        }
    }
}

impl std::error::Error for ProcessingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Errors reported by [`RemoveOverlaps`](crate::RemoveOverlaps).
#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("input path is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {operation} while the remover is {stage}")]
    Usage { operation: &'static str, stage: Stage },
}

impl Error {
    pub(crate) fn processing(step: Step, source: impl Into<BoxError>) -> Self {
        Error::Processing(ProcessingError::new(step, source))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
