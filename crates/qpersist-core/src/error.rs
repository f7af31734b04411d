use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a `Value` tree into JSON.
///
/// `path` is a JSON Pointer to the offending node (`""` is the root).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("object of type {type_name} is not JSON serializable (at '{path}')")]
    Unsupported { type_name: String, path: String },

    #[error("non-finite float {value} has no JSON representation (at '{path}')")]
    NonFinite { value: f64, path: String },

    #[error("array shape {shape:?} needs {expected} elements, got {actual}")]
    Shape {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("JSON parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON write error on {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot reconstruct {type_name}: {source}")]
    Reconstruct {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for `Error::Encode`, whatever the cause.
    pub fn is_encode(&self) -> bool {
        matches!(self, Error::Encode(_))
    }
}
