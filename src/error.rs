//! Error taxonomy.
//!
//! Configuration errors and data-integrity errors are raised at the boundary
//! (construction or parameter assignment).  Heuristic findings are never
//! errors; they are returned alongside results.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown configuration key `{0}`")]
    UnknownKey(String),

    #[error("unknown window function `{0}` (expected hann, hamming, blackman, blackman-harris or kaiser)")]
    UnknownWindow(String),

    #[error("unknown frequency band `{0}`")]
    UnknownBand(String),

    #[error("unrecognised mode keywords {0:?}")]
    UnknownMode(Vec<String>),

    #[error("hypnogram has undefined labels at epochs {0:?}")]
    MissingLabels(Vec<usize>),

    #[error("hypnogram has non-positive or non-integral labels at epochs {0:?}")]
    InvalidLabels(Vec<usize>),

    #[error("hypnogram labels outside 1..={nstates} at epochs {positions:?}")]
    LabelOutOfRange { nstates: usize, positions: Vec<usize> },

    #[error("markers finish before they start at indices {0:?}")]
    InvalidMarkers(Vec<usize>),

    #[error("{what}: expected length {expected}, got {got}")]
    LengthMismatch { what: &'static str, expected: usize, got: usize },

    #[error("marker {index} [{start}, {finish}]: {reason}")]
    Fragment { index: usize, start: usize, finish: usize, reason: String },

    #[error("epoch {index} out of range (recording has {n_epochs} epochs)")]
    EpochOutOfRange { index: usize, n_epochs: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed signal file: {0}")]
    Format(String),
}

impl Error {
    pub(crate) fn param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }
}
