/// Error types for the non-total parts of the engine.
///
/// Evaluation and lenient decoding never fail; these errors only come out of
/// profile file loading, draft building, strict decoding and history lookups.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadarError {
    /// Reading a profile file or stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoded data was not valid JSON, or did not have the expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A draft is missing a value the filter tree cannot represent
    #[error("incomplete filter: {0}")]
    IncompleteFilter(&'static str),

    /// The location history collaborator could not answer
    #[error("location history unavailable for {address}: {reason}")]
    History { address: String, reason: String },
}

pub type Result<T> = core::result::Result<T, RadarError>;
