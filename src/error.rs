//! Error types for the leadcast pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while building a forecast.
///
/// Most variants are recoverable at candidate or learner granularity; the
/// orchestrator only surfaces them to the caller when the target itself
/// cannot support the requested configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Month/date related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// The series source has no series with this id.
    #[error("unknown series: {0}")]
    UnknownSeries(String),

    /// A linear system could not be solved.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// An iterative fit hit its iteration cap.
    #[error("did not converge after {iterations} iterations: {context}")]
    NonConvergence { iterations: usize, context: String },

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),

    /// Report could not be written.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::InsufficientData { needed: 27, got: 12 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 27, got 12"
        );

        let err = ForecastError::UnknownSeries("PCU4841224841221".to_string());
        assert_eq!(err.to_string(), "unknown series: PCU4841224841221");

        let err = ForecastError::NonConvergence {
            iterations: 500,
            context: "lasso coordinate descent".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "did not converge after 500 iterations: lasso coordinate descent"
        );
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ForecastError = parse.unwrap_err().into();
        assert!(matches!(err, ForecastError::Serialization(_)));
    }
}
