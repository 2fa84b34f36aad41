//! Error taxonomy shared by every pipeline stage.
//!
//! Each variant is raised at the boundary of the offending component and
//! propagated unmodified to the caller; no stage substitutes defaults for
//! invalid input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required column is absent from the input header.
    #[error("missing required column `{0}`")]
    Schema(String),

    /// A cell could not be parsed into its expected type.
    #[error("row {row}: {message}")]
    Parse { row: usize, message: String },

    /// No rows survived validation, or a stage received an empty dataset.
    #[error("no transactions to process")]
    EmptyInput,

    /// The optimizer exhausted its iteration budget without converging.
    #[error("model fit did not converge within {iterations} iterations; try a larger penalizer or more data")]
    Convergence { iterations: usize },

    /// The holdout window contains no transactions.
    #[error("holdout window contains no transactions")]
    InsufficientData,

    /// A caller-supplied value violates the contract (negative horizon,
    /// negative penalizer, split date outside the data range, ...).
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    /// Chart rendering failed in the plotting backend.
    #[error("chart rendering failed: {0}")]
    Chart(String),
}

impl Error {
    pub(crate) fn parse(row: usize, message: impl Into<String>) -> Self {
        Error::Parse { row, message: message.into() }
    }
}
