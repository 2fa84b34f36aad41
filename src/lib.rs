//! RepeatCast: customer repeat-purchase forecasting with a BG/NBD model
//!
//! This library ingests raw transaction history, aggregates it into
//! per-customer frequency/recency/age statistics, fits a BG/NBD
//! (Beta-Geometric/Negative-Binomial) purchase-frequency model, and
//! produces forward-looking predictions, charts, and a downloadable
//! results bundle.

pub mod cli;
pub mod data;
pub mod error;
pub mod export;
pub mod model;
pub mod summary;
pub mod viz;

// Re-export public items for easier access
pub use cli::{Args, PipelineConfig};
pub use data::{generate_transactions, load_transactions, read_transactions, TransactionRecord};
pub use error::Error;
pub use export::{build_archive, write_archive, ResultBundle};
pub use model::{BgNbdModel, ModelParameters, PredictionRow};
pub use summary::{split_transactions, summarize, CustomerSummary, TimeUnit};

/// Common result type used throughout the application
pub type Result<T, E = Error> = std::result::Result<T, E>;
