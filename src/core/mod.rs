//! Core types and abstractions shared by the ingestion pipeline

pub mod config;
pub mod error;
pub mod log;
pub mod rate;
pub mod source;
pub mod store;

// Re-export main types for cleaner imports
pub use error::{ExtractionError, FetchError, ParseError, StoreError};
pub use rate::{CurrencyObservation, RatePair, StoredRate, SymbolTable};
pub use source::DocumentSource;
pub use store::RateStore;
