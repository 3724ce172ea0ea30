pub mod document;
pub mod util;

pub use document::{DocumentFetcher, FetchOutcome};
