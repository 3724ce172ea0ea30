//! Turns the cached rate document into currency observations

pub mod layout;
pub mod pdf;
pub mod rates;
pub mod rows;

pub use layout::{PageText, TextFragment, TextRow};
pub use rates::{Extraction, MalformedPolicy, RateMatch};
