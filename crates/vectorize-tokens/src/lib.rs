//! Token counting and budget truncation.
//!
//! [`TokenCounter`] wraps the frozen `cl100k_base` encoding; [`fit`]
//! reduces oversized text to a token ceiling under one of the closed
//! truncation strategies while keeping the sentinel accounting exact.

pub mod counter;
pub mod truncate;

pub use counter::TokenCounter;
pub use truncate::{auto_strategy, fit, Truncation, SENTINEL};
