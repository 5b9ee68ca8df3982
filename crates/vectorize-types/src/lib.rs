//! Core types for the vectorize indexing pipeline.
//!
//! This crate holds everything the other pipeline crates share: model
//! specs with interpreted schemas, the document type, closed enums, and
//! the layered settings surface. It has no I/O beyond loading the
//! registry and config files.

pub mod config;
pub mod document;
pub mod error;
pub mod model;
pub mod schema;

pub use config::{
    CollectionStrategyKind, SampleSettings, Settings, MAX_DOCS_PER_REQUEST, MAX_TOKENS_PER_REQUEST,
};
pub use document::{meta_keys, Document, Metadata, MetadataValue};
pub use error::ModelError;
pub use model::{ModelRegistry, ModelSpec, TruncationStrategy};
pub use schema::{canonical_json, FieldDef, FieldKind, FieldValue, Record, Schema};

/// Human-friendly integer rendering with thousands separators.
///
/// Used in operator-facing log lines where raw counts get hard to read.
pub fn format_count(value: usize) -> String {
    let digits: Vec<char> = value.to_string().chars().rev().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    out.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }
}
