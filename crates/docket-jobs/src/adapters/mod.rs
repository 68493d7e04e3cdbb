//! Built-in text extractors.

pub mod plain_text;

pub use plain_text::PlainTextExtractor;
