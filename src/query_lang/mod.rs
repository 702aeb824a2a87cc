//! The Query Language Layer (§4.3): a correlation-expression parser, the richer
//! UQL grammar, and translators from third-party query dialects into LogsQL /
//! `TraceFilters`. All three parsers share the `tokenizer` module's `Cursor`.

pub mod correlation_parser;
pub mod tokenizer;
pub mod translate;
pub mod uql_parser;

pub use correlation_parser::parse as parse_correlation;
pub use uql_parser::parse as parse_uql;
