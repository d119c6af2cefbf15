//! I/O module
//!
//! Handles decoding of batch file payloads.
//!
//! # Components
//!
//! - `csv_format` - CSV schema descriptor and the lazy batch parser

pub mod csv_format;

pub use csv_format::{parse_batch, BatchRecords, CsvSchema, MalformedLinePolicy};
