//! CSV batch format handling
//!
//! This module turns the raw bytes of one batch file into an ordered sequence
//! of `PaymentRecord`s. It provides:
//! - `CsvSchema`, the descriptor for field order, delimiter and header skipping
//! - `parse_batch`, a lazy iterator over the decoded records
//!
//! Parsing is pure (no I/O) and holds no state between files: calling
//! `parse_batch` twice on the same bytes yields the same sequence.
//!
//! # Error Reporting
//!
//! A line that fails to decode is yielded as `Err(PipelineError::MalformedRecord)`
//! carrying its 1-based line number and content. The iterator keeps going after
//! an error; deciding whether to abort or skip is left to the caller.

use crate::types::{PaymentRecord, PipelineError, RecordField, Result};
use csv::{ByteRecord, ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

/// What to do with the rest of a batch once a line fails to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Abort the batch on the first malformed line
    #[default]
    FailFast,
    /// Log the line and continue with the next one
    Skip,
}

/// Schema descriptor for a batch file
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSchema {
    /// Field separator byte
    pub delimiter: u8,
    /// Whether the first line is a header to discard
    pub skip_header: bool,
    field_order: Vec<RecordField>,
}

impl Default for CsvSchema {
    fn default() -> Self {
        Self {
            delimiter: b',',
            skip_header: true,
            field_order: RecordField::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl CsvSchema {
    /// Create a schema with the default field order
    pub fn new(delimiter: u8, skip_header: bool) -> Self {
        Self {
            delimiter,
            skip_header,
            ..Self::default()
        }
    }

    /// Replace the positional field order
    ///
    /// # Errors
    ///
    /// Returns `FatalConfiguration` unless `order` names every record field
    /// exactly once.
    pub fn with_field_order(mut self, order: Vec<RecordField>) -> Result<Self> {
        let complete = order.len() == RecordField::DEFAULT_ORDER.len()
            && RecordField::DEFAULT_ORDER
                .iter()
                .all(|field| order.iter().filter(|f| *f == field).count() == 1);

        if !complete {
            return Err(PipelineError::fatal_configuration(format!(
                "field order must list each of {:?} exactly once, got {:?}",
                RecordField::DEFAULT_ORDER,
                order
            )));
        }

        self.field_order = order;
        Ok(self)
    }

    /// Positional field order
    pub fn field_order(&self) -> &[RecordField] {
        &self.field_order
    }
}

/// Lazily decode the records of one batch file
///
/// # Arguments
///
/// * `content` - Raw bytes of the file
/// * `schema` - Field order, delimiter and header handling
///
/// # Returns
///
/// An iterator yielding one `Result<PaymentRecord>` per non-empty data line,
/// in file order.
pub fn parse_batch<'a>(content: &'a [u8], schema: &'a CsvSchema) -> BatchRecords<'a> {
    let reader = ReaderBuilder::new()
        .delimiter(schema.delimiter)
        .has_headers(schema.skip_header)
        .flexible(true)
        .trim(Trim::None)
        .from_reader(content);

    BatchRecords {
        content,
        reader,
        row: ByteRecord::new(),
        schema,
    }
}

/// Iterator over the records of one batch, see [`parse_batch`]
pub struct BatchRecords<'a> {
    content: &'a [u8],
    reader: csv::Reader<&'a [u8]>,
    row: ByteRecord,
    schema: &'a CsvSchema,
}

impl BatchRecords<'_> {
    /// 1-based line number and text of the record just read, as written in the file
    fn raw_line(&self) -> (u64, String) {
        let len = self.content.len();
        let start = self
            .row
            .position()
            .map(|pos| usize::try_from(pos.byte()).unwrap_or(len))
            .unwrap_or(0)
            .min(len);
        let end = usize::try_from(self.reader.position().byte())
            .unwrap_or(len)
            .clamp(start, len);

        // The recorded start may sit on blank lines or a CRLF tail preceding the record
        let is_break = |b: &u8| matches!(b, b'\r' | b'\n');
        let start = start + self.content[start..end].iter().take_while(|b| is_break(b)).count();
        let trailing = self.content[start..end].iter().rev().take_while(|b| is_break(b)).count();
        let raw = &self.content[start..end - trailing];

        let line = self.content[..start].iter().filter(|&&b| b == b'\n').count() as u64 + 1;
        (line, String::from_utf8_lossy(raw).into_owned())
    }

    fn decode_current(&self) -> Result<PaymentRecord> {
        let (line, content) = self.raw_line();
        let malformed = |reason: String| PipelineError::MalformedRecord {
            line: Some(line),
            content: content.clone(),
            reason,
        };

        let mut fields = Vec::with_capacity(self.row.len());
        for (index, bytes) in self.row.iter().enumerate() {
            match std::str::from_utf8(bytes) {
                Ok(field) => fields.push(field),
                Err(_) => return Err(malformed(format!("invalid UTF-8 in field {}", index + 1))),
            }
        }

        PaymentRecord::from_fields(&fields, self.schema.field_order()).map_err(|e| match e {
            PipelineError::MalformedRecord { reason, .. } => malformed(reason),
            other => other,
        })
    }
}

impl Iterator for BatchRecords<'_> {
    type Item = Result<PaymentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.row) {
            Ok(false) => None,
            Ok(true) => Some(self.decode_current()),
            Err(e) => Some(Err(e.into())),
        }
    }
}
