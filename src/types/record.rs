//! Payment record model
//!
//! A `PaymentRecord` is one decoded line of a batch file. All five fields are
//! required. Only the amount is interpreted; every other value is carried
//! through exactly as it appeared in the source.

use crate::types::error::{PipelineError, Result};
use std::fmt;

/// Fields of a payment record, in their default CSV position order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    /// Payment identifier, unique within a batch
    Id,
    /// Taxpayer identification number
    TaxpayerId,
    /// Amount paid, in currency units
    Amount,
    /// Collection date, preserved verbatim
    CollectionDate,
    /// Tax code, selects the transformation rule
    TaxCode,
}

impl RecordField {
    /// All fields in the order they appear in a batch file
    pub const DEFAULT_ORDER: [RecordField; 5] = [
        RecordField::Id,
        RecordField::TaxpayerId,
        RecordField::Amount,
        RecordField::CollectionDate,
        RecordField::TaxCode,
    ];

    /// Field name as used in logs and the wire format
    pub fn name(self) -> &'static str {
        match self {
            RecordField::Id => "id",
            RecordField::TaxpayerId => "taxpayerId",
            RecordField::Amount => "amount",
            RecordField::CollectionDate => "collectionDate",
            RecordField::TaxCode => "taxCode",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One parsed payment line
///
/// Created by the batch parser, possibly rewritten by the transformation
/// engine, then flattened into a `PaymentMessage` for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    /// Payment identifier (unique within a batch, not enforced)
    pub id: String,

    /// Taxpayer identification number
    pub taxpayer_id: String,

    /// Amount in currency units
    pub amount: f64,

    /// Collection date in the source format
    pub collection_date: String,

    /// Tax code driving transformation
    pub tax_code: String,
}

impl PaymentRecord {
    /// Build a record from already-typed values
    pub fn new(
        id: impl Into<String>,
        taxpayer_id: impl Into<String>,
        amount: f64,
        collection_date: impl Into<String>,
        tax_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            taxpayer_id: taxpayer_id.into(),
            amount,
            collection_date: collection_date.into(),
            tax_code: tax_code.into(),
        }
    }

    /// Decode a record from raw field values laid out in `order`
    ///
    /// # Arguments
    ///
    /// * `fields` - Raw values, one per position
    /// * `order` - Which record field each position holds
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentRecord)` if every field is present and the amount parses
    /// * `Err(PipelineError::MalformedRecord)` otherwise (without a line number;
    ///   the parser attaches one)
    pub fn from_fields(fields: &[&str], order: &[RecordField]) -> Result<Self> {
        let content = fields.join(",");

        if fields.len() != order.len() {
            return Err(PipelineError::malformed_record(
                content,
                format!("expected {} fields, found {}", order.len(), fields.len()),
            ));
        }

        let mut id = None;
        let mut taxpayer_id = None;
        let mut amount = None;
        let mut collection_date = None;
        let mut tax_code = None;

        for (field, value) in order.iter().zip(fields) {
            match field {
                RecordField::Id => id = Some(value.to_string()),
                RecordField::TaxpayerId => taxpayer_id = Some(value.to_string()),
                RecordField::Amount => amount = Some(parse_amount(value, &content)?),
                RecordField::CollectionDate => collection_date = Some(value.to_string()),
                RecordField::TaxCode => tax_code = Some(value.to_string()),
            }
        }

        let missing = |field: RecordField| {
            PipelineError::malformed_record(content.clone(), format!("missing field '{}'", field))
        };

        Ok(Self {
            id: id.ok_or_else(|| missing(RecordField::Id))?,
            taxpayer_id: taxpayer_id.ok_or_else(|| missing(RecordField::TaxpayerId))?,
            amount: amount.ok_or_else(|| missing(RecordField::Amount))?,
            collection_date: collection_date
                .ok_or_else(|| missing(RecordField::CollectionDate))?,
            tax_code: tax_code.ok_or_else(|| missing(RecordField::TaxCode))?,
        })
    }
}

/// Parse an amount with locale-independent decimal semantics
///
/// Accepts an optional sign and a `.` decimal separator. Surrounding whitespace
/// is ignored. Infinite and NaN values are rejected.
pub fn parse_amount(raw: &str, content: &str) -> Result<f64> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PipelineError::malformed_record(
            content,
            format!("invalid amount '{}'", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ORDER: &[RecordField] = &RecordField::DEFAULT_ORDER;

    #[test]
    fn test_from_fields_maps_positions_in_order() {
        let record =
            PaymentRecord::from_fields(&["1", "900111", "100.0", "2024-01-01", "IMP_001"], ORDER)
                .unwrap();

        assert_eq!(
            record,
            PaymentRecord::new("1", "900111", 100.0, "2024-01-01", "IMP_001")
        );
    }

    #[test]
    fn test_from_fields_preserves_strings_verbatim() {
        let record =
            PaymentRecord::from_fields(&["007", " 900 ", "1", "01/02/2024 ", ""], ORDER).unwrap();

        assert_eq!(record.id, "007");
        assert_eq!(record.taxpayer_id, " 900 ");
        assert_eq!(record.collection_date, "01/02/2024 ");
        assert_eq!(record.tax_code, "");
    }

    #[test]
    fn test_from_fields_honours_custom_order() {
        let order = [
            RecordField::TaxCode,
            RecordField::Amount,
            RecordField::Id,
            RecordField::TaxpayerId,
            RecordField::CollectionDate,
        ];
        let record =
            PaymentRecord::from_fields(&["IMP_001", "5", "9", "800", "2024-03-01"], &order).unwrap();

        assert_eq!(record.id, "9");
        assert_eq!(record.tax_code, "IMP_001");
        assert_eq!(record.amount, 5.0);
    }

    #[rstest]
    #[case::too_few(&["1", "900", "1.0", "2024-01-01"], "expected 5 fields, found 4")]
    #[case::too_many(&["1", "900", "1.0", "2024-01-01", "X", "extra"], "expected 5 fields, found 6")]
    #[case::bad_amount(&["1", "900", "ten", "2024-01-01", "X"], "invalid amount 'ten'")]
    #[case::empty_amount(&["1", "900", "", "2024-01-01", "X"], "invalid amount ''")]
    #[case::comma_decimal(&["1", "900", "1,5", "2024-01-01", "X"], "invalid amount '1,5'")]
    #[case::nan_amount(&["1", "900", "NaN", "2024-01-01", "X"], "invalid amount 'NaN'")]
    fn test_from_fields_errors(#[case] fields: &[&str], #[case] expected_reason: &str) {
        let result = PaymentRecord::from_fields(fields, ORDER);

        match result {
            Err(PipelineError::MalformedRecord { reason, line, .. }) => {
                assert_eq!(reason, expected_reason);
                assert_eq!(line, None);
            }
            other => panic!("Expected MalformedRecord, got {:?}", other),
        }
    }

    #[rstest]
    #[case("100.0", 100.0)]
    #[case("-12.5", -12.5)]
    #[case("  42  ", 42.0)]
    #[case("1e3", 1000.0)]
    #[case("+0.25", 0.25)]
    fn test_parse_amount(#[case] raw: &str, #[case] expected: f64) {
        assert_eq!(parse_amount(raw, raw).unwrap(), expected);
    }
}
