//! Wire message format and SQL bind parameters
//!
//! `PaymentMessage` is the flat record exchanged between the transformation
//! stage and the sinks. Its JSON field names are the dispatch contract:
//! `taxpayerId`, `amount`, `collectionDate`, `taxCode`.

use crate::types::error::Result;
use crate::types::record::PaymentRecord;
use serde::{Deserialize, Serialize};

/// Flattened payment as it travels to the queue and SQL sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMessage {
    pub taxpayer_id: String,
    pub amount: f64,
    pub collection_date: String,
    pub tax_code: String,
}

impl PaymentMessage {
    /// Serialize to the JSON body sent to the queue
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a JSON body received from the queue
    ///
    /// Every field is required; unknown fields are ignored.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Rebuild a record around this message
    ///
    /// The wire format carries no payment id, so the caller supplies one
    /// (the queue source uses its delivery id).
    pub fn into_record(self, id: impl Into<String>) -> PaymentRecord {
        PaymentRecord {
            id: id.into(),
            taxpayer_id: self.taxpayer_id,
            amount: self.amount,
            collection_date: self.collection_date,
            tax_code: self.tax_code,
        }
    }

    /// Named parameters for binding into a SQL statement template
    pub fn to_params(&self) -> NamedParams {
        NamedParams(vec![
            (":taxpayerId", SqlValue::Text(self.taxpayer_id.clone())),
            (":amount", SqlValue::Real(self.amount)),
            (":collectionDate", SqlValue::Text(self.collection_date.clone())),
            (":taxCode", SqlValue::Text(self.tax_code.clone())),
        ])
    }
}

impl From<PaymentRecord> for PaymentMessage {
    fn from(record: PaymentRecord) -> Self {
        Self {
            taxpayer_id: record.taxpayer_id,
            amount: record.amount,
            collection_date: record.collection_date,
            tax_code: record.tax_code,
        }
    }
}

/// A value bound to a SQL named parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Real(f64),
}

/// Ordered set of `:name` → value bindings for one statement execution
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedParams(pub Vec<(&'static str, SqlValue)>);

impl NamedParams {
    /// Look up a parameter by its `:name`
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, SqlValue)> {
        self.0.iter()
    }
}
