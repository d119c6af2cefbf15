//! Transformation engine
//!
//! Business rules are selected by exact match on the record's tax code. Each
//! code maps to one rule; codes without a rule fall through to the identity
//! rule, so `apply` is total.
//!
//! New codes are added with [`TransformRegistry::register`].

use crate::types::PaymentRecord;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Tax code that receives the programmatic 5% reduction
pub const IMP_001: &str = "IMP_001";

/// Factor applied to `IMP_001` amounts
pub const IMP_001_FACTOR: f64 = 0.95;

type RuleFn = dyn Fn(PaymentRecord) -> PaymentRecord + Send + Sync;

/// A named transformation rule
#[derive(Clone)]
pub struct TransformRule {
    name: String,
    apply: Arc<RuleFn>,
}

impl TransformRule {
    /// Create a rule from a name (used in logs) and a pure function
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(PaymentRecord) -> PaymentRecord + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    /// Rule that leaves the record unchanged
    pub fn identity() -> Self {
        Self::new("default", |record| record)
    }

    /// Rule that multiplies the amount by `factor`
    pub fn scale_amount(name: impl Into<String>, factor: f64) -> Self {
        Self::new(name, move |mut record: PaymentRecord| {
            record.amount *= factor;
            record
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TransformRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Tax code → rule mapping with a guaranteed default entry
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    rules: HashMap<String, TransformRule>,
    default: TransformRule,
}

impl Default for TransformRegistry {
    /// The production rule set: `IMP_001` scaled by 0.95, everything else unchanged
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(IMP_001, TransformRule::scale_amount(IMP_001, IMP_001_FACTOR));
        registry
    }
}

impl TransformRegistry {
    /// A registry where every code takes the identity rule
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
            default: TransformRule::identity(),
        }
    }

    /// Add or replace the rule for `tax_code`
    pub fn register(&mut self, tax_code: impl Into<String>, rule: TransformRule) -> &mut Self {
        self.rules.insert(tax_code.into(), rule);
        self
    }

    /// Rule selected for `tax_code`
    pub fn rule_for(&self, tax_code: &str) -> &TransformRule {
        self.rules.get(tax_code).unwrap_or(&self.default)
    }

    /// Apply the rule selected by the record's tax code
    ///
    /// Logs the branch that fired together with the record id.
    pub fn apply(&self, record: PaymentRecord) -> PaymentRecord {
        let rule = self.rule_for(&record.tax_code);
        let transformed = (rule.apply)(record);

        info!(
            branch = rule.name(),
            id = %transformed.id,
            tax_code = %transformed.tax_code,
            amount = transformed.amount,
            "Processed payment"
        );

        transformed
    }
}
