//! Product, variant, and expiration-batch snapshots.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    expiration,
    types::{ProductId, Severity, VariantId},
};

/// One dated batch of a variant's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationBatch {
    /// Expiration timestamp.
    pub date: DateTime<Utc>,
    /// Whole days until `date`, relative to the last classification.
    pub days_until_expiration: i64,
    /// Bucket for `days_until_expiration`.
    pub severity: Severity,
}

impl ExpirationBatch {
    /// Classifies `date` relative to `now`.
    pub fn new(date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let (days_until_expiration, severity) = expiration::classify(date, now);
        Self {
            date,
            days_until_expiration,
            severity,
        }
    }

    /// Display label, e.g. `"expired 3 days ago"`.
    pub fn label(&self) -> String {
        expiration::describe(self.days_until_expiration)
    }
}

/// Point-in-time view of one product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    /// Variant id.
    pub id: VariantId,
    /// Variant title.
    pub title: String,
    /// Barcode, if set.
    pub barcode: Option<String>,
    /// SKU, if set.
    pub sku: Option<String>,
    /// Available quantity across locations.
    pub inventory_quantity: i64,
    /// Dated batches, soonest first.
    #[serde(default)]
    pub expiration_batches: Vec<ExpirationBatch>,
}

/// Point-in-time view of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product id.
    pub id: ProductId,
    /// Product title.
    pub title: String,
    /// Current tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Inventory summed across variants.
    pub total_inventory: i64,
    /// Variants in display order.
    #[serde(default)]
    pub variants: Vec<VariantSnapshot>,
}

impl ProductSnapshot {
    /// Placeholder row for a barcode nothing matched.
    pub fn unmatched_barcode(barcode: &str) -> Self {
        Self {
            id: ProductId::new(),
            title: barcode.to_string(),
            tags: BTreeSet::new(),
            total_inventory: 0,
            variants: vec![VariantSnapshot {
                id: VariantId::new(),
                title: barcode.to_string(),
                barcode: Some(barcode.to_string()),
                sku: None,
                inventory_quantity: 0,
                expiration_batches: Vec::new(),
            }],
        }
    }

    /// Returns true when the product carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Finds the variant with this barcode.
    pub fn variant_by_barcode(&self, barcode: &str) -> Option<&VariantSnapshot> {
        self.variants
            .iter()
            .find(|v| v.barcode.as_deref() == Some(barcode))
    }

    /// Recomputes day counts and buckets of every batch relative to `now`,
    /// keeping each variant's batches sorted soonest first.
    pub fn reclassify_expirations(&mut self, now: DateTime<Utc>) {
        for variant in &mut self.variants {
            for batch in &mut variant.expiration_batches {
                *batch = ExpirationBatch::new(batch.date, now);
            }
            variant.expiration_batches.sort_by_key(|b| b.date);
        }
    }

    /// Worst bucket over all batches, if the product has any.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.variants
            .iter()
            .flat_map(|v| v.expiration_batches.iter())
            .map(|b| b.severity)
            .min_by_key(|s| match s {
                Severity::Expired => 0,
                Severity::ExpiringSoon => 1,
                Severity::Normal => 2,
            })
    }
}
