//! Runs one operation against a [`Catalog`] and folds every outcome,
//! including remote failures, into a [`ResultRecord`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    catalog::{Catalog, CatalogError, CatalogResult},
    op::{OpRequest, Operation},
    product::ProductSnapshot,
    record::ResultRecord,
    types::{FailureKind, OpSeq},
};

#[derive(Debug, Clone, Copy)]
enum TagChange {
    Add,
    Remove,
}

/// Executes `op`. Never fails: errors become `success: false` records.
pub async fn execute<C: Catalog>(catalog: &C, op: &Operation, now: DateTime<Utc>) -> ResultRecord {
    let seq = op.seq;
    let outcome = match &op.request {
        OpRequest::SearchAndTag { barcode, tag } => {
            search_and_tag(catalog, seq, barcode, tag.as_deref(), now).await
        }
        OpRequest::DeleteTag { product_id, tag } => {
            retag(catalog, seq, product_id, tag, TagChange::Remove, now).await
        }
        OpRequest::AddTag { product_id, tag } => {
            retag(catalog, seq, product_id, tag, TagChange::Add, now).await
        }
        OpRequest::Refresh { product_id } => refresh(catalog, seq, product_id, now).await,
    };

    let mut record = outcome.unwrap_or_else(|err| {
        warn!(seq, kind = ?op.kind(), error = %err, "operation failed");
        ResultRecord::failure(
            seq,
            failure_kind(&err),
            err.to_string(),
            op.request.tag().map(str::to_string),
            now,
        )
    });
    for product in &mut record.products {
        product.reclassify_expirations(now);
    }
    record
}

/// Walks every page of a tag search.
pub async fn collect_tagged<C: Catalog>(
    catalog: &C,
    tag: &str,
    page_size: usize,
) -> CatalogResult<Vec<ProductSnapshot>> {
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = catalog
            .search_by_tag_page(tag, cursor.as_deref(), page_size)
            .await?;
        out.extend(page.items);
        match page.next_cursor {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(CatalogError::Malformed(format!(
                    "cursor {next:?} did not advance"
                )));
            }
            Some(next) => cursor = Some(next),
            None => return Ok(out),
        }
    }
}

async fn search_and_tag<C: Catalog>(
    catalog: &C,
    seq: OpSeq,
    barcode: &str,
    tag: Option<&str>,
    now: DateTime<Utc>,
) -> CatalogResult<ResultRecord> {
    let Some(product) = catalog.search_by_barcode(barcode).await? else {
        debug!(seq, barcode, "no product for barcode");
        return Ok(ResultRecord::not_found(
            seq,
            barcode,
            tag.map(str::to_string),
            now,
        ));
    };

    let Some(tag) = tag else {
        return Ok(ResultRecord::success(seq, vec![product], None, now));
    };

    if !product.has_tag(tag) {
        apply_change(catalog, &product, tag, TagChange::Add).await?;
    }
    let refreshed = fetch_required(catalog, &product.id).await?;
    Ok(ResultRecord::success(
        seq,
        vec![refreshed],
        Some(tag.to_string()),
        now,
    ))
}

async fn retag<C: Catalog>(
    catalog: &C,
    seq: OpSeq,
    product_id: &str,
    tag: &str,
    change: TagChange,
    now: DateTime<Utc>,
) -> CatalogResult<ResultRecord> {
    let product = fetch_required(catalog, product_id).await?;
    apply_change(catalog, &product, tag, change).await?;
    let refreshed = fetch_required(catalog, product_id).await?;
    Ok(ResultRecord::success(
        seq,
        vec![refreshed],
        Some(tag.to_string()),
        now,
    ))
}

async fn refresh<C: Catalog>(
    catalog: &C,
    seq: OpSeq,
    product_id: &str,
    now: DateTime<Utc>,
) -> CatalogResult<ResultRecord> {
    let product = fetch_required(catalog, product_id).await?;
    Ok(ResultRecord::success(seq, vec![product], None, now))
}

// The remote takes the whole tag list, so the new set is computed from the
// snapshot just read.
async fn apply_change<C: Catalog>(
    catalog: &C,
    product: &ProductSnapshot,
    tag: &str,
    change: TagChange,
) -> CatalogResult<()> {
    let mut tags: BTreeSet<String> = product.tags.clone();
    let changed = match change {
        TagChange::Add => tags.insert(tag.to_string()),
        TagChange::Remove => tags.remove(tag),
    };
    if !changed {
        debug!(product = %product.id, tag, ?change, "tag set already as requested");
        return Ok(());
    }
    catalog.replace_tags(&product.id, &tags).await
}

async fn fetch_required<C: Catalog>(catalog: &C, product_id: &str) -> CatalogResult<ProductSnapshot> {
    catalog
        .fetch_product(product_id)
        .await?
        .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))
}

fn failure_kind(err: &CatalogError) -> FailureKind {
    match err {
        CatalogError::ProductNotFound(_) => FailureKind::NotFound,
        _ => FailureKind::RemoteError,
    }
}
