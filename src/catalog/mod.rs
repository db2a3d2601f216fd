//! Remote product catalog abstraction.
//!
//! These are the four calls the scanning flow needs from the admin API. The
//! tag mutation takes the full desired tag set, not a delta, which is why
//! operations touching tags must be serialized by the dispatcher.

use std::{collections::BTreeSet, future::Future};

use crate::{product::ProductSnapshot, types::ProductId};

pub mod memory;

/// Errors reported by a [`Catalog`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// The referenced product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),
    /// The remote accepted the call but rejected its input.
    #[error("{}", .0.join("; "))]
    UserErrors(Vec<String>),
    /// The call never completed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result alias for catalog calls.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// One page of a cursor-paginated search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Remote product operations.
pub trait Catalog: Send + Sync + 'static {
    /// At most one product with a variant carrying `barcode`.
    fn search_by_barcode(
        &self,
        barcode: &str,
    ) -> impl Future<Output = CatalogResult<Option<ProductSnapshot>>> + Send;

    /// One page of products tagged `tag`, starting after `cursor`.
    fn search_by_tag_page(
        &self,
        tag: &str,
        cursor: Option<&str>,
        first: usize,
    ) -> impl Future<Output = CatalogResult<Page<ProductSnapshot>>> + Send;

    /// Replaces the product's whole tag set with `tags`.
    fn replace_tags(
        &self,
        product_id: &str,
        tags: &BTreeSet<String>,
    ) -> impl Future<Output = CatalogResult<()>> + Send;

    /// Fetches one product by id.
    fn fetch_product(
        &self,
        product_id: &str,
    ) -> impl Future<Output = CatalogResult<Option<ProductSnapshot>>> + Send;
}
