//! In-process [`Catalog`] used by tests and the demo driver.

use std::{
    collections::BTreeSet,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use hashbrown::HashMap;

use crate::product::ProductSnapshot;

use super::{Catalog, CatalogError, CatalogResult, Page};

/// Catalog call, as recorded in the call log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogCall {
    /// `search_by_barcode`.
    SearchByBarcode(String),
    /// `search_by_tag_page`.
    SearchByTag(String),
    /// `replace_tags`.
    ReplaceTags(String),
    /// `fetch_product`.
    FetchProduct(String),
}

/// Products held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: Mutex<Vec<ProductSnapshot>>,
    failures: Mutex<HashMap<CatalogCall, CatalogError>>,
    calls: Mutex<Vec<CatalogCall>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryCatalog {
    /// Catalog holding `products`.
    pub fn new(products: Vec<ProductSnapshot>) -> Self {
        Self {
            products: Mutex::new(products),
            ..Self::default()
        }
    }

    /// Loads a JSON array of products.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every matching call fail with `err` until cleared.
    pub fn fail_on(&self, call: CatalogCall, err: CatalogError) {
        lock(&self.failures).insert(call, err);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Calls seen so far, in order.
    pub fn calls(&self) -> Vec<CatalogCall> {
        lock(&self.calls).clone()
    }

    /// Highest number of calls ever running at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Current copy of a product.
    pub fn product(&self, product_id: &str) -> Option<ProductSnapshot> {
        lock(&self.products)
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
    }

    async fn enter(&self, call: CatalogCall) -> CatalogResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        lock(&self.calls).push(call.clone());
        let injected = lock(&self.failures).get(&call).cloned();
        match injected {
            Some(err) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn tag_page(
        &self,
        tag: &str,
        cursor: Option<&str>,
        first: usize,
    ) -> CatalogResult<Page<ProductSnapshot>> {
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| CatalogError::Malformed(format!("bad cursor {c:?}")))?,
            None => 0,
        };
        let matching: Vec<ProductSnapshot> = lock(&self.products)
            .iter()
            .filter(|p| p.has_tag(tag))
            .cloned()
            .collect();
        let end = start.saturating_add(first.max(1)).min(matching.len());
        let items = matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_cursor = (end < matching.len()).then(|| end.to_string());
        Ok(Page { items, next_cursor })
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Catalog for InMemoryCatalog {
    async fn search_by_barcode(&self, barcode: &str) -> CatalogResult<Option<ProductSnapshot>> {
        self.enter(CatalogCall::SearchByBarcode(barcode.to_string()))
            .await?;
        let found = lock(&self.products)
            .iter()
            .find(|p| p.variant_by_barcode(barcode).is_some())
            .cloned();
        self.leave();
        Ok(found)
    }

    async fn search_by_tag_page(
        &self,
        tag: &str,
        cursor: Option<&str>,
        first: usize,
    ) -> CatalogResult<Page<ProductSnapshot>> {
        self.enter(CatalogCall::SearchByTag(tag.to_string())).await?;
        let result = self.tag_page(tag, cursor, first);
        self.leave();
        result
    }

    async fn replace_tags(&self, product_id: &str, tags: &BTreeSet<String>) -> CatalogResult<()> {
        self.enter(CatalogCall::ReplaceTags(product_id.to_string()))
            .await?;
        let result = if tags.iter().any(|t| t.trim().is_empty()) {
            Err(CatalogError::UserErrors(vec![
                "Tags cannot be blank".to_string(),
            ]))
        } else {
            let mut products = lock(&self.products);
            match products.iter_mut().find(|p| p.id == product_id) {
                Some(p) => {
                    p.tags = tags.clone();
                    Ok(())
                }
                None => Err(CatalogError::ProductNotFound(product_id.to_string())),
            }
        };
        self.leave();
        result
    }

    async fn fetch_product(&self, product_id: &str) -> CatalogResult<Option<ProductSnapshot>> {
        self.enter(CatalogCall::FetchProduct(product_id.to_string()))
            .await?;
        let found = self.product(product_id);
        self.leave();
        Ok(found)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
