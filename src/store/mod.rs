//! Storage adapter contract. Adapters persist opaque JSON documents per class and answer queries
//! written in their own dialect.

mod memory;
mod postgres;

pub use memory::{MemoryAdapter, MemoryDialect, MemoryQuery};
pub use postgres::{classbase_schema, ensure_database_exists, PostgresAdapter, PostgresDialect};

use crate::error::StoreError;
use crate::filter::QueryDialect;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document as returned by an adapter: its identifier in string form, kept apart
/// from the document so no field name is claimed by the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeRow {
    pub id: String,
    pub fields: Map<String, Value>,
}

pub type NativeId<A> = <<A as StorageAdapter>::Dialect as QueryDialect>::Id;
pub type NativeQuery<A> = <<A as StorageAdapter>::Dialect as QueryDialect>::Query;

/// Window over a result set. `limit == 0` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Page { offset, limit }
    }

    pub fn all() -> Self {
        Page::default()
    }

    /// Apply the window to an already ordered iterator.
    pub fn apply<T>(self, items: impl Iterator<Item = T>) -> Vec<T> {
        let items = items.skip(self.offset);
        if self.limit == 0 {
            items.collect()
        } else {
            items.take(self.limit).collect()
        }
    }
}

/// Uniform persistence surface over a backend. Results are ordered by identifier creation order.
///
/// `fields` is a projection over top-level document fields; an empty slice selects all of them.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    type Dialect: QueryDialect;

    fn dialect(&self) -> &Self::Dialect;

    async fn connect(&self) -> Result<(), StoreError>;
    async fn close(&self) -> Result<(), StoreError>;

    /// Create whatever backing structure a class needs. Idempotent.
    async fn ensure_class(&self, class: &str) -> Result<(), StoreError>;

    async fn get_object(
        &self,
        class: &str,
        id: &<Self::Dialect as QueryDialect>::Id,
        fields: &[String],
    ) -> Result<Option<NativeRow>, StoreError>;

    async fn get_objects(
        &self,
        class: &str,
        query: &<Self::Dialect as QueryDialect>::Query,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<NativeRow>, StoreError>;

    /// Insert one document and return its new identifier in string form.
    async fn create_object(&self, class: &str, data: &Map<String, Value>) -> Result<String, StoreError>;

    /// Insert documents in one batch; identifiers come back in input order.
    async fn create_objects(&self, class: &str, data: &[Map<String, Value>]) -> Result<Vec<String>, StoreError>;

    /// Merge `data` into the top level of one document. Returns the number of documents changed.
    async fn update_object(
        &self,
        class: &str,
        id: &<Self::Dialect as QueryDialect>::Id,
        data: &Map<String, Value>,
    ) -> Result<u64, StoreError>;

    async fn update_objects(
        &self,
        class: &str,
        query: &<Self::Dialect as QueryDialect>::Query,
        data: &Map<String, Value>,
    ) -> Result<u64, StoreError>;

    async fn delete_object(&self, class: &str, id: &<Self::Dialect as QueryDialect>::Id) -> Result<u64, StoreError>;

    async fn delete_objects(
        &self,
        class: &str,
        query: &<Self::Dialect as QueryDialect>::Query,
    ) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_applies_offset_and_limit() {
        assert_eq!(Page::new(1, 2).apply(0..5), vec![1, 2]);
        assert_eq!(Page::new(3, 0).apply(0..5), vec![3, 4]);
        assert_eq!(Page::all().apply(0..3), vec![0, 1, 2]);
    }
}
