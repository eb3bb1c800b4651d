//! Document store port.
//!
//! Documents live in containers and are addressed by `(id, partition_key)`.
//! Point operations require both halves of the address. Queries run across
//! partitions and support equality filters plus ordering on top-level fields.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Full address of a document inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentAddress {
    pub id: String,
    pub partition_key: String,
}

impl DocumentAddress {
    pub fn new(id: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key: partition_key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Field equals the given JSON value.
    Eq(&'static str, Value),
    /// Field is absent or null.
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: &'static str,
    pub direction: SortDirection,
}

/// Cross-partition query. Field names are the serialized (camelCase) names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub filters: Vec<FieldFilter>,
    pub order_by: Vec<OrderBy>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter::Eq(field, value.into()));
        self
    }

    pub fn missing(mut self, field: &'static str) -> Self {
        self.filters.push(FieldFilter::Missing(field));
        self
    }

    pub fn order_asc(mut self, field: &'static str) -> Self {
        self.order_by.push(OrderBy {
            field,
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn order_desc(mut self, field: &'static str) -> Self {
        self.order_by.push(OrderBy {
            field,
            direction: SortDirection::Desc,
        });
        self
    }
}

/// A container of JSON documents of one type.
#[async_trait]
pub trait DocumentStore<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Run a cross-partition query.
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<T>, StoreError>;

    /// Point read. `Ok(None)` when nothing lives at the address.
    async fn read(&self, address: &DocumentAddress) -> Result<Option<T>, StoreError>;

    /// Create or replace the document at the address.
    async fn upsert(&self, address: &DocumentAddress, document: &T) -> Result<T, StoreError>;

    /// Delete the document at the address. `StoreError::NotFound` when absent.
    async fn delete(&self, address: &DocumentAddress) -> Result<(), StoreError>;
}
