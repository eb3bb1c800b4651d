//! In-memory document store - used for development and tests.
//!
//! Documents are kept as JSON so filters and ordering see the same
//! field names as the Postgres store. Data is lost on process restart.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

use quill_core::StoreError;
use quill_core::ports::{DocumentAddress, DocumentQuery, DocumentStore, FieldFilter, SortDirection};

pub struct InMemoryDocumentStore<T> {
    container: &'static str,
    docs: RwLock<HashMap<DocumentAddress, Value>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InMemoryDocumentStore<T> {
    pub fn new(container: &'static str) -> Self {
        Self {
            container,
            docs: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }

    pub fn container(&self) -> &'static str {
        self.container
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Addresses whose partition key differs from the id, ordered by id.
    pub async fn diverged_addresses(&self) -> Result<Vec<DocumentAddress>, StoreError> {
        let mut diverged: Vec<DocumentAddress> = self
            .docs
            .read()
            .await
            .keys()
            .filter(|address| address.partition_key != address.id)
            .cloned()
            .collect();
        diverged.sort();
        Ok(diverged)
    }
}

fn matches(doc: &Value, filter: &FieldFilter) -> bool {
    match filter {
        FieldFilter::Eq(field, value) => doc.get(*field) == Some(value),
        FieldFilter::Missing(field) => matches!(doc.get(*field), None | Some(Value::Null)),
    }
}

/// Missing and null sort lowest. Timestamps compare as instants, not text.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => Ordering::Equal,
    }
}

fn compare_docs(a: &Value, b: &Value, query: &DocumentQuery) -> Ordering {
    query.order_by.iter().fold(Ordering::Equal, |acc, order| {
        acc.then_with(|| {
            let ord = compare_fields(a.get(order.field), b.get(order.field));
            match order.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        })
    })
}

#[async_trait]
impl<T> DocumentStore<T> for InMemoryDocumentStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<T>, StoreError> {
        let mut found: Vec<Value> = {
            let docs = self.docs.read().await;
            docs.values()
                .filter(|doc| query.filters.iter().all(|f| matches(doc, f)))
                .cloned()
                .collect()
        };
        found.sort_by(|a, b| compare_docs(a, b, query));

        found
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    async fn read(&self, address: &DocumentAddress) -> Result<Option<T>, StoreError> {
        let doc = self.docs.read().await.get(address).cloned();
        doc.map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .transpose()
    }

    async fn upsert(&self, address: &DocumentAddress, document: &T) -> Result<T, StoreError> {
        let value = serde_json::to_value(document)?;
        self.docs
            .write()
            .await
            .insert(address.clone(), value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete(&self, address: &DocumentAddress) -> Result<(), StoreError> {
        match self.docs.write().await.remove(address) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }
}
