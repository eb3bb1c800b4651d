//! JSON-backed store used by the service tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::ports::{
    DocumentAddress, DocumentQuery, DocumentStore, FieldFilter, SortDirection,
};

pub(crate) struct FakeStore<T> {
    docs: Mutex<HashMap<DocumentAddress, Value>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for FakeStore<T> {
    fn default() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<T> FakeStore<T> {
    pub(crate) fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }
}

fn rank(v: Option<&Value>) -> (u8, Option<&Value>) {
    match v {
        None | Some(Value::Null) => (0, None),
        other => (1, other),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, a) = rank(a);
    let (rb, b) = rank(b);
    ra.cmp(&rb).then_with(|| match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

#[async_trait]
impl<T> DocumentStore<T> for FakeStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<T>, StoreError> {
        let mut matches: Vec<Value> = {
            let docs = self.docs.lock().unwrap();
            docs.values()
                .filter(|doc| {
                    query.filters.iter().all(|f| match f {
                        FieldFilter::Eq(field, value) => doc.get(*field) == Some(value),
                        FieldFilter::Missing(field) => {
                            matches!(doc.get(*field), None | Some(Value::Null))
                        }
                    })
                })
                .cloned()
                .collect()
        };
        matches.sort_by(|a, b| {
            query.order_by.iter().fold(Ordering::Equal, |acc, o| {
                acc.then_with(|| {
                    let ord = compare(a.get(o.field), b.get(o.field));
                    match o.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                })
            })
        });
        matches
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    async fn read(&self, address: &DocumentAddress) -> Result<Option<T>, StoreError> {
        let doc = self.docs.lock().unwrap().get(address).cloned();
        doc.map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .transpose()
    }

    async fn upsert(&self, address: &DocumentAddress, document: &T) -> Result<T, StoreError> {
        let value = serde_json::to_value(document)?;
        self.docs
            .lock()
            .unwrap()
            .insert(address.clone(), value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete(&self, address: &DocumentAddress) -> Result<(), StoreError> {
        self.docs
            .lock()
            .unwrap()
            .remove(address)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
