//! PostgreSQL document store.
//!
//! Documents are JSONB rows in the shared `documents` table. Equality
//! filters compare JSON values, so `"published"` matches only the string
//! and `true` matches only the boolean.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, NullOrdering, OnConflict, SimpleExpr};
use sea_orm::{
    ColumnTrait, DbConn, DbErr, EntityTrait, Order, QueryFilter, QueryOrder, Select, Set, SqlErr,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use quill_core::StoreError;
use quill_core::ports::{DocumentAddress, DocumentQuery, DocumentStore, FieldFilter, SortDirection};

use super::entity::document::{self, Entity as DocumentEntity};

pub struct PostgresDocumentStore<T> {
    db: DbConn,
    container: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PostgresDocumentStore<T> {
    pub fn new(db: DbConn, container: &'static str) -> Self {
        Self {
            db,
            container,
            _marker: PhantomData,
        }
    }

    pub fn container(&self) -> &'static str {
        self.container
    }

    pub(super) fn select(&self, query: &DocumentQuery) -> Select<DocumentEntity> {
        let mut select =
            DocumentEntity::find().filter(document::Column::Container.eq(self.container));

        for filter in &query.filters {
            select = select.filter(field_filter(filter));
        }
        for order in &query.order_by {
            let expr = order_expr(order.field);
            select = match order.direction {
                SortDirection::Asc => select.order_by_with_nulls(expr, Order::Asc, NullOrdering::First),
                SortDirection::Desc => {
                    select.order_by_with_nulls(expr, Order::Desc, NullOrdering::Last)
                }
            };
        }
        select
    }

    /// Rows whose partition key differs from their id. Point operations that
    /// assume id partitioning cannot reach these.
    pub async fn diverged_addresses(&self) -> Result<Vec<DocumentAddress>, StoreError> {
        let rows = DocumentEntity::find()
            .filter(document::Column::Container.eq(self.container))
            .filter(Expr::col(document::Column::PartitionKey).ne(Expr::col(document::Column::Id)))
            .order_by_asc(document::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentAddress::new(row.id, row.partition_key))
            .collect())
    }

    fn primary_key(&self, address: &DocumentAddress) -> (String, String, String) {
        (
            self.container.to_string(),
            address.partition_key.clone(),
            address.id.clone(),
        )
    }
}

fn field_filter(filter: &FieldFilter) -> SimpleExpr {
    match filter {
        FieldFilter::Eq(field, value) => Expr::cust_with_values(
            "body -> ? = ?::jsonb",
            [field.to_string(), value.to_string()],
        ),
        FieldFilter::Missing(field) => Expr::cust_with_values(
            "coalesce(body -> ?, 'null'::jsonb) = 'null'::jsonb",
            [field.to_string()],
        ),
    }
}

/// Sort key for a top-level field. Timestamps are compared as instants, since
/// RFC 3339 text with varying fractional digits does not sort chronologically.
fn order_expr(field: &str) -> SimpleExpr {
    if field.ends_with("At") {
        Expr::cust_with_values("(body ->> ?)::timestamptz", [field.to_string()])
    } else {
        Expr::cust_with_values("body -> ?", [field.to_string()])
    }
}

fn map_db_err(err: DbErr) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
        return StoreError::Conflict(msg);
    }
    match err {
        DbErr::Conn(e) => StoreError::Unavailable(e.to_string()),
        DbErr::ConnectionAcquire(e) => StoreError::Unavailable(e.to_string()),
        other => {
            let msg = other.to_string();
            if msg.contains("permission denied") {
                StoreError::AccessDenied(msg)
            } else {
                StoreError::Backend(msg)
            }
        }
    }
}

#[async_trait]
impl<T> DocumentStore<T> for PostgresDocumentStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<T>, StoreError> {
        let rows = self
            .select(query)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;
        tracing::debug!(container = self.container, rows = rows.len(), "Document query");

        rows.into_iter()
            .map(|row| serde_json::from_value(row.body).map_err(StoreError::from))
            .collect()
    }

    async fn read(&self, address: &DocumentAddress) -> Result<Option<T>, StoreError> {
        let row = DocumentEntity::find_by_id(self.primary_key(address))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        row.map(|row| serde_json::from_value(row.body).map_err(StoreError::from))
            .transpose()
    }

    async fn upsert(&self, address: &DocumentAddress, document: &T) -> Result<T, StoreError> {
        let body = serde_json::to_value(document)?;
        let model = document::ActiveModel {
            container: Set(self.container.to_string()),
            partition_key: Set(address.partition_key.clone()),
            id: Set(address.id.clone()),
            body: Set(body.clone()),
            updated_at: Set(Utc::now().into()),
        };

        DocumentEntity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    document::Column::Container,
                    document::Column::PartitionKey,
                    document::Column::Id,
                ])
                .update_columns([document::Column::Body, document::Column::UpdatedAt])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(serde_json::from_value(body)?)
    }

    async fn delete(&self, address: &DocumentAddress) -> Result<(), StoreError> {
        let result = DocumentEntity::delete_by_id(self.primary_key(address))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
