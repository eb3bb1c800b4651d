//! Slug resolution and document addressing.
//!
//! Posts and pages are looked up by slug but stored under `(id, id)`. Slug
//! uniqueness is checked before create and never enforced by the store, so the
//! resolver has to cope with historical duplicates: it picks one record and
//! reports the rest instead of failing the request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{DomainError, StoreError};
use crate::ports::{DocumentAddress, DocumentQuery, DocumentStore};

/// A document addressed by slug.
pub trait Slugged: Clone + Send + Sync + 'static {
    /// Entity name used in errors and diagnostics.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn slug(&self) -> &str;
    fn published_at(&self) -> Option<DateTime<Utc>>;
    fn created_at(&self) -> DateTime<Utc>;
}

/// Storage address of a slugged document. The partition key is the id.
pub fn address_for<T: Slugged>(doc: &T) -> DocumentAddress {
    address_for_id(doc.id())
}

/// Address of a document partitioned by its own id, when only the id is at hand.
pub fn address_for_id(id: &str) -> DocumentAddress {
    DocumentAddress::new(id, id)
}

/// Several stored documents share one slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSlug {
    pub kind: &'static str,
    pub slug: String,
    /// The record reads resolve to.
    pub chosen_id: String,
    /// Records no slug lookup will ever return.
    pub shadowed_ids: Vec<String>,
}

/// Outcome of [`IdentityResolver::remove_shadowed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowCleanup {
    pub removed: usize,
    /// Shadowed ids with nothing stored at their `(id, id)` address. Either
    /// already deleted, or stored under a partition key that is not the id.
    pub missing: Vec<String>,
}

/// Receives the duplicate-slug diagnostic raised on reads.
pub trait DuplicateSlugObserver: Send + Sync {
    fn on_duplicate(&self, duplicate: &DuplicateSlug);
}

/// Reports duplicates as warning events for out-of-band cleanup.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDuplicateObserver;

impl DuplicateSlugObserver for TracingDuplicateObserver {
    fn on_duplicate(&self, duplicate: &DuplicateSlug) {
        tracing::warn!(
            target: "quill::duplicate_slug",
            kind = duplicate.kind,
            slug = %duplicate.slug,
            chosen_id = %duplicate.chosen_id,
            shadowed_ids = ?duplicate.shadowed_ids,
            "Duplicate slug detected, serving most recently published record"
        );
    }
}

/// Newest publication first; unpublished after published; then newest creation.
fn rank<T: Slugged>(doc: &T) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
    (doc.published_at(), doc.created_at())
}

fn sort_authoritative_first<T: Slugged>(docs: &mut [T]) {
    docs.sort_by(|a, b| rank(b).cmp(&rank(a)));
}

/// Resolves slugs to documents and addresses documents for mutation.
pub struct IdentityResolver<T: Slugged> {
    store: Arc<dyn DocumentStore<T>>,
    observer: Arc<dyn DuplicateSlugObserver>,
}

impl<T: Slugged> Clone for IdentityResolver<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<T: Slugged> IdentityResolver<T> {
    pub fn new(store: Arc<dyn DocumentStore<T>>) -> Self {
        Self {
            store,
            observer: Arc::new(TracingDuplicateObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DuplicateSlugObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore<T>> {
        &self.store
    }

    /// Return the authoritative document for `slug`.
    ///
    /// With several matches the most recently published one wins and exactly
    /// one duplicate diagnostic is emitted. Reads never write.
    pub async fn resolve_by_slug(&self, slug: &str) -> Result<T, DomainError> {
        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found(T::KIND, slug))
    }

    /// Like [`resolve_by_slug`](Self::resolve_by_slug) but absence is `Ok(None)`.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<T>, DomainError> {
        let query = DocumentQuery::new()
            .eq("slug", slug)
            .order_desc("publishedAt");
        let mut matches = self
            .store
            .query(&query)
            .await
            .map_err(|e| DomainError::from_store(e, T::KIND, slug))?;

        if matches.len() <= 1 {
            return Ok(matches.pop());
        }

        sort_authoritative_first(&mut matches);
        let chosen = matches.remove(0);
        self.observer.on_duplicate(&DuplicateSlug {
            kind: T::KIND,
            slug: slug.to_string(),
            chosen_id: chosen.id().to_string(),
            shadowed_ids: matches.iter().map(|d| d.id().to_string()).collect(),
        });
        Ok(Some(chosen))
    }

    /// Store `doc` unless its slug is already taken.
    ///
    /// The check and the write are separate store calls; two concurrent
    /// creates with the same slug can both succeed.
    pub async fn create_unique(&self, doc: T) -> Result<T, DomainError> {
        if let Some(existing) = self.find_by_slug(doc.slug()).await? {
            tracing::debug!(
                kind = T::KIND,
                slug = %doc.slug(),
                existing_id = %existing.id(),
                "Rejected create, slug taken"
            );
            return Err(DomainError::Conflict {
                entity_type: T::KIND,
                slug: doc.slug().to_string(),
            });
        }

        let created = self
            .store
            .upsert(&address_for(&doc), &doc)
            .await
            .map_err(|e| DomainError::from_store(e, T::KIND, doc.slug()))?;
        tracing::info!(kind = T::KIND, id = %created.id(), slug = %created.slug(), "Document created");
        Ok(created)
    }

    /// Replace a previously resolved document in place.
    pub async fn replace(&self, doc: &T) -> Result<T, DomainError> {
        self.store
            .upsert(&address_for(doc), doc)
            .await
            .map_err(|e| DomainError::from_store(e, T::KIND, doc.slug()))
    }

    /// Delete a previously resolved document.
    pub async fn delete(&self, doc: &T) -> Result<(), DomainError> {
        self.store
            .delete(&address_for(doc))
            .await
            .map_err(|e| DomainError::from_store(e, T::KIND, doc.slug()))?;
        tracing::info!(kind = T::KIND, id = %doc.id(), slug = %doc.slug(), "Document deleted");
        Ok(())
    }

    pub async fn list(&self, query: &DocumentQuery) -> Result<Vec<T>, DomainError> {
        self.store
            .query(query)
            .await
            .map_err(|e| DomainError::from_store(e, T::KIND, ""))
    }

    /// Scan the whole container for slugs held by more than one document.
    pub async fn find_duplicates(&self) -> Result<Vec<DuplicateSlug>, DomainError> {
        let all = self.list(&DocumentQuery::new()).await?;

        let mut by_slug: BTreeMap<String, Vec<T>> = BTreeMap::new();
        for doc in all {
            by_slug.entry(doc.slug().to_string()).or_default().push(doc);
        }

        Ok(by_slug
            .into_iter()
            .filter(|(_, docs)| docs.len() > 1)
            .map(|(slug, mut docs)| {
                sort_authoritative_first(&mut docs);
                DuplicateSlug {
                    kind: T::KIND,
                    slug,
                    chosen_id: docs[0].id().to_string(),
                    shadowed_ids: docs[1..].iter().map(|d| d.id().to_string()).collect(),
                }
            })
            .collect())
    }

    /// Delete the shadowed records of a duplicate.
    ///
    /// Records not found at their address are reported, not treated as errors,
    /// so a cleanup can be re-run.
    pub async fn remove_shadowed(&self, duplicate: &DuplicateSlug) -> Result<ShadowCleanup, DomainError> {
        let mut cleanup = ShadowCleanup::default();
        for id in &duplicate.shadowed_ids {
            match self.store.delete(&address_for_id(id)).await {
                Ok(()) => cleanup.removed += 1,
                Err(StoreError::NotFound) => cleanup.missing.push(id.clone()),
                Err(e) => return Err(DomainError::from_store(e, T::KIND, &duplicate.slug)),
            }
        }

        if cleanup.removed > 0 {
            tracing::info!(
                kind = duplicate.kind,
                slug = %duplicate.slug,
                kept = %duplicate.chosen_id,
                removed = cleanup.removed,
                "Removed shadowed duplicates"
            );
        }
        if !cleanup.missing.is_empty() {
            tracing::warn!(
                kind = duplicate.kind,
                slug = %duplicate.slug,
                missing_ids = ?cleanup.missing,
                "Shadowed duplicates not found at their address, left in place"
            );
        }
        Ok(cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Author, Post, PostDraft, PublishStatus};
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ports::FieldFilter;

    /// Vec-backed store that only understands `slug` equality filters.
    #[derive(Default)]
    struct FakeStore {
        docs: Mutex<Vec<(DocumentAddress, Post)>>,
        writes: AtomicUsize,
        unavailable: bool,
    }

    impl FakeStore {
        fn seeded(posts: Vec<Post>) -> Self {
            let docs = posts
                .into_iter()
                .map(|p| (address_for(&p), p))
                .collect();
            Self {
                docs: Mutex::new(docs),
                ..Default::default()
            }
        }

        fn len(&self) -> usize {
            self.docs.lock().unwrap().len()
        }

        fn insert_at(&self, address: DocumentAddress, post: Post) {
            self.docs.lock().unwrap().push((address, post));
        }
    }

    #[async_trait]
    impl DocumentStore<Post> for FakeStore {
        async fn query(&self, query: &DocumentQuery) -> Result<Vec<Post>, StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("timeout".into()));
            }
            let docs = self.docs.lock().unwrap();
            Ok(docs
                .iter()
                .map(|(_, p)| p)
                .filter(|p| {
                    query.filters.iter().all(|f| match f {
                        FieldFilter::Eq("slug", Value::String(s)) => &p.slug == s,
                        _ => true,
                    })
                })
                .cloned()
                .collect())
        }

        async fn read(&self, address: &DocumentAddress) -> Result<Option<Post>, StoreError> {
            let docs = self.docs.lock().unwrap();
            Ok(docs
                .iter()
                .find(|(a, _)| a == address)
                .map(|(_, p)| p.clone()))
        }

        async fn upsert(&self, address: &DocumentAddress, document: &Post) -> Result<Post, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().unwrap();
            docs.retain(|(a, _)| a != address);
            docs.push((address.clone(), document.clone()));
            Ok(document.clone())
        }

        async fn delete(&self, address: &DocumentAddress) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().unwrap();
            let before = docs.len();
            docs.retain(|(a, _)| a != address);
            if docs.len() == before {
                Err(StoreError::NotFound)
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        seen: Mutex<Vec<DuplicateSlug>>,
    }

    impl DuplicateSlugObserver for CountingObserver {
        fn on_duplicate(&self, duplicate: &DuplicateSlug) {
            self.seen.lock().unwrap().push(duplicate.clone());
        }
    }

    fn post(slug: &str, published_at: Option<DateTime<Utc>>) -> Post {
        let mut post = Post::new(
            PostDraft {
                slug: slug.into(),
                title: slug.into(),
                content: "body".into(),
                ..Default::default()
            },
            Author {
                id: "u1".into(),
                name: "Writer".into(),
                email: "writer@example.com".into(),
            },
            Utc::now(),
        );
        if let Some(at) = published_at {
            post.status = PublishStatus::Published;
            post.published_at = Some(at);
        }
        post
    }

    fn resolver(store: Arc<FakeStore>) -> (IdentityResolver<Post>, Arc<CountingObserver>) {
        let observer = Arc::new(CountingObserver::default());
        let resolver = IdentityResolver::new(store).with_observer(observer.clone());
        (resolver, observer)
    }

    #[tokio::test]
    async fn test_single_match_is_returned() {
        let only = post("hello", Some(Utc::now()));
        let store = Arc::new(FakeStore::seeded(vec![only.clone(), post("other", None)]));
        let (resolver, observer) = resolver(store);

        let found = resolver.resolve_by_slug("hello").await.unwrap();

        assert_eq!(found.id, only.id);
        assert!(observer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_match_is_not_found() {
        let store = Arc::new(FakeStore::seeded(vec![post("other", None)]));
        let (resolver, _) = resolver(store);

        let err = resolver.resolve_by_slug("missing").await.unwrap_err();

        assert!(matches!(err, DomainError::NotFound { entity_type: "post", .. }));
        assert!(resolver.find_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicates_resolve_to_latest_published() {
        let base = Utc::now();
        let older = post("dup", Some(base - TimeDelta::days(3)));
        let newest = post("dup", Some(base));
        let middle = post("dup", Some(base - TimeDelta::days(1)));
        let store = Arc::new(FakeStore::seeded(vec![
            older.clone(),
            newest.clone(),
            middle.clone(),
        ]));
        let (resolver, observer) = resolver(store.clone());

        let found = resolver.resolve_by_slug("dup").await.unwrap();

        assert_eq!(found.id, newest.id);
        let seen = observer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].chosen_id, newest.id);
        assert_eq!(seen[0].shadowed_ids, vec![middle.id.clone(), older.id.clone()]);
        // Reads must not touch the store.
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_unpublished_duplicate_ranks_below_published() {
        let published = post("dup", Some(Utc::now() - TimeDelta::days(30)));
        let draft = post("dup", None);
        let store = Arc::new(FakeStore::seeded(vec![draft, published.clone()]));
        let (resolver, _) = resolver(store);

        let found = resolver.resolve_by_slug("dup").await.unwrap();

        assert_eq!(found.id, published.id);
    }

    #[test]
    fn test_address_uses_id_twice() {
        let p = post("some-slug", None);
        let address = address_for(&p);

        assert_eq!(address.id, p.id);
        assert_eq!(address.partition_key, p.id);
        assert_ne!(address.partition_key, p.slug);
    }

    #[tokio::test]
    async fn test_second_create_with_same_slug_conflicts() {
        let store = Arc::new(FakeStore::default());
        let (resolver, _) = resolver(store.clone());

        resolver.create_unique(post("fresh", None)).await.unwrap();
        let err = resolver.create_unique(post("fresh", None)).await.unwrap_err();

        assert!(matches!(err, DomainError::Conflict { ref slug, .. } if slug == "fresh"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_created_document_lands_at_its_address() {
        let store = Arc::new(FakeStore::default());
        let (resolver, _) = resolver(store.clone());

        let created = resolver.create_unique(post("addr", None)).await.unwrap();
        let read = store.read(&address_for(&created)).await.unwrap();

        assert_eq!(read.map(|p| p.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_storage_failure_is_retryable() {
        let store = Arc::new(FakeStore {
            unavailable: true,
            ..Default::default()
        });
        let (resolver, _) = resolver(store);

        let err = resolver.resolve_by_slug("any").await.unwrap_err();

        assert!(matches!(err, DomainError::StorageUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_find_and_remove_duplicates() {
        let base = Utc::now();
        let keep = post("dup", Some(base));
        let drop = post("dup", Some(base - TimeDelta::hours(1)));
        let store = Arc::new(FakeStore::seeded(vec![
            drop.clone(),
            keep.clone(),
            post("unique", None),
        ]));
        let (resolver, _) = resolver(store.clone());

        let duplicates = resolver.find_duplicates().await.unwrap();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].chosen_id, keep.id);
        assert_eq!(duplicates[0].shadowed_ids, vec![drop.id.clone()]);

        let cleanup = resolver.remove_shadowed(&duplicates[0]).await.unwrap();
        assert_eq!(cleanup.removed, 1);
        assert!(cleanup.missing.is_empty());
        assert_eq!(store.len(), 2);

        // Re-running is harmless and reports what it could not find.
        let rerun = resolver.remove_shadowed(&duplicates[0]).await.unwrap();
        assert_eq!(rerun.removed, 0);
        assert_eq!(rerun.missing, vec![drop.id.clone()]);
    }

    #[tokio::test]
    async fn test_duplicate_under_foreign_partition_is_reported_missing() {
        let base = Utc::now();
        let keep = post("dup", Some(base));
        let stray = post("dup", Some(base - TimeDelta::days(1)));
        let store = Arc::new(FakeStore::seeded(vec![keep.clone()]));
        store.insert_at(DocumentAddress::new(&stray.id, "dup"), stray.clone());
        let (resolver, _) = resolver(store.clone());

        let duplicates = resolver.find_duplicates().await.unwrap();
        let cleanup = resolver.remove_shadowed(&duplicates[0]).await.unwrap();

        assert_eq!(cleanup.removed, 0);
        assert_eq!(cleanup.missing, vec![stray.id.clone()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_id_address_matches_document_address() {
        let p = post("some-slug", None);

        assert_eq!(address_for_id(&p.id), address_for(&p));
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_not_found() {
        let store = Arc::new(FakeStore::default());
        let (resolver, _) = resolver(store);

        let err = resolver.delete(&post("gone", None)).await.unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}
