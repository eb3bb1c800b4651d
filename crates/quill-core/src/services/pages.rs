use std::sync::Arc;

use chrono::Utc;

use super::require_text;
use crate::domain::{Page, PageChanges, PageDraft, Principal, PublishStatus, ROLE_AUTHOR, validate_slug};
use crate::error::DomainError;
use crate::identity::IdentityResolver;
use crate::ports::{DocumentQuery, DocumentStore};

/// Static page operations.
#[derive(Clone)]
pub struct PageService {
    resolver: IdentityResolver<Page>,
}

impl PageService {
    pub fn new(store: Arc<dyn DocumentStore<Page>>) -> Self {
        Self::with_resolver(IdentityResolver::new(store))
    }

    pub fn with_resolver(resolver: IdentityResolver<Page>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &IdentityResolver<Page> {
        &self.resolver
    }

    /// Pages by `order`, newest first within the same position.
    pub async fn list(&self, viewer: Option<&Principal>) -> Result<Vec<Page>, DomainError> {
        let mut query = DocumentQuery::new();
        if !viewer.is_some_and(|p| p.has_role(ROLE_AUTHOR)) {
            query = query.eq("status", PublishStatus::Published.as_str());
        }
        self.resolver
            .list(&query.order_asc("order").order_desc("createdAt"))
            .await
    }

    /// Published pages flagged for the sidebar.
    pub async fn sidebar(&self) -> Result<Vec<Page>, DomainError> {
        let query = DocumentQuery::new()
            .eq("status", PublishStatus::Published.as_str())
            .eq("showInSidebar", true)
            .order_asc("order")
            .order_asc("title");
        self.resolver.list(&query).await
    }

    pub async fn get_visible(
        &self,
        slug: &str,
        viewer: Option<&Principal>,
    ) -> Result<Page, DomainError> {
        let page = self.resolver.resolve_by_slug(slug).await?;
        if page.is_published() || viewer.is_some_and(|p| p.has_role(ROLE_AUTHOR)) {
            Ok(page)
        } else {
            Err(DomainError::not_found("page", slug))
        }
    }

    pub async fn create(&self, draft: PageDraft, actor: &Principal) -> Result<Page, DomainError> {
        actor.require_role(ROLE_AUTHOR)?;
        require_text("Title", &draft.title)?;
        require_text("Content", &draft.content)?;
        validate_slug(&draft.slug)?;

        let page = Page::new(draft, actor.author(), Utc::now());
        self.resolver.create_unique(page).await
    }

    pub async fn update(
        &self,
        slug: &str,
        changes: PageChanges,
        actor: &Principal,
    ) -> Result<Page, DomainError> {
        actor.require_role(ROLE_AUTHOR)?;
        let mut page = self.resolver.resolve_by_slug(slug).await?;
        page.apply(changes, Utc::now());
        self.resolver.replace(&page).await
    }

    pub async fn delete(&self, slug: &str, actor: &Principal) -> Result<(), DomainError> {
        actor.require_role(ROLE_AUTHOR)?;
        let page = self.resolver.resolve_by_slug(slug).await?;
        self.resolver.delete(&page).await
    }
}
