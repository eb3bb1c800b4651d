use std::sync::Arc;

use chrono::Utc;

use super::require_text;
use crate::domain::{
    Post, PostChanges, PostDraft, Principal, PublishStatus, ROLE_AUTHOR, validate_slug,
};
use crate::error::DomainError;
use crate::identity::{IdentityResolver, address_for};
use crate::ports::{DocumentQuery, DocumentStore};

/// Blog post operations.
#[derive(Clone)]
pub struct PostService {
    resolver: IdentityResolver<Post>,
}

impl PostService {
    pub fn new(store: Arc<dyn DocumentStore<Post>>) -> Self {
        Self::with_resolver(IdentityResolver::new(store))
    }

    pub fn with_resolver(resolver: IdentityResolver<Post>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &IdentityResolver<Post> {
        &self.resolver
    }

    /// Newest first. Only authors see drafts; everyone else gets published posts
    /// whatever `status` they ask for.
    pub async fn list(
        &self,
        status: Option<PublishStatus>,
        viewer: Option<&Principal>,
    ) -> Result<Vec<Post>, DomainError> {
        let status = if viewer.is_some_and(|p| p.has_role(ROLE_AUTHOR)) {
            status
        } else {
            Some(PublishStatus::Published)
        };

        let mut query = DocumentQuery::new();
        if let Some(status) = status {
            query = query.eq("status", status.as_str());
        }
        self.resolver.list(&query.order_desc("createdAt")).await
    }

    /// Look up a post, hiding drafts from readers without the author role.
    pub async fn get_visible(
        &self,
        slug: &str,
        viewer: Option<&Principal>,
    ) -> Result<Post, DomainError> {
        let post = self.resolver.resolve_by_slug(slug).await?;
        if post.is_published() || viewer.is_some_and(|p| p.has_role(ROLE_AUTHOR)) {
            Ok(post)
        } else {
            Err(DomainError::not_found("post", slug))
        }
    }

    pub async fn create(&self, draft: PostDraft, actor: &Principal) -> Result<Post, DomainError> {
        actor.require_role(ROLE_AUTHOR)?;
        require_text("Title", &draft.title)?;
        require_text("Content", &draft.content)?;
        validate_slug(&draft.slug)?;

        let post = Post::new(draft, actor.author(), Utc::now());
        self.resolver.create_unique(post).await
    }

    pub async fn update(
        &self,
        slug: &str,
        changes: PostChanges,
        actor: &Principal,
    ) -> Result<Post, DomainError> {
        actor.require_role(ROLE_AUTHOR)?;
        if let Some(title) = &changes.title {
            require_text("Title", title)?;
        }

        let mut post = self.resolver.resolve_by_slug(slug).await?;
        actor.require_owner_or_admin(&post.author.id)?;

        post.apply(changes, Utc::now());
        self.resolver.replace(&post).await
    }

    pub async fn delete(&self, slug: &str, actor: &Principal) -> Result<(), DomainError> {
        actor.require_role(ROLE_AUTHOR)?;
        let post = self.resolver.resolve_by_slug(slug).await?;
        actor.require_owner_or_admin(&post.author.id)?;
        self.resolver.delete(&post).await
    }

    /// Bump the view counter of a post. Returns the new count.
    ///
    /// Re-reads the stored document so the increment is applied to the
    /// latest version rather than the copy that was served.
    pub async fn record_view(&self, post: &Post) -> Result<u64, DomainError> {
        let address = address_for(post);
        let mut current = self
            .resolver
            .store()
            .read(&address)
            .await
            .map_err(|e| DomainError::from_store(e, "post", &post.slug))?
            .ok_or_else(|| DomainError::not_found("post", &post.slug))?;

        current.views += 1;
        let saved = self.resolver.replace(&current).await?;
        Ok(saved.views)
    }
}
