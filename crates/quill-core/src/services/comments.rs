use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use super::{PostService, require_text};
use crate::domain::{Comment, CommentSubmission, CommentThread, Post, Principal, ROLE_ADMIN};
use crate::error::DomainError;
use crate::ports::{DocumentQuery, DocumentStore};

const MAX_COMMENT_LEN: usize = 5000;

/// Reader comments and their moderation.
#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn DocumentStore<Comment>>,
    posts: PostService,
}

impl CommentService {
    pub fn new(comments: Arc<dyn DocumentStore<Comment>>, posts: PostService) -> Self {
        Self { comments, posts }
    }

    /// Comments only exist on published posts.
    async fn published_post(&self, slug: &str) -> Result<Post, DomainError> {
        self.posts.get_visible(slug, None).await
    }

    /// Approved root comments, newest first, each with its approved replies
    /// oldest first.
    pub async fn thread(&self, slug: &str) -> Result<Vec<CommentThread>, DomainError> {
        let post = self.published_post(slug).await?;
        let query = DocumentQuery::new()
            .eq("postId", post.id.as_str())
            .eq("approved", true)
            .order_asc("createdAt");
        let approved = self
            .comments
            .query(&query)
            .await
            .map_err(|e| DomainError::from_store(e, "comment", slug))?;

        let (roots, replies): (Vec<Comment>, Vec<Comment>) =
            approved.into_iter().partition(|c| c.parent_id.is_none());

        let mut by_parent: HashMap<String, Vec<Comment>> = HashMap::new();
        for reply in replies {
            if let Some(parent) = reply.parent_id.clone() {
                by_parent.entry(parent).or_default().push(reply);
            }
        }

        Ok(roots
            .into_iter()
            .rev()
            .map(|comment| {
                let replies = by_parent.remove(&comment.id).unwrap_or_default();
                CommentThread { comment, replies }
            })
            .collect())
    }

    /// Store a reader comment awaiting moderation.
    pub async fn submit(
        &self,
        slug: &str,
        submission: CommentSubmission,
    ) -> Result<Comment, DomainError> {
        require_text("Name", &submission.author.name)?;
        require_text("Email", &submission.author.email)?;
        require_text("Content", &submission.content)?;
        if !submission.author.email.contains('@') {
            return Err(DomainError::Validation("Email is invalid".to_string()));
        }
        if submission.content.chars().count() > MAX_COMMENT_LEN {
            return Err(DomainError::Validation(format!(
                "Content must be at most {} characters",
                MAX_COMMENT_LEN
            )));
        }

        let post = self.published_post(slug).await?;

        if let Some(parent_id) = &submission.parent_id {
            let parent = self
                .comments
                .read(&Comment::address_of(parent_id, &post.id))
                .await
                .map_err(|e| DomainError::from_store(e, "comment", parent_id))?;
            if parent.is_none() {
                return Err(DomainError::Validation(
                    "Parent comment not found".to_string(),
                ));
            }
        }

        let comment = Comment::new(&post.id, submission, Utc::now());
        let saved = self
            .comments
            .upsert(&comment.address(), &comment)
            .await
            .map_err(|e| DomainError::from_store(e, "comment", &comment.id))?;
        tracing::info!(comment_id = %saved.id, post_id = %saved.post_id, "Comment submitted for moderation");
        Ok(saved)
    }

    /// Every comment, newest first, for the moderation queue.
    pub async fn list_all(&self, actor: &Principal) -> Result<Vec<Comment>, DomainError> {
        actor.require_role(ROLE_ADMIN)?;
        self.comments
            .query(&DocumentQuery::new().order_desc("createdAt"))
            .await
            .map_err(|e| DomainError::from_store(e, "comment", ""))
    }

    pub async fn approve(
        &self,
        actor: &Principal,
        comment_id: &str,
        post_id: &str,
    ) -> Result<Comment, DomainError> {
        actor.require_role(ROLE_ADMIN)?;
        let address = Comment::address_of(comment_id, post_id);
        let mut comment = self
            .comments
            .read(&address)
            .await
            .map_err(|e| DomainError::from_store(e, "comment", comment_id))?
            .ok_or_else(|| DomainError::not_found("comment", comment_id))?;

        comment.approved = true;
        self.comments
            .upsert(&address, &comment)
            .await
            .map_err(|e| DomainError::from_store(e, "comment", comment_id))
    }

    pub async fn delete(
        &self,
        actor: &Principal,
        comment_id: &str,
        post_id: &str,
    ) -> Result<(), DomainError> {
        actor.require_role(ROLE_ADMIN)?;
        self.comments
            .delete(&Comment::address_of(comment_id, post_id))
            .await
            .map_err(|e| DomainError::from_store(e, "comment", comment_id))
    }
}
