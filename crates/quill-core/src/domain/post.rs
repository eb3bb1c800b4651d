use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::PublishStatus;
use crate::identity::Slugged;

/// Author reference embedded in posts and pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Post entity - a blog post stored as a document.
///
/// The `id` is both the document id and the partition key. The `slug` is what
/// URLs carry and is only intended to be unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    pub author: Author,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: PublishStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub views: u64,
}

/// Fields supplied when creating a post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub status: PublishStatus,
    pub featured_image: Option<String>,
}

/// Partial update of a post. Identity fields are not representable here.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PublishStatus>,
    pub featured_image: Option<String>,
}

impl Post {
    /// Create a new post with a generated id.
    pub fn new(draft: PostDraft, author: Author, now: DateTime<Utc>) -> Self {
        let mut post = Self {
            id: Uuid::new_v4().to_string(),
            slug: draft.slug,
            title: draft.title,
            content: draft.content,
            excerpt: draft.excerpt,
            author,
            categories: draft.categories,
            tags: draft.tags,
            status: PublishStatus::Draft,
            published_at: None,
            created_at: now,
            updated_at: now,
            featured_image: draft.featured_image,
            views: 0,
        };
        post.set_status(draft.status, now);
        post
    }

    pub fn set_status(&mut self, next: PublishStatus, now: DateTime<Utc>) {
        PublishStatus::transition(&mut self.status, &mut self.published_at, next, now);
    }

    /// Apply an update. `id`, `slug` and `created_at` never change.
    pub fn apply(&mut self, changes: PostChanges, now: DateTime<Utc>) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(content) = changes.content {
            self.content = content;
        }
        if let Some(excerpt) = changes.excerpt {
            self.excerpt = excerpt;
        }
        if let Some(categories) = changes.categories {
            self.categories = categories;
        }
        if let Some(tags) = changes.tags {
            self.tags = tags;
        }
        if let Some(image) = changes.featured_image {
            self.featured_image = Some(image);
        }
        if let Some(status) = changes.status {
            self.set_status(status, now);
        }
        self.updated_at = now;
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

impl Slugged for Post {
    const KIND: &'static str = "post";

    fn id(&self) -> &str {
        &self.id
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
