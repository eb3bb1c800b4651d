use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::post::Author;
use super::status::PublishStatus;
use crate::identity::Slugged;

/// Static page entity (about, contact, ...). Addressed exactly like posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub author: Author,
    #[serde(default)]
    pub status: PublishStatus,
    /// Sidebar position, lower first.
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub show_in_sidebar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct PageDraft {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub status: PublishStatus,
    pub order: i32,
    pub show_in_sidebar: bool,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PageChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<PublishStatus>,
    pub order: Option<i32>,
    pub show_in_sidebar: Option<bool>,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
}

impl Page {
    pub fn new(draft: PageDraft, author: Author, now: DateTime<Utc>) -> Self {
        let mut page = Self {
            id: format!("page-{}", Uuid::new_v4()),
            slug: draft.slug,
            title: draft.title,
            content: draft.content,
            excerpt: draft.excerpt,
            author,
            status: PublishStatus::Draft,
            order: draft.order,
            show_in_sidebar: draft.show_in_sidebar,
            meta_description: draft.meta_description,
            featured_image: draft.featured_image,
            created_at: now,
            updated_at: now,
            published_at: None,
        };
        PublishStatus::transition(&mut page.status, &mut page.published_at, draft.status, now);
        page
    }

    pub fn apply(&mut self, changes: PageChanges, now: DateTime<Utc>) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(content) = changes.content {
            self.content = content;
        }
        if changes.excerpt.is_some() {
            self.excerpt = changes.excerpt;
        }
        if let Some(order) = changes.order {
            self.order = order;
        }
        if let Some(show) = changes.show_in_sidebar {
            self.show_in_sidebar = show;
        }
        if changes.meta_description.is_some() {
            self.meta_description = changes.meta_description;
        }
        if changes.featured_image.is_some() {
            self.featured_image = changes.featured_image;
        }
        if let Some(status) = changes.status {
            PublishStatus::transition(&mut self.status, &mut self.published_at, status, now);
        }
        self.updated_at = now;
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

impl Slugged for Page {
    const KIND: &'static str = "page";

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
