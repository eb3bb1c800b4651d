use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::DocumentAddress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Reader comment. Comments are partitioned by the post they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author: CommentAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// A comment submitted by a reader, before it is stored.
#[derive(Debug, Clone)]
pub struct CommentSubmission {
    pub author: CommentAuthor,
    pub content: String,
    pub parent_id: Option<String>,
}

/// A root comment with its approved replies.
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

impl Comment {
    /// New comments wait for moderation.
    pub fn new(post_id: &str, submission: CommentSubmission, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author: submission.author,
            content: submission.content,
            created_at: now,
            approved: false,
            parent_id: submission.parent_id,
        }
    }

    pub fn address(&self) -> DocumentAddress {
        Self::address_of(&self.id, &self.post_id)
    }

    /// Address of a comment known only by id and post.
    pub fn address_of(id: &str, post_id: &str) -> DocumentAddress {
        DocumentAddress::new(id, post_id)
    }
}
