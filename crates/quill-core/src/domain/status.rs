use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Publication status shared by posts and pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    #[default]
    Draft,
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    /// Apply a status change to a document's `(status, published_at)` pair.
    ///
    /// `draft -> published` stamps `published_at` the first time only.
    /// `published -> draft` keeps the original publication time.
    pub fn transition(
        status: &mut PublishStatus,
        published_at: &mut Option<DateTime<Utc>>,
        next: PublishStatus,
        now: DateTime<Utc>,
    ) {
        if next == PublishStatus::Published && published_at.is_none() {
            *published_at = Some(now);
        }
        *status = next;
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(DomainError::Validation(format!(
                "Unknown status '{}', expected 'draft' or 'published'",
                other
            ))),
        }
    }
}
