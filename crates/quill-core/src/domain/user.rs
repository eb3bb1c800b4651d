use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::Principal;
use crate::identity::address_for_id;
use crate::ports::DocumentAddress;

/// User entity - an allow-listed person who has signed in at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with generated ID and timestamps.
    pub fn new(email: &str, name: String, roles: Vec<String>, avatar: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_lowercase(),
            name,
            roles,
            avatar,
            created_at: now,
            updated_at: now,
        }
    }

    /// Users are partitioned by their own id.
    pub fn address(&self) -> DocumentAddress {
        address_for_id(&self.id)
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            roles: self.roles.clone(),
        }
    }
}
