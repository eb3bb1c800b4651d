//! Who may do what: authenticated principals and the sign-in allow-list.

use super::post::Author;
use crate::error::DomainError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_AUTHOR: &str = "author";

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl Principal {
    /// Admins implicitly hold every role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role || r == ROLE_ADMIN)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_ADMIN)
    }

    pub fn require_role(&self, role: &str) -> Result<(), DomainError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(DomainError::Forbidden)
        }
    }

    /// The principal as recorded on documents they write.
    pub fn author(&self) -> Author {
        Author {
            id: self.user_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Owners and admins may modify a document.
    pub fn require_owner_or_admin(&self, owner_id: &str) -> Result<(), DomainError> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Forbidden)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub email: String,
    pub roles: Vec<String>,
    pub name: Option<String>,
}

/// Static list of people allowed to sign in.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    users: Vec<AuthorizedUser>,
}

impl AllowList {
    pub fn new(users: Vec<AuthorizedUser>) -> Self {
        let users = users
            .into_iter()
            .map(|mut u| {
                u.email = u.email.trim().to_lowercase();
                u
            })
            .collect();
        Self { users }
    }

    /// Parse `email:role|role:Display Name` entries separated by commas.
    ///
    /// Roles default to `author` and the display name is optional.
    pub fn parse(spec: &str) -> Result<Self, DomainError> {
        let mut users = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let email = parts.next().unwrap_or_default().trim();
            if !email.contains('@') {
                return Err(DomainError::Validation(format!(
                    "Invalid allow-list entry '{}'",
                    entry
                )));
            }
            let roles: Vec<String> = parts
                .next()
                .map(|r| {
                    r.split('|')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            let name = parts
                .next()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from);

            users.push(AuthorizedUser {
                email: email.to_string(),
                roles: if roles.is_empty() {
                    vec![ROLE_AUTHOR.to_string()]
                } else {
                    roles
                },
                name,
            });
        }
        Ok(Self::new(users))
    }

    /// Case-insensitive lookup.
    pub fn find(&self, email: &str) -> Option<&AuthorizedUser> {
        let email = email.trim().to_lowercase();
        self.users.iter().find(|u| u.email == email)
    }

    pub fn is_authorized(&self, email: &str) -> bool {
        self.find(email).is_some()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
