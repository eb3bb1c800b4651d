use std::sync::Arc;

use chrono::Utc;

use crate::domain::{AllowList, User};
use crate::error::DomainError;
use crate::ports::{DocumentQuery, DocumentStore, ExternalIdentity};

/// Turns an external sign-in into a local user, gated by the allow-list.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn DocumentStore<User>>,
    allow_list: Arc<AllowList>,
}

impl AccountService {
    pub fn new(users: Arc<dyn DocumentStore<User>>, allow_list: AllowList) -> Self {
        Self {
            users,
            allow_list: Arc::new(allow_list),
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        let query = DocumentQuery::new().eq("email", email.trim().to_lowercase());
        let users = self
            .users
            .query(&query)
            .await
            .map_err(|e| DomainError::from_store(e, "user", email))?;
        Ok(users.into_iter().next())
    }

    /// Find or create the user for an allow-listed identity.
    ///
    /// Roles always come from the allow-list, so removing a role there takes
    /// effect on the next sign-in.
    pub async fn sign_in(&self, identity: ExternalIdentity) -> Result<User, DomainError> {
        let Some(entry) = self.allow_list.find(&identity.email) else {
            tracing::warn!(email = %identity.email, "Sign-in rejected, not on allow-list");
            return Err(DomainError::Forbidden);
        };

        let name = if identity.name.trim().is_empty() {
            entry.name.clone().unwrap_or_else(|| identity.email.clone())
        } else {
            identity.name.clone()
        };

        let user = match self.find_by_email(&identity.email).await? {
            Some(mut user) => {
                user.roles = entry.roles.clone();
                user.name = name;
                if identity.avatar.is_some() {
                    user.avatar = identity.avatar;
                }
                user.updated_at = Utc::now();
                user
            }
            None => {
                tracing::info!(email = %identity.email, "Creating user on first sign-in");
                User::new(&identity.email, name, entry.roles.clone(), identity.avatar)
            }
        };

        self.users
            .upsert(&user.address(), &user)
            .await
            .map_err(|e| DomainError::from_store(e, "user", &user.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake::FakeStore;

    fn service() -> (AccountService, Arc<FakeStore<User>>) {
        let store = Arc::new(FakeStore::default());
        let allow_list = AllowList::parse("owner@example.com:admin|author").unwrap();
        (AccountService::new(store.clone(), allow_list), store)
    }

    fn identity(email: &str) -> ExternalIdentity {
        ExternalIdentity {
            email: email.into(),
            name: "Owner".into(),
            avatar: None,
        }
    }

    #[tokio::test]
    async fn test_unlisted_identity_is_forbidden() {
        let (service, store) = service();

        let err = service
            .sign_in(identity("stranger@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Forbidden));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_creates_then_reuses_user() {
        let (service, store) = service();

        let first = service.sign_in(identity("Owner@Example.com")).await.unwrap();
        let second = service.sign_in(identity("owner@example.com")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.email, "owner@example.com");
        assert_eq!(second.roles, vec!["admin", "author"]);
        assert_eq!(store.len(), 1);
        assert!(second.principal().is_admin());
    }
}
