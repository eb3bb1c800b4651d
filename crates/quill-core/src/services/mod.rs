//! Application services - the operations the HTTP layer exposes, expressed
//! against the ports.

mod accounts;
mod comments;
mod pages;
mod posts;

#[cfg(test)]
pub(crate) mod fake;

pub use accounts::AccountService;
pub use comments::CommentService;
pub use pages::PageService;
pub use posts::PostService;

use crate::error::DomainError;

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
