//! Domain entities - the core business objects.

mod access;
mod comment;
mod page;
mod post;
mod slug;
mod status;
mod user;

pub use access::{AllowList, AuthorizedUser, Principal, ROLE_ADMIN, ROLE_AUTHOR};
pub use comment::{Comment, CommentAuthor, CommentSubmission, CommentThread};
pub use page::{Page, PageChanges, PageDraft};
pub use post::{Author, Post, PostChanges, PostDraft};
pub use slug::validate_slug;
pub use status::PublishStatus;
pub use user::User;
