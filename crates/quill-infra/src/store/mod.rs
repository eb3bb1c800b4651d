//! Document store implementations.

mod connections;
mod memory;

#[cfg(feature = "postgres")]
pub mod entity;
#[cfg(feature = "postgres")]
mod postgres;

pub use connections::DatabaseConfig;
pub use memory::InMemoryDocumentStore;

#[cfg(feature = "postgres")]
pub use connections::connect;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDocumentStore;


/// Container names. Each holds one document type.
pub mod containers {
    /// Partitioned by post id.
    pub const POSTS: &str = "posts";
    /// Partitioned by page id.
    pub const PAGES: &str = "pages";
    /// Partitioned by the id of the post commented on.
    pub const COMMENTS: &str = "comments";
    /// Partitioned by user id.
    pub const USERS: &str = "users";

    pub const ALL: [&str; 4] = [POSTS, PAGES, COMMENTS, USERS];
}
