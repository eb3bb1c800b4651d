//! # Quill Infrastructure
//!
//! Concrete implementations of the ports defined in `quill-core`:
//! document stores, rate-limit counter stores, session tokens and the
//! external identity provider.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-memory only
//! - `postgres` - PostgreSQL (JSONB) document store via SeaORM
//! - `redis` - Redis counter store for rate limiting across replicas

pub mod auth;
pub mod rate_limit;
pub mod store;

pub use auth::{JwtConfig, JwtTokenService, OidcConfig, OidcIdentityProvider};
pub use rate_limit::{InMemoryCounterStore, RedisConfig};
pub use store::{DatabaseConfig, InMemoryDocumentStore, containers};

#[cfg(feature = "postgres")]
pub use store::{PostgresDocumentStore, connect};

#[cfg(feature = "redis")]
pub use rate_limit::RedisCounterStore;
