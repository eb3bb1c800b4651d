//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod rate_limit;
mod store;

pub use auth::{AuthError, ExternalIdentity, IdentityProvider, TokenClaims, TokenService};
pub use rate_limit::{CounterStore, RateLimitDecision, RateLimitError, RateLimiter, WindowEntry};
pub use store::{
    DocumentAddress, DocumentQuery, DocumentStore, FieldFilter, OrderBy, SortDirection,
};
