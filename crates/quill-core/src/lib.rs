//! # Quill Core
//!
//! The domain layer of the Quill blog backend.
//! Entities, the post identity resolver, the fixed-window rate limiter and the
//! ports that infrastructure must implement. No storage or network code lives here.

pub mod domain;
pub mod error;
pub mod identity;
pub mod ports;
pub mod rate_limit;
pub mod services;

pub use error::{DomainError, StoreError};
pub use identity::{IdentityResolver, ShadowCleanup, address_for, address_for_id};
