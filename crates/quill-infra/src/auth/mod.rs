//! Authentication implementations.

mod jwt;
mod oidc;

pub use jwt::{JwtConfig, JwtTokenService};
pub use oidc::{OidcConfig, OidcIdentityProvider};
