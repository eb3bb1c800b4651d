//! Sign-in through the external identity provider.

use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use actix_web::{HttpResponse, http::header, web};

use quill_core::DomainError;
use quill_shared::ErrorResponse;
use quill_shared::dto::{CallbackQuery, SessionResponse};

use crate::middleware::{AUTH_COOKIE, AppError, AppResult, Identity};
use crate::state::AppState;

const LOGIN_FAILED: &str = "/auth/login?error=1";
const AFTER_LOGIN: &str = "/admin";

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
}

/// GET /auth/login
///
/// Redirects to the identity provider, or reports a failed attempt when
/// the callback sent the browser back with `?error=`.
pub async fn login(state: web::Data<AppState>, query: web::Query<LoginQuery>) -> HttpResponse {
    if query.error.is_some() {
        return HttpResponse::Unauthorized().json(
            ErrorResponse::new(401, "Sign-in Failed")
                .with_detail("Signing in with the identity provider did not succeed."),
        );
    }
    HttpResponse::Found()
        .insert_header((header::LOCATION, state.identity_provider.authorize_url()))
        .finish()
}

/// GET /auth/callback?code=
pub async fn callback(
    state: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
) -> AppResult<HttpResponse> {
    if let Some(error) = &query.error {
        tracing::warn!(error = %error, "Identity provider returned an error");
        return Ok(see_other(LOGIN_FAILED));
    }
    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return Ok(see_other(LOGIN_FAILED));
    };

    let identity = match state.identity_provider.exchange(code).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!(error = %e, "Authorization code exchange failed");
            return Ok(see_other(LOGIN_FAILED));
        }
    };

    let user = match state.accounts.sign_in(identity).await {
        Ok(user) => user,
        Err(DomainError::Forbidden) => return Err(AppError::Forbidden),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load user after sign-in");
            return Ok(see_other(LOGIN_FAILED));
        }
    };

    let token = match state.tokens.generate_token(&user.principal()) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue session token");
            return Ok(see_other(LOGIN_FAILED));
        }
    };

    let cookie = Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(state.tokens.expiration_seconds()))
        .finish();

    tracing::info!(user_id = %user.id, email = %user.email, "User signed in");
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, AFTER_LOGIN))
        .cookie(cookie)
        .finish())
}

/// POST /auth/logout
pub async fn logout() -> HttpResponse {
    let mut cookie = Cookie::build(AUTH_COOKIE, "").path("/").finish();
    cookie.make_removal();

    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(cookie)
        .finish()
}

/// GET /auth/me
pub async fn me(identity: Identity) -> HttpResponse {
    let principal = identity.0;
    HttpResponse::Ok().json(SessionResponse {
        user_id: principal.user_id,
        email: principal.email,
        name: principal.name,
        roles: principal.roles,
    })
}
