//! HTTP handlers and route configuration.

mod auth;
mod comments;
mod health;
mod pages;
mod posts;

#[cfg(test)]
mod tests;

use actix_web::web;
use std::sync::Arc;

use quill_core::domain::PublishStatus;
use quill_core::ports::RateLimiter;

use crate::middleware::{AppError, RateLimitMiddleware};
use crate::state::{AppState, RateLimiters};

/// Configure all application routes.
///
/// `/api` counts every request against the `api` tier and mutating requests
/// against `write` as well. The sign-in callback uses the `auth` tier.
pub fn configure_routes(state: &AppState) -> impl FnOnce(&mut web::ServiceConfig) + use<> {
    let limiters = state.limiters.clone();
    let keys = state.key_extractor.clone();

    move |cfg| {
        let limit = |limiter: &Arc<dyn RateLimiter>| {
            RateLimitMiddleware::new(limiter.clone(), keys.clone())
        };
        let RateLimiters { api, auth, write } = &limiters;

        cfg.service(
            web::scope("/api")
                .wrap(limit(write).only_mutating())
                .wrap(limit(api))
                .route("/health", web::get().to(health::health_check))
                .route("/version", web::get().to(health::version))
                .service(
                    web::resource("/posts")
                        .route(web::get().to(posts::list))
                        .route(web::post().to(posts::create)),
                )
                .service(
                    web::resource("/posts/{slug}")
                        .route(web::get().to(posts::get))
                        .route(web::put().to(posts::update))
                        .route(web::delete().to(posts::delete)),
                )
                .service(
                    web::resource("/posts/{slug}/comments")
                        .route(web::get().to(comments::thread))
                        .route(web::post().to(comments::submit)),
                )
                .service(
                    web::resource("/comments")
                        .route(web::get().to(comments::list_all))
                        .route(web::put().to(comments::approve))
                        .route(web::delete().to(comments::delete)),
                )
                .service(
                    web::resource("/pages")
                        .route(web::get().to(pages::list))
                        .route(web::post().to(pages::create)),
                )
                .route("/pages/sidebar", web::get().to(pages::sidebar))
                .service(
                    web::resource("/pages/{slug}")
                        .route(web::get().to(pages::get))
                        .route(web::put().to(pages::update))
                        .route(web::delete().to(pages::delete)),
                ),
        )
        .service(
            web::scope("/auth")
                .route("/login", web::get().to(auth::login))
                .service(
                    web::resource("/callback")
                        .wrap(limit(auth))
                        .route(web::get().to(auth::callback)),
                )
                .route("/logout", web::post().to(auth::logout))
                .route("/me", web::get().to(auth::me)),
        );
    }
}

/// Parse an optional `status` field from a request.
fn parse_status(value: Option<&str>) -> Result<Option<PublishStatus>, AppError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<PublishStatus>().map_err(AppError::from))
        .transpose()
}
