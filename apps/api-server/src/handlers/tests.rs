use std::sync::Arc;
use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use async_trait::async_trait;
use serde_json::{Value, json};

use quill_core::domain::{AllowList, Principal, ROLE_ADMIN, ROLE_AUTHOR};
use quill_core::ports::{AuthError, DocumentQuery, ExternalIdentity, IdentityProvider};
use quill_core::rate_limit::ForwardedIpKey;
use quill_infra::{InMemoryCounterStore, JwtConfig, JwtTokenService};

use super::configure_routes;
use crate::middleware::AUTH_COOKIE;
use crate::state::{AppState, Stores};

/// Hands out a fixed identity per authorization code.
struct FakeProvider;

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self) -> String {
        "https://login.example.com/authorize?client_id=test".to_string()
    }

    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, AuthError> {
        let email = match code {
            "owner-code" => "Owner@Example.com",
            "stranger-code" => "stranger@example.com",
            _ => return Err(AuthError::Provider("invalid_grant".to_string())),
        };
        Ok(ExternalIdentity {
            email: email.to_string(),
            name: "Someone".to_string(),
            avatar: None,
        })
    }
}

fn test_state() -> AppState {
    state_with(Stores::in_memory())
}

fn state_with(stores: Stores) -> AppState {
    AppState::from_parts(
        stores,
        Arc::new(InMemoryCounterStore::new()),
        Arc::new(JwtTokenService::new(JwtConfig {
            secret: "handler-test-secret".to_string(),
            ..JwtConfig::default()
        })),
        Arc::new(FakeProvider),
        AllowList::parse("owner@example.com:admin:Owner").unwrap(),
        ForwardedIpKey::default(),
        "test".to_string(),
    )
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_routes(&$state)),
        )
        .await
    };
}

fn bearer(state: &AppState, user_id: &str, role: &str) -> (header::HeaderName, String) {
    let principal = Principal {
        user_id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        name: user_id.to_string(),
        roles: vec![role.to_string()],
    };
    let token = state.tokens.generate_token(&principal).unwrap();
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

fn new_post(slug: &str, status: &str) -> Value {
    json!({
        "slug": slug,
        "title": "Hello",
        "content": "First post",
        "status": status,
    })
}

#[actix_rt::test]
async fn test_health_and_version() {
    let state = test_state();
    let app = app!(state);

    let health = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(health.status(), StatusCode::OK);

    let version: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/version").to_request(),
    )
    .await;
    assert_eq!(version["environment"], "test");
    assert!(version["serverTime"].is_string());
}

#[actix_rt::test]
async fn test_duplicate_slug_is_a_conflict() {
    let state = test_state();
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);

    let first = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(author.clone())
            .set_json(new_post("hello-world", "published"))
            .to_request(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(author.clone())
            .set_json(new_post("hello-world", "draft"))
            .to_request(),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(second).await;
    assert_eq!(body["type"], "/problems/slug-conflict");

    let listed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/posts")
            .insert_header(author)
            .to_request(),
    )
    .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_writes_need_a_session() {
    let state = test_state();
    let app = app!(state);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .set_json(new_post("anon", "published"))
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_drafts_are_hidden_from_readers() {
    let state = test_state();
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);

    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(author.clone())
            .set_json(new_post("secret", "draft"))
            .to_request(),
    )
    .await;

    let anonymous = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/posts/secret").to_request(),
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);

    let as_author = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/posts/secret")
            .insert_header(author)
            .to_request(),
    )
    .await;
    assert_eq!(as_author.status(), StatusCode::OK);

    let listed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/posts?status=draft").to_request(),
    )
    .await;
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_reading_a_published_post_counts_a_view() {
    let state = test_state();
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);

    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(author)
            .set_json(new_post("popular", "published"))
            .to_request(),
    )
    .await;

    let res = test::call_service(&app, test::TestRequest::get().uri("/api/posts/popular").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    actix_rt::time::sleep(Duration::from_millis(50)).await;

    let post = state.posts.resolver().resolve_by_slug("popular").await.unwrap();
    assert_eq!(post.views, 1);
}

#[actix_rt::test]
async fn test_comment_moderation_flow() {
    let state = test_state();
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);
    let admin = bearer(&state, "owner", ROLE_ADMIN);

    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(author)
            .set_json(new_post("discuss", "published"))
            .to_request(),
    )
    .await;

    let submitted = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts/discuss/comments")
            .set_json(json!({
                "author": { "name": "Reader", "email": "reader@example.com" },
                "content": "Nice post",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(submitted.status(), StatusCode::CREATED);
    let submitted: Value = test::read_body_json(submitted).await;
    assert_eq!(
        submitted["message"],
        "Comment submitted successfully. It will appear after approval."
    );

    let thread: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/posts/discuss/comments").to_request(),
    )
    .await;
    assert!(thread["data"].as_array().unwrap().is_empty());

    let approved = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/comments")
            .insert_header(admin)
            .set_json(json!({
                "commentId": submitted["data"]["id"],
                "postId": submitted["data"]["postId"],
            }))
            .to_request(),
    )
    .await;
    assert_eq!(approved.status(), StatusCode::OK);

    let thread: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/posts/discuss/comments").to_request(),
    )
    .await;
    assert_eq!(thread["data"].as_array().unwrap().len(), 1);
    assert_eq!(thread["data"][0]["content"], "Nice post");
}

#[actix_rt::test]
async fn test_moderation_requires_admin() {
    let state = test_state();
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/comments")
            .insert_header(author)
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn test_sidebar_is_not_a_page_slug() {
    let state = test_state();
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);

    let created = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/pages")
            .insert_header(author)
            .set_json(json!({
                "slug": "about",
                "title": "About",
                "content": "Who I am",
                "status": "published",
                "showInSidebar": true,
            }))
            .to_request(),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let sidebar: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/pages/sidebar").to_request(),
    )
    .await;
    assert_eq!(sidebar["data"][0]["slug"], "about");
}

#[actix_rt::test]
async fn test_callback_issues_session_cookie() {
    let state = test_state();
    let app = app!(state);

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=owner-code")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/admin");

    let cookie: Cookie<'static> = res
        .response()
        .cookies()
        .find(|c| c.name() == AUTH_COOKIE)
        .map(|c| c.into_owned())
        .unwrap();
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));

    let me: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/auth/me").cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(me["email"], "owner@example.com");
    assert_eq!(me["roles"], json!(["admin"]));
}

#[actix_rt::test]
async fn test_callback_rejects_unlisted_and_failed_sign_ins() {
    let state = test_state();
    let app = app!(state);

    let stranger = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=stranger-code")
            .to_request(),
    )
    .await;
    assert_eq!(stranger.status(), StatusCode::FORBIDDEN);

    for uri in [
        "/auth/callback?error=access_denied",
        "/auth/callback",
        "/auth/callback?code=bogus",
    ] {
        let res = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            "/auth/login?error=1"
        );
    }
}

#[actix_rt::test]
async fn test_callback_is_rate_limited() {
    let state = test_state();
    let app = app!(state);

    // The auth tier admits 5 requests per window.
    for _ in 0..5 {
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/auth/callback").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
    }

    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/auth/callback").to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key(header::RETRY_AFTER));
}

#[actix_rt::test]
async fn test_post_over_write_budget_is_not_stored() {
    let stores = Stores::in_memory();
    let posts = stores.posts.clone();
    let state = state_with(stores);
    let app = app!(state);
    let author = bearer(&state, "writer", ROLE_AUTHOR);

    // The write tier admits 10 mutating requests per window, signed in or not.
    for i in 0..10 {
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/posts")
                .set_json(new_post(&format!("anon-{i}"), "published"))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(author)
            .set_json(new_post("over-budget", "published"))
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(posts.query(&DocumentQuery::new()).await.unwrap().is_empty());
}

#[actix_rt::test]
async fn test_login_redirects_and_logout_clears_cookie() {
    let state = test_state();
    let app = app!(state);

    let login = test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
    assert_eq!(login.status(), StatusCode::FOUND);
    assert!(
        login.headers().get(header::LOCATION).unwrap().to_str().unwrap().starts_with("https://login.example.com/")
    );

    let logout = test::call_service(&app, test::TestRequest::post().uri("/auth/logout").to_request()).await;
    assert_eq!(logout.status(), StatusCode::SEE_OTHER);
    let cleared = logout
        .response()
        .cookies()
        .find(|c| c.name() == AUTH_COOKIE)
        .unwrap();
    assert_eq!(cleared.value(), "");
}
