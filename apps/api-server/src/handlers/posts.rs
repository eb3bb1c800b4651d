//! Post endpoints.

use actix_web::{HttpResponse, web};

use quill_core::domain::{PostChanges, PostDraft};
use quill_shared::ApiResponse;
use quill_shared::dto::{CreatePostRequest, StatusQuery, UpdatePostRequest};

use super::parse_status;
use crate::middleware::{AppResult, Identity, OptionalIdentity};
use crate::state::AppState;

/// GET /api/posts?status=
pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<StatusQuery>,
    viewer: OptionalIdentity,
) -> AppResult<HttpResponse> {
    let status = parse_status(query.status.as_deref())?;
    let posts = state.posts.list(status, viewer.principal()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(posts)))
}

/// GET /api/posts/{slug}
///
/// Serving a published post bumps its view counter in the background.
pub async fn get(
    state: web::Data<AppState>,
    slug: web::Path<String>,
    viewer: OptionalIdentity,
) -> AppResult<HttpResponse> {
    let post = state.posts.get_visible(&slug, viewer.principal()).await?;

    if post.is_published() {
        let posts = state.posts.clone();
        let viewed = post.clone();
        actix_rt::spawn(async move {
            if let Err(e) = posts.record_view(&viewed).await {
                tracing::warn!(post_id = %viewed.id, error = %e, "Failed to record view");
            }
        });
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(post)))
}

/// POST /api/posts
pub async fn create(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreatePostRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let draft = PostDraft {
        status: parse_status(body.status.as_deref())?.unwrap_or_default(),
        slug: body.slug.trim().to_string(),
        title: body.title,
        content: body.content,
        excerpt: body.excerpt,
        categories: body.categories,
        tags: body.tags,
        featured_image: body.featured_image,
    };

    let post = state.posts.create(draft, &identity).await?;
    tracing::info!(post_id = %post.id, slug = %post.slug, author = %identity.email, "Post created");
    Ok(HttpResponse::Created().json(ApiResponse::ok(post)))
}

/// PUT /api/posts/{slug}
pub async fn update(
    state: web::Data<AppState>,
    identity: Identity,
    slug: web::Path<String>,
    body: web::Json<UpdatePostRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let changes = PostChanges {
        status: parse_status(body.status.as_deref())?,
        title: body.title,
        content: body.content,
        excerpt: body.excerpt,
        categories: body.categories,
        tags: body.tags,
        featured_image: body.featured_image,
    };

    let post = state.posts.update(&slug, changes, &identity).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(post)))
}

/// DELETE /api/posts/{slug}
pub async fn delete(
    state: web::Data<AppState>,
    identity: Identity,
    slug: web::Path<String>,
) -> AppResult<HttpResponse> {
    state.posts.delete(&slug, &identity).await?;
    tracing::info!(slug = %slug, by = %identity.email, "Post deleted");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(())))
}
