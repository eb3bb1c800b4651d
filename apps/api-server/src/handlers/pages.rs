//! Static page endpoints.

use actix_web::{HttpResponse, web};

use quill_core::domain::{PageChanges, PageDraft};
use quill_shared::ApiResponse;
use quill_shared::dto::{CreatePageRequest, UpdatePageRequest};

use super::parse_status;
use crate::middleware::{AppResult, Identity, OptionalIdentity};
use crate::state::AppState;

pub async fn list(state: web::Data<AppState>, viewer: OptionalIdentity) -> AppResult<HttpResponse> {
    let pages = state.pages.list(viewer.principal()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(pages)))
}

pub async fn sidebar(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let pages = state.pages.sidebar().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(pages)))
}

pub async fn get(
    state: web::Data<AppState>,
    slug: web::Path<String>,
    viewer: OptionalIdentity,
) -> AppResult<HttpResponse> {
    let page = state.pages.get_visible(&slug, viewer.principal()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(page)))
}

pub async fn create(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreatePageRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let draft = PageDraft {
        status: parse_status(body.status.as_deref())?.unwrap_or_default(),
        slug: body.slug.trim().to_string(),
        title: body.title,
        content: body.content,
        excerpt: body.excerpt,
        order: body.order,
        show_in_sidebar: body.show_in_sidebar,
        meta_description: body.meta_description,
        featured_image: body.featured_image,
    };

    let page = state.pages.create(draft, &identity).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(page)))
}

pub async fn update(
    state: web::Data<AppState>,
    identity: Identity,
    slug: web::Path<String>,
    body: web::Json<UpdatePageRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let changes = PageChanges {
        status: parse_status(body.status.as_deref())?,
        title: body.title,
        content: body.content,
        excerpt: body.excerpt,
        order: body.order,
        show_in_sidebar: body.show_in_sidebar,
        meta_description: body.meta_description,
        featured_image: body.featured_image,
    };

    let page = state.pages.update(&slug, changes, &identity).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(page)))
}

pub async fn delete(
    state: web::Data<AppState>,
    identity: Identity,
    slug: web::Path<String>,
) -> AppResult<HttpResponse> {
    state.pages.delete(&slug, &identity).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(())))
}
