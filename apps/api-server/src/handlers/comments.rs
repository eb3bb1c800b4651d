//! Comment endpoints: public threads and the moderation queue.

use actix_web::{HttpResponse, web};

use quill_core::domain::{CommentAuthor, CommentSubmission};
use quill_shared::ApiResponse;
use quill_shared::dto::{CommentRef, CreateCommentRequest};

use crate::middleware::{AppResult, Identity};
use crate::state::AppState;

/// GET /api/posts/{slug}/comments
pub async fn thread(state: web::Data<AppState>, slug: web::Path<String>) -> AppResult<HttpResponse> {
    let threads = state.comments.thread(&slug).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(threads)))
}

/// POST /api/posts/{slug}/comments
pub async fn submit(
    state: web::Data<AppState>,
    slug: web::Path<String>,
    body: web::Json<CreateCommentRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let submission = CommentSubmission {
        author: CommentAuthor {
            name: body.author.name.trim().to_string(),
            email: body.author.email.trim().to_string(),
            avatar: body.author.avatar,
        },
        content: body.content,
        parent_id: body.parent_id.filter(|id| !id.is_empty()),
    };

    let comment = state.comments.submit(&slug, submission).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok_with_message(
        comment,
        "Comment submitted successfully. It will appear after approval.",
    )))
}

/// GET /api/comments
pub async fn list_all(state: web::Data<AppState>, identity: Identity) -> AppResult<HttpResponse> {
    let comments = state.comments.list_all(&identity).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(comments)))
}

/// PUT /api/comments
pub async fn approve(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CommentRef>,
) -> AppResult<HttpResponse> {
    let comment = state
        .comments
        .approve(&identity, &body.comment_id, &body.post_id)
        .await?;
    tracing::info!(comment_id = %comment.id, by = %identity.email, "Comment approved");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(comment)))
}

/// DELETE /api/comments
pub async fn delete(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CommentRef>,
) -> AppResult<HttpResponse> {
    state
        .comments
        .delete(&identity, &body.comment_id, &body.post_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(())))
}
