use crate::{
    server::{
        Result, ServerError, ServerRouter,
        json::{Envelope, Json, reply},
    },
    service::{AuthHeaders, SubCommentService},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use blog_common::model::{
    Id,
    sub_comment::{CreateSubComment, SubCommentContent, SubCommentMarker, SubCommentView},
};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_sub_comment)
        .typed_put(update_sub_comment)
        .typed_delete(delete_sub_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/sub-comment", rejection(ServerError))]
struct CreateSubCommentPath();

async fn create_sub_comment(
    CreateSubCommentPath(): CreateSubCommentPath,
    State(sub_comments): State<SubCommentService>,
    headers: AuthHeaders,
    request: Result<Json<CreateSubComment>>,
) -> Result<Json<Envelope<SubCommentView>>> {
    headers.credentials()?;
    let Json(request) = request?;

    Ok(reply(
        sub_comments.create_sub_comment(request, &headers).await?,
    ))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/sub-comment/{id}", rejection(ServerError))]
struct SubCommentPath {
    id: Id<SubCommentMarker>,
}

async fn update_sub_comment(
    SubCommentPath { id }: SubCommentPath,
    State(sub_comments): State<SubCommentService>,
    headers: AuthHeaders,
    content: Result<Json<SubCommentContent>>,
) -> Result<Json<Envelope<SubCommentView>>> {
    headers.credentials()?;
    let Json(content) = content?;

    Ok(reply(
        sub_comments
            .update_sub_comment(id, content, &headers)
            .await?,
    ))
}

async fn delete_sub_comment(
    SubCommentPath { id }: SubCommentPath,
    State(sub_comments): State<SubCommentService>,
    headers: AuthHeaders,
) -> Result<Json<Envelope<&'static str>>> {
    Ok(reply(sub_comments.delete_sub_comment(id, &headers).await?))
}
