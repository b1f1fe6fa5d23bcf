use crate::{
    server::{
        Result, ServerError, ServerRouter,
        json::{Envelope, Json, reply},
    },
    service::{AuthHeaders, HeartService},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use blog_common::model::{
    Id,
    comment::CommentMarker,
    heart::{HeartTarget, HeartView},
    post::PostMarker,
    sub_comment::SubCommentMarker,
};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(heart::<PostHeartPath>)
        .typed_delete(unheart::<PostHeartPath>)
        .typed_post(heart::<CommentHeartPath>)
        .typed_delete(unheart::<CommentHeartPath>)
        .typed_post(heart::<SubCommentHeartPath>)
        .typed_delete(unheart::<SubCommentHeartPath>)
}

trait HeartPath {
    fn target(&self) -> HeartTarget;
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/heart/post/{id}", rejection(ServerError))]
struct PostHeartPath {
    id: Id<PostMarker>,
}

impl HeartPath for PostHeartPath {
    fn target(&self) -> HeartTarget {
        HeartTarget::Post(self.id)
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/heart/comment/{id}", rejection(ServerError))]
struct CommentHeartPath {
    id: Id<CommentMarker>,
}

impl HeartPath for CommentHeartPath {
    fn target(&self) -> HeartTarget {
        HeartTarget::Comment(self.id)
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/heart/sub-comment/{id}", rejection(ServerError))]
struct SubCommentHeartPath {
    id: Id<SubCommentMarker>,
}

impl HeartPath for SubCommentHeartPath {
    fn target(&self) -> HeartTarget {
        HeartTarget::SubComment(self.id)
    }
}

async fn heart<P: HeartPath>(
    path: P,
    State(hearts): State<HeartService>,
    headers: AuthHeaders,
) -> Result<Json<Envelope<HeartView>>> {
    Ok(reply(hearts.heart(path.target(), &headers).await?))
}

async fn unheart<P: HeartPath>(
    path: P,
    State(hearts): State<HeartService>,
    headers: AuthHeaders,
) -> Result<Json<Envelope<HeartView>>> {
    Ok(reply(hearts.unheart(path.target(), &headers).await?))
}
