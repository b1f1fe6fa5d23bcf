use crate::{
    server::{
        Result, ServerError, ServerRouter,
        json::{Envelope, Json, reply},
    },
    service::{AuthHeaders, CommentService},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use blog_common::model::{
    Id,
    comment::{CommentContent, CommentMarker, CommentView, CreateComment},
    post::PostMarker,
};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_comment)
        .typed_get(get_comments)
        .typed_put(update_comment)
        .typed_delete(delete_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/comment", rejection(ServerError))]
struct CreateCommentPath();

async fn create_comment(
    CreateCommentPath(): CreateCommentPath,
    State(comments): State<CommentService>,
    headers: AuthHeaders,
    request: Result<Json<CreateComment>>,
) -> Result<Json<Envelope<CommentView>>> {
    // Credentials are checked before the body is parsed
    headers.credentials()?;
    let Json(request) = request?;

    Ok(reply(comments.create_comment(request, &headers).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/comment/{post_id}", rejection(ServerError))]
struct PostCommentsPath {
    post_id: Id<PostMarker>,
}

async fn get_comments(
    PostCommentsPath { post_id }: PostCommentsPath,
    State(comments): State<CommentService>,
) -> Result<Json<Envelope<Vec<CommentView>>>> {
    Ok(reply(comments.get_comments(post_id).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/comment/{id}", rejection(ServerError))]
struct CommentPath {
    id: Id<CommentMarker>,
}

async fn update_comment(
    CommentPath { id }: CommentPath,
    State(comments): State<CommentService>,
    headers: AuthHeaders,
    content: Result<Json<CommentContent>>,
) -> Result<Json<Envelope<CommentView>>> {
    headers.credentials()?;
    let Json(content) = content?;

    Ok(reply(comments.update_comment(id, content, &headers).await?))
}

async fn delete_comment(
    CommentPath { id }: CommentPath,
    State(comments): State<CommentService>,
    headers: AuthHeaders,
) -> Result<Json<Envelope<&'static str>>> {
    Ok(reply(comments.delete_comment(id, &headers).await?))
}

#[cfg(test)]
mod tests {
    use crate::{
        server::{
            auth::REFRESH_TOKEN,
            test_support::{app, body_json},
        },
        service::test_support::Fixture,
    };
    use axum::{
        body::Body,
        http::{
            Request, StatusCode,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
    };
    use blog_common::model::post::PostContent;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn comments_are_created_and_listed() {
        let fixture = Fixture::new();
        let (_, headers) = fixture.login("writer").await;
        let post = fixture
            .posts
            .create_post(PostContent::default(), None, &headers)
            .await
            .unwrap();
        let app = app(&fixture);

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/auth/comment")
                    .header(CONTENT_TYPE, "application/json")
                    .header(AUTHORIZATION, headers.authorization.as_deref().unwrap())
                    .header(&REFRESH_TOKEN, headers.refresh_token.as_deref().unwrap())
                    .body(Body::from(
                        json!({ "post_id": post.id, "content": "nice post" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["content"], "nice post");

        let response = app
            .oneshot(
                Request::get(format!("/api/comment/{}", post.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["author"], "writer");
        assert_eq!(body["data"][0]["sub_comments"], json!([]));
    }

    #[tokio::test]
    async fn deleting_needs_credentials() {
        let fixture = Fixture::new();
        let response = app(&fixture)
            .oneshot(
                Request::delete("/api/auth/comment/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "MEMBER_NOT_FOUND");
    }

    #[tokio::test]
    async fn writes_check_credentials_before_the_body() {
        let fixture = Fixture::new();
        let app = app(&fixture);

        for (request, body) in [
            (Request::post("/api/auth/comment"), "{}"),
            (Request::post("/api/auth/comment"), ""),
            (Request::put("/api/auth/comment/1"), "not json"),
            (Request::put("/api/auth/comment/1"), ""),
        ] {
            let response = app
                .clone()
                .oneshot(
                    request
                        .header(CONTENT_TYPE, "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(response).await["error"]["code"], "MEMBER_NOT_FOUND");
        }
    }
}
