use crate::{
    server::{
        Result, ServerError, ServerRouter,
        json::{Envelope, Json, reply},
    },
    service::{AuthHeaders, PostService},
    storage::ImageUpload,
};
use axum::extract::{
    Multipart, State,
    multipart::{Field, MultipartRejection},
};
use axum_extra::routing::{RouterExt, TypedPath};
use blog_common::model::{
    Id,
    post::{Post, PostContent, PostDetail, PostListItem, PostMarker, PostSummary},
};
use serde::Deserialize;
use tracing::debug;

const DATA_FIELD: &str = "data";
const IMAGE_FIELD: &str = "image";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(get_all_posts)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_put(update_image)
        .typed_delete(delete_post)
}

/// The parts of a multipart post form.
#[derive(Debug, Default)]
struct PostForm {
    data: Option<PostContent>,
    image: Option<ImageUpload>,
}

impl PostForm {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self> {
        let mut multipart = multipart?;
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(ToOwned::to_owned);
            match name.as_deref() {
                Some(DATA_FIELD) => {
                    let bytes = field.bytes().await?;
                    let data = serde_json::from_slice(&bytes).map_err(|source| {
                        ServerError::InvalidField {
                            field: DATA_FIELD,
                            source,
                        }
                    })?;
                    form.data = Some(data);
                }
                Some(IMAGE_FIELD) => form.image = Some(read_image(field).await?),
                other => debug!(field = ?other, "Ignoring unknown multipart field"),
            }
        }

        Ok(form)
    }
}

async fn read_image(field: Field<'_>) -> Result<ImageUpload> {
    let file_name = field.file_name().unwrap_or_default().to_owned();
    let content_type = field.content_type().map(ToOwned::to_owned);
    let bytes = field.bytes().await?;

    Ok(ImageUpload {
        file_name,
        content_type,
        bytes,
    })
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/post", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(posts): State<PostService>,
    headers: AuthHeaders,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope<PostSummary>>> {
    // Credentials are checked before the body is read
    headers.credentials()?;
    let form = PostForm::read(multipart).await?;
    let data = form.data.ok_or(ServerError::MissingField(DATA_FIELD))?;

    Ok(reply(posts.create_post(data, form.image, &headers).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/post", rejection(ServerError))]
struct PostsPath();

async fn get_all_posts(
    PostsPath(): PostsPath,
    State(posts): State<PostService>,
) -> Result<Json<Envelope<Vec<PostListItem>>>> {
    Ok(reply(posts.get_all_posts().await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/post/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(posts): State<PostService>,
) -> Result<Json<Envelope<PostDetail>>> {
    Ok(reply(posts.get_post(id).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/post/{id}", rejection(ServerError))]
struct AuthPostPath {
    id: Id<PostMarker>,
}

async fn update_post(
    AuthPostPath { id }: AuthPostPath,
    State(posts): State<PostService>,
    headers: AuthHeaders,
    content: Result<Json<PostContent>>,
) -> Result<Json<Envelope<Post>>> {
    headers.credentials()?;
    let Json(content) = content?;

    Ok(reply(posts.update_post(id, content, &headers).await?))
}

async fn delete_post(
    AuthPostPath { id }: AuthPostPath,
    State(posts): State<PostService>,
    headers: AuthHeaders,
) -> Result<Json<Envelope<&'static str>>> {
    Ok(reply(posts.delete_post(id, &headers).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/post/{id}/image", rejection(ServerError))]
struct PostImagePath {
    id: Id<PostMarker>,
}

/// A form without an `image` part clears the image.
async fn update_image(
    PostImagePath { id }: PostImagePath,
    State(posts): State<PostService>,
    headers: AuthHeaders,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope<Post>>> {
    headers.credentials()?;
    let form = PostForm::read(multipart).await?;

    Ok(reply(posts.update_image(id, form.image, &headers).await?))
}

#[cfg(test)]
mod tests {
    use crate::{
        server::{
            auth::REFRESH_TOKEN,
            test_support::{app, body_json},
        },
        service::{AuthHeaders, test_support::Fixture},
    };
    use axum::{
        body::Body,
        http::{
            Method, Request, StatusCode,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "blog-test-boundary";

    fn multipart_body(data: Option<&str>, image: Option<(&str, &str)>) -> String {
        let mut body = String::new();
        if let Some(data) = data {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"data\"\r\n\
                 Content-Type: application/json\r\n\r\n{data}\r\n"
            ));
        }
        if let Some((file_name, contents)) = image {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n{contents}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn request(method: Method, uri: &str, headers: &AuthHeaders, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(authorization) = &headers.authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(refresh_token) = &headers.refresh_token {
            builder = builder.header(&REFRESH_TOKEN, refresh_token);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn posts_are_created_from_multipart_forms() {
        let fixture = Fixture::new();
        let (_, headers) = fixture.login("writer").await;
        let app = app(&fixture);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/auth/post",
                &headers,
                multipart_body(
                    Some(r#"{"title":"hello","content":"world"}"#),
                    Some(("cat.png", "not really a png")),
                ),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["data"]["title"], "hello");
        assert_eq!(created["data"]["author"], "writer");
        let image_url = created["data"]["image_url"].as_str().unwrap();
        assert!(image_url.starts_with("memory://test-bucket/images/cat_"));
        assert_eq!(fixture.storage.len(), 1);

        let id = &created["data"]["id"];
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/post/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let detail = body_json(response).await;
        assert_eq!(detail["data"]["content"], "world");
        assert_eq!(detail["data"]["heart"], 0);
        assert_eq!(detail["data"]["comments"], Value::Array(Vec::new()));

        let response = app
            .oneshot(Request::get("/api/post").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let list = body_json(response).await;
        assert_eq!(list["data"][0]["id"], *id);
        assert_eq!(list["data"][0]["comment_count"], 0);
    }

    #[tokio::test]
    async fn forms_need_credentials_and_data() {
        let fixture = Fixture::new();
        let (_, headers) = fixture.login("writer").await;
        let app = app(&fixture);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/auth/post",
                &AuthHeaders::default(),
                multipart_body(Some(r#"{"title":"t","content":"c"}"#), None),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "MEMBER_NOT_FOUND");

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/auth/post",
                &headers,
                multipart_body(None, Some(("cat.png", "png"))),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
        assert!(fixture.storage.is_empty());
    }

    #[tokio::test]
    async fn unknown_posts_are_reported() {
        let fixture = Fixture::new();
        let (_, headers) = fixture.login("writer").await;
        let app = app(&fixture);

        let response = app
            .clone()
            .oneshot(Request::get("/api/post/12345").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "POST_NOT_FOUND");

        let response = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                "/api/auth/post/12345",
                &headers,
                String::new(),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["error"]["code"], "POST_NOT_FOUND");

        let response = app
            .oneshot(Request::get("/api/post/not-a-number").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn images_are_replaced_and_cleared() {
        let fixture = Fixture::new();
        let (_, headers) = fixture.login("writer").await;
        let app = app(&fixture);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/auth/post",
                &headers,
                multipart_body(Some(r#"{"title":"t","content":"c"}"#), None),
            ))
            .await
            .unwrap();
        let created = body_json(response).await;
        assert_eq!(created["data"]["image_url"], Value::Null);
        let id = &created["data"]["id"];

        let response = app
            .clone()
            .oneshot(request(
                Method::PUT,
                &format!("/api/auth/post/{id}/image"),
                &headers,
                multipart_body(None, Some(("dog.jpg", "jpeg bytes"))),
            ))
            .await
            .unwrap();
        let updated = body_json(response).await;
        assert!(
            updated["data"]["image_url"]
                .as_str()
                .unwrap()
                .contains("/images/dog_")
        );

        let response = app
            .oneshot(request(
                Method::PUT,
                &format!("/api/auth/post/{id}/image"),
                &headers,
                multipart_body(None, None),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["data"]["image_url"], Value::Null);
    }

    #[tokio::test]
    async fn content_updates_check_credentials_before_the_body() {
        let fixture = Fixture::new();
        let app = app(&fixture);

        let response = app
            .clone()
            .oneshot(Request::put("/api/auth/post/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "MEMBER_NOT_FOUND");

        let response = app
            .oneshot(
                Request::put("/api/auth/post/1")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "MEMBER_NOT_FOUND");
    }
}
