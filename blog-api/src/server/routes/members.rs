use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::token_headers,
        json::{Envelope, Json, reply},
    },
    service::{AuthHeaders, MemberService},
};
use axum::{extract::State, response::IntoResponse};
use axum_extra::routing::{RouterExt, TypedPath};
use blog_common::model::member::{LoginRequest, Member, SignupRequest};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(signup)
        .typed_post(login)
        .typed_post(logout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/member/signup", rejection(ServerError))]
struct SignupPath();

async fn signup(
    SignupPath(): SignupPath,
    State(members): State<MemberService>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<Envelope<Member>>> {
    Ok(reply(members.signup(request).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/member/login", rejection(ServerError))]
struct LoginPath();

/// The token pair is sent in the `Authorization` and `Refresh-Token` headers.
async fn login(
    LoginPath(): LoginPath,
    State(members): State<MemberService>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let (member, pair) = members.login(request).await?;

    Ok((token_headers(&pair)?, reply(member)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/member/logout", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(members): State<MemberService>,
    headers: AuthHeaders,
) -> Result<Json<Envelope<Member>>> {
    Ok(reply(members.logout(&headers).await?))
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
        Router,
        body::Body,
        http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn post_json(app: &Router, uri: &str, body: &Value) -> Response {
        app.clone()
            .oneshot(
                Request::post(uri)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn signup_login_and_logout() {
        let fixture = Fixture::new();
        let app = app(&fixture);

        let response = post_json(
            &app,
            "/api/member/signup",
            &json!({ "nickname": "writer", "password": "secret", "password_confirm": "secret" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["nickname"], "writer");

        let response = post_json(
            &app,
            "/api/member/signup",
            &json!({ "nickname": "writer", "password": "secret", "password_confirm": "secret" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "DUPLICATE_NICKNAME");

        let response = post_json(
            &app,
            "/api/member/login",
            &json!({ "nickname": "writer", "password": "wrong" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_CREDENTIALS");

        let response = post_json(
            &app,
            "/api/member/login",
            &json!({ "nickname": "writer", "password": "secret" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let access = response.headers()[AUTHORIZATION].clone();
        let refresh = response.headers()[&REFRESH_TOKEN].clone();
        assert!(access.to_str().unwrap().starts_with("Bearer "));

        let logout = |headers: bool| {
            let mut request = Request::post("/api/auth/member/logout");
            if headers {
                request = request
                    .header(AUTHORIZATION, access.clone())
                    .header(&REFRESH_TOKEN, refresh.clone());
            }
            app.clone().oneshot(request.body(Body::empty()).unwrap())
        };

        let response = logout(false).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "MEMBER_NOT_FOUND");

        let response = logout(true).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = logout(true).await.unwrap();
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn malformed_signups_are_rejected() {
        let fixture = Fixture::new();
        let response = post_json(
            &app(&fixture),
            "/api/member/signup",
            &json!({ "nickname": "x", "password": "secret", "password_confirm": "secret" }),
        )
        .await;

        assert!(response.status().is_client_error());
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
}
