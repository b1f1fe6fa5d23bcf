use crate::service::{
    CommentService, HeartService, MemberService, PostService, ServiceError, SubCommentService,
};
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
};
use json::{Envelope, Json};
use thiserror::Error;
use tracing::{error, warn};

mod auth;
mod json;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub members: MemberService,
    pub posts: PostService,
    pub comments: CommentService,
    pub sub_comments: SubCommentService,
    pub hearts: HeartService,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// Request bodies above `max_body_bytes` are rejected by the extractors, so
/// the rejection still goes through [`ServerError`].
pub fn app(state: ServerState, max_body_bytes: usize) -> Router {
    routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Multipart request rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading multipart request failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Multipart field {0} is missing")]
    MissingField(&'static str),
    #[error("Multipart field {field} is not valid JSON: {source}")]
    InvalidField {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Token could not be put into a response header: {0}")]
    ResponseHeader(#[from] InvalidHeaderValue),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::JsonRejection(rejection) => rejection.status(),
            ServerError::MultipartRejection(rejection) => rejection.status(),
            ServerError::Multipart(err) => err.status(),
            ServerError::MissingField(_) | ServerError::InvalidField { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServerError::JsonResponse(_) | ServerError::ResponseHeader(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Service(err) => err.status(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::JsonRejection(_) | ServerError::Multipart(_)
                if self.status() == StatusCode::PAYLOAD_TOO_LARGE =>
            {
                "PAYLOAD_TOO_LARGE"
            }
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => "NOT_FOUND",
            ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_)
            | ServerError::MissingField(_)
            | ServerError::InvalidField { .. } => "BAD_REQUEST",
            ServerError::JsonResponse(_) | ServerError::ResponseHeader(_) => {
                "INTERNAL_SERVER_ERROR"
            }
            ServerError::Service(err) => err.code(),
        }
    }

    fn public_message(&self) -> String {
        match self {
            ServerError::Service(err) => err.public_message(),
            ServerError::JsonResponse(_) | ServerError::ResponseHeader(_) => {
                "Internal server error".to_owned()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            warn!(error = %self, %status, "Replying with error");
        }

        let envelope = Envelope::<()>::failure(self.code(), self.public_message());
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{server::ServerState, service::test_support::Fixture};
    use axum::{Router, body::to_bytes, response::Response};
    use serde_json::Value;

    const MAX_BODY_BYTES: usize = 1024 * 1024;

    pub fn app(fixture: &Fixture) -> Router {
        limited_app(fixture, MAX_BODY_BYTES)
    }

    pub fn limited_app(fixture: &Fixture, max_body_bytes: usize) -> Router {
        super::app(
            ServerState {
                members: fixture.members.clone(),
                posts: fixture.posts.clone(),
                comments: fixture.comments.clone(),
                sub_comments: fixture.sub_comments.clone(),
                hearts: fixture.hearts.clone(),
            },
            max_body_bytes,
        )
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
