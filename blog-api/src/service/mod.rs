//! Use cases of the blog. Every call runs inside one unit of work.

use crate::{
    service::token::{TokenError, TokenProvider},
    storage::StorageError,
};
use axum::http::StatusCode;
use blog_common::model::{
    Id,
    comment::CommentMarker,
    member::{Member, MemberMarker, Nickname, PasswordHashError},
    post::PostMarker,
    sub_comment::SubCommentMarker,
};
use blog_db::{DbError, UnitOfWork};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

pub mod comment;
pub mod heart;
pub mod member;
pub mod post;
pub mod sub_comment;
pub mod token;

pub use comment::CommentService;
pub use heart::HeartService;
pub use member::MemberService;
pub use post::PostService;
pub use sub_comment::SubCommentService;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

pub const DELETE_SUCCESS: &str = "delete success";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Login is required")]
    MissingCredentials,
    #[error("The token is invalid")]
    InvalidToken,
    #[error("Post {0} does not exist")]
    PostNotFound(Id<PostMarker>),
    #[error("Comment {0} does not exist")]
    CommentNotFound(Id<CommentMarker>),
    #[error("Sub-comment {0} does not exist")]
    SubCommentNotFound(Id<SubCommentMarker>),
    #[error("Only the author may change this")]
    Forbidden,
    #[error("Uploading {file_name} failed")]
    UploadFailed {
        file_name: String,
        source: StorageError,
    },
    #[error("Nickname {} is already taken", .0.get())]
    DuplicateNickname(Nickname),
    #[error("Password and confirmation do not match")]
    PasswordsNotEqual,
    #[error("Nickname or password is wrong")]
    BadCredentials,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
}

impl ServiceError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::MissingCredentials => "MEMBER_NOT_FOUND",
            ServiceError::InvalidToken => "INVALID_TOKEN",
            ServiceError::PostNotFound(_) => "POST_NOT_FOUND",
            ServiceError::CommentNotFound(_) => "COMMENT_NOT_FOUND",
            ServiceError::SubCommentNotFound(_) => "SUB_COMMENT_NOT_FOUND",
            ServiceError::Forbidden => "FORBIDDEN",
            ServiceError::UploadFailed { .. } => "UPLOAD_FAILED",
            ServiceError::DuplicateNickname(_) => "DUPLICATE_NICKNAME",
            ServiceError::PasswordsNotEqual => "PASSWORDS_NOT_EQUAL",
            ServiceError::BadCredentials => "BAD_CREDENTIALS",
            ServiceError::Database(_)
            | ServiceError::Token(_)
            | ServiceError::PasswordHash(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MissingCredentials
            | ServiceError::InvalidToken
            | ServiceError::BadCredentials => StatusCode::UNAUTHORIZED,
            ServiceError::PostNotFound(_)
            | ServiceError::CommentNotFound(_)
            | ServiceError::SubCommentNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::UploadFailed { .. } | ServiceError::PasswordsNotEqual => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::DuplicateNickname(_) => StatusCode::CONFLICT,
            ServiceError::Database(_)
            | ServiceError::Token(_)
            | ServiceError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to clients. Internal failures are not described.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Database(_)
            | ServiceError::Token(_)
            | ServiceError::PasswordHash(_) => "Internal server error".to_owned(),
            _ => self.to_string(),
        }
    }
}

/// Raw values of the `Authorization` and `Refresh-Token` request headers.
#[derive(Clone, Eq, PartialEq, Default, Hash)]
pub struct AuthHeaders {
    pub authorization: Option<String>,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHeaders")
            .field("authorization", &self.authorization.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Both auth headers, known to be present and non-empty.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Credentials<'a> {
    authorization: &'a str,
    refresh_token: &'a str,
}

impl AuthHeaders {
    /// Fails with [`ServiceError::MissingCredentials`] unless both headers are
    /// present and non-empty. Touches no storage.
    pub fn credentials(&self) -> Result<Credentials<'_>> {
        fn non_empty(value: Option<&str>) -> Option<&str> {
            value.filter(|value| !value.is_empty())
        }

        match (
            non_empty(self.authorization.as_deref()),
            non_empty(self.refresh_token.as_deref()),
        ) {
            (Some(authorization), Some(refresh_token)) => Ok(Credentials {
                authorization,
                refresh_token,
            }),
            _ => {
                debug!("Rejecting request without auth headers");
                Err(ServiceError::MissingCredentials)
            }
        }
    }
}

/// Resolves the member both tokens belong to.
pub async fn authenticate(
    tokens: &TokenProvider,
    uow: &mut dyn UnitOfWork,
    credentials: Credentials<'_>,
) -> Result<Member> {
    let Some(refresh_member) = tokens
        .validate_token(uow, credentials.refresh_token)
        .await?
    else {
        return Err(ServiceError::InvalidToken);
    };

    let Some(access_member) = tokens.member_id_from_access_token(credentials.authorization)
    else {
        return Err(ServiceError::InvalidToken);
    };

    if refresh_member != access_member {
        warn!(
            %refresh_member,
            %access_member,
            "Access and refresh token belong to different members"
        );
        return Err(ServiceError::InvalidToken);
    }

    uow.fetch_member(access_member)
        .await?
        .ok_or(ServiceError::InvalidToken)
}

pub(crate) fn nickname_of(
    members: &HashMap<Id<MemberMarker>, Member>,
    id: Id<MemberMarker>,
) -> Result<Nickname> {
    members
        .get(&id)
        .map(|member| member.nickname.clone())
        .ok_or_else(|| DbError::DanglingReference(format!("member {id}")).into())
}
