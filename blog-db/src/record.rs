use blog_common::model::{
    Id, ModelValidationError,
    auth::StoredRefreshToken,
    comment::{Comment, CommentParts},
    member::{Member, Nickname, PasswordDigest},
    post::{Post, PostParts},
    sub_comment::{SubComment, SubCommentParts},
};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct MemberRecord {
    pub member_id: i64,
    pub nickname: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct MemberCredentialsRecord {
    #[sqlx(flatten)]
    pub member: MemberRecord,
    pub password_salt: Vec<u8>,
    pub password_hash: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct RefreshTokenRecord {
    pub member_id: i64,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_after_seconds: Option<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub member_id: i64,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub member_id: i64,
    pub content: String,
    pub heart: i64,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct SubCommentRecord {
    pub sub_comment_id: i64,
    pub comment_id: i64,
    pub member_id: i64,
    pub content: String,
    pub heart: i64,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CountRecord {
    pub id: i64,
    pub count: i64,
}

fn heart_count(value: i64) -> Result<u64, ModelValidationError> {
    u64::try_from(value).map_err(|_| ModelValidationError::NegativeHeartCount(value))
}

/// The value stored in a `heart` column.
pub(crate) fn heart_column(heart: u64) -> i64 {
    i64::try_from(heart).unwrap_or(i64::MAX)
}

impl TryFrom<MemberRecord> for Member {
    type Error = ModelValidationError;

    fn try_from(value: MemberRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_i64(value.member_id),
            nickname: Nickname::new(value.nickname)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<MemberCredentialsRecord> for (Member, PasswordDigest) {
    type Error = ModelValidationError;

    fn try_from(value: MemberCredentialsRecord) -> Result<Self, Self::Error> {
        let digest = PasswordDigest::from_parts(&value.password_salt, &value.password_hash)?;
        Ok((value.member.try_into()?, digest))
    }
}

impl TryFrom<RefreshTokenRecord> for StoredRefreshToken {
    type Error = ModelValidationError;

    fn try_from(value: RefreshTokenRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            member: Id::from_i64(value.member_id),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at,
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}

impl From<PostRecord> for Post {
    fn from(value: PostRecord) -> Self {
        PostParts {
            id: Id::from_i64(value.post_id),
            author: Id::from_i64(value.member_id),
            title: value.title,
            content: value.content,
            image_url: value.image_url,
            created_at: value.created_at,
            modified_at: value.modified_at,
        }
        .into()
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(CommentParts {
            id: Id::from_i64(value.comment_id),
            post: Id::from_i64(value.post_id),
            author: Id::from_i64(value.member_id),
            content: value.content,
            heart: heart_count(value.heart)?,
            created_at: value.created_at,
            modified_at: value.modified_at,
        }
        .into())
    }
}

impl TryFrom<SubCommentRecord> for SubComment {
    type Error = ModelValidationError;

    fn try_from(value: SubCommentRecord) -> Result<Self, Self::Error> {
        Ok(SubCommentParts {
            id: Id::from_i64(value.sub_comment_id),
            comment: Id::from_i64(value.comment_id),
            author: Id::from_i64(value.member_id),
            content: value.content,
            heart: heart_count(value.heart)?,
            created_at: value.created_at,
            modified_at: value.modified_at,
        }
        .into())
    }
}
