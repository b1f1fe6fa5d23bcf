//! Repository layer shared by every backend.
//!
//! A service call opens one [`UnitOfWork`] through [`Store::begin`], performs
//! all of its reads and writes through it and finally calls
//! [`UnitOfWork::commit`]. Dropping an uncommitted unit of work discards all
//! of its writes.

use async_trait::async_trait;
use blog_common::{
    model::{
        BlogSnowflake, Id, ModelValidationError,
        auth::{RefreshTokenHash, StoredRefreshToken},
        comment::{Comment, CommentMarker},
        heart::{Heart, HeartTarget},
        member::{Member, MemberMarker, Nickname, PasswordDigest},
        post::{Post, PostMarker},
        sub_comment::{SubComment, SubCommentMarker},
    },
    snowflake::SnowflakeError,
};
use std::collections::HashMap;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeError),
    #[error("A unique constraint was violated: {0}")]
    Conflict(String),
    #[error("Stored data references a missing {0}")]
    DanglingReference(String),
    #[error("The unit of work was already committed")]
    Finished,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    fn generate_snowflake(&self) -> Result<BlogSnowflake>;
}

impl dyn Store + '_ {
    pub fn generate_id<Marker>(&self) -> Result<Id<Marker>> {
        self.generate_snowflake().map(Id::new)
    }
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn commit(&mut self) -> Result<()>;

    async fn insert_member(&mut self, member: &Member, digest: &PasswordDigest) -> Result<()>;
    async fn fetch_member(&mut self, id: Id<MemberMarker>) -> Result<Option<Member>>;
    async fn fetch_members(
        &mut self,
        ids: &[Id<MemberMarker>],
    ) -> Result<HashMap<Id<MemberMarker>, Member>>;
    async fn fetch_member_credentials(
        &mut self,
        nickname: &Nickname,
    ) -> Result<Option<(Member, PasswordDigest)>>;

    async fn insert_refresh_token(&mut self, token: &StoredRefreshToken) -> Result<()>;
    async fn fetch_refresh_token(
        &mut self,
        token_hash: &RefreshTokenHash,
    ) -> Result<Option<StoredRefreshToken>>;
    async fn delete_refresh_tokens(&mut self, member: Id<MemberMarker>) -> Result<u64>;

    async fn insert_post(&mut self, post: &Post) -> Result<()>;
    async fn fetch_post(&mut self, id: Id<PostMarker>) -> Result<Option<Post>>;
    /// Most recently modified first, ties broken by the newer id.
    async fn fetch_posts_by_modified_desc(&mut self) -> Result<Vec<Post>>;
    async fn update_post(&mut self, post: &Post) -> Result<()>;
    /// Also removes the post's comments, their sub-comments and all hearts
    /// attached to any of them.
    async fn delete_post(&mut self, id: Id<PostMarker>) -> Result<bool>;

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()>;
    async fn fetch_comment(&mut self, id: Id<CommentMarker>) -> Result<Option<Comment>>;
    /// Oldest first.
    async fn fetch_comments_by_post(&mut self, post: Id<PostMarker>) -> Result<Vec<Comment>>;
    async fn count_comments_by_posts(
        &mut self,
        posts: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>>;
    async fn update_comment(&mut self, comment: &Comment) -> Result<()>;
    async fn delete_comment(&mut self, id: Id<CommentMarker>) -> Result<bool>;

    async fn insert_sub_comment(&mut self, sub_comment: &SubComment) -> Result<()>;
    async fn fetch_sub_comment(
        &mut self,
        id: Id<SubCommentMarker>,
    ) -> Result<Option<SubComment>>;
    /// Oldest first.
    async fn fetch_sub_comments_by_comments(
        &mut self,
        comments: &[Id<CommentMarker>],
    ) -> Result<Vec<SubComment>>;
    async fn update_sub_comment(&mut self, sub_comment: &SubComment) -> Result<()>;
    async fn delete_sub_comment(&mut self, id: Id<SubCommentMarker>) -> Result<bool>;

    /// Returns `false` if the heart already existed.
    async fn insert_heart(&mut self, heart: &Heart) -> Result<bool>;
    /// Returns `false` if there was no such heart.
    async fn delete_heart(&mut self, heart: &Heart) -> Result<bool>;
    async fn heart_exists(&mut self, heart: &Heart) -> Result<bool>;
    async fn count_hearts(&mut self, target: HeartTarget) -> Result<u64>;
    async fn count_post_hearts(
        &mut self,
        posts: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>>;
}
