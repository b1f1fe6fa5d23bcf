use crate::{
    record::{
        CommentRecord, CountRecord, MemberCredentialsRecord, MemberRecord, PostRecord,
        RefreshTokenRecord, SubCommentRecord, heart_column,
    },
    store::{DbError, Result, Store, UnitOfWork},
};
use async_trait::async_trait;
use blog_common::model::{
    BlogSnowflake, BlogSnowflakeGenerator, Id,
    auth::{RefreshTokenHash, StoredRefreshToken},
    comment::{Comment, CommentMarker},
    heart::{Heart, HeartTarget},
    member::{Member, MemberMarker, Nickname, PasswordDigest},
    post::{Post, PostMarker},
    sub_comment::{SubComment, SubCommentMarker},
};
use sqlx::{
    PgConnection, PgPool, Postgres, Transaction, postgres::PgPoolOptions, query, query_as,
    query_scalar,
};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, info};

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<BlogSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, snowflake_generator: BlogSnowflakeGenerator) -> Self {
        Self {
            pool,
            snowflake_generator: Mutex::new(snowflake_generator),
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        snowflake_generator: BlogSnowflakeGenerator,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, snowflake_generator))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations are up to date");

        Ok(())
    }
}

#[async_trait]
impl Store for DbClient {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }

    fn generate_snowflake(&self) -> Result<BlogSnowflake> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake)
    }
}

/// A unit of work backed by one PostgreSQL transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(DbError::Finished)
    }
}

fn map_unique_violation(error: sqlx::Error) -> DbError {
    match &error {
        sqlx::Error::Database(database_error) if database_error.is_unique_violation() => {
            DbError::Conflict(database_error.message().to_owned())
        }
        _ => DbError::Sqlx(error),
    }
}

fn to_i64s<Marker>(ids: &[Id<Marker>]) -> Vec<i64> {
    ids.iter().map(|id| id.as_i64()).collect()
}

fn to_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

fn to_counts<Marker>(records: Vec<CountRecord>) -> HashMap<Id<Marker>, u64> {
    records
        .into_iter()
        .map(|record| (Id::from_i64(record.id), to_count(record.count)))
        .collect()
}

struct HeartQueries {
    insert: &'static str,
    delete: &'static str,
    exists: &'static str,
    count: &'static str,
}

macro_rules! heart_queries {
    ($table:literal, $column:literal) => {
        HeartQueries {
            insert: concat!(
                "INSERT INTO ", $table, " (member_id, ", $column, ", created_at) ",
                "VALUES ($1, $2, now()) ON CONFLICT DO NOTHING"
            ),
            delete: concat!(
                "DELETE FROM ", $table, " WHERE member_id = $1 AND ", $column, " = $2"
            ),
            exists: concat!(
                "SELECT EXISTS (SELECT 1 FROM ", $table,
                " WHERE member_id = $1 AND ", $column, " = $2)"
            ),
            count: concat!("SELECT COUNT(*) FROM ", $table, " WHERE ", $column, " = $1"),
        }
    };
}

static POST_HEARTS: HeartQueries = heart_queries!("heart_posts", "post_id");
static COMMENT_HEARTS: HeartQueries = heart_queries!("heart_comments", "comment_id");
static SUB_COMMENT_HEARTS: HeartQueries = heart_queries!("heart_sub_comments", "sub_comment_id");

fn heart_queries(target: HeartTarget) -> (&'static HeartQueries, i64) {
    match target {
        HeartTarget::Post(id) => (&POST_HEARTS, id.as_i64()),
        HeartTarget::Comment(id) => (&COMMENT_HEARTS, id.as_i64()),
        HeartTarget::SubComment(id) => (&SUB_COMMENT_HEARTS, id.as_i64()),
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DbError::Finished)?;
        tx.commit().await?;
        debug!("Committed transaction");

        Ok(())
    }

    async fn insert_member(&mut self, member: &Member, digest: &PasswordDigest) -> Result<()> {
        query(
            "
            INSERT INTO members (member_id, nickname, password_salt, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(member.id.as_i64())
        .bind(member.nickname.get())
        .bind(digest.salt())
        .bind(digest.hash())
        .bind(member.created_at)
        .execute(self.conn()?)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn fetch_member(&mut self, id: Id<MemberMarker>) -> Result<Option<Member>> {
        let record = query_as::<_, MemberRecord>(
            "
            SELECT member_id, nickname, created_at
            FROM members
            WHERE member_id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(self.conn()?)
        .await?;

        let member = record.map(Member::try_from).transpose()?;
        Ok(member)
    }

    async fn fetch_members(
        &mut self,
        ids: &[Id<MemberMarker>],
    ) -> Result<HashMap<Id<MemberMarker>, Member>> {
        let records = query_as::<_, MemberRecord>(
            "
            SELECT member_id, nickname, created_at
            FROM members
            WHERE member_id = ANY($1)
            ",
        )
        .bind(to_i64s(ids))
        .fetch_all(self.conn()?)
        .await?;

        records
            .into_iter()
            .map(|record| -> Result<_> {
                let member = Member::try_from(record)?;
                Ok((member.id, member))
            })
            .collect()
    }

    async fn fetch_member_credentials(
        &mut self,
        nickname: &Nickname,
    ) -> Result<Option<(Member, PasswordDigest)>> {
        let record = query_as::<_, MemberCredentialsRecord>(
            "
            SELECT member_id, nickname, created_at, password_salt, password_hash
            FROM members
            WHERE nickname = $1
            ",
        )
        .bind(nickname.get())
        .fetch_optional(self.conn()?)
        .await?;

        let credentials = record
            .map(<(Member, PasswordDigest)>::try_from)
            .transpose()?;
        Ok(credentials)
    }

    async fn insert_refresh_token(&mut self, token: &StoredRefreshToken) -> Result<()> {
        query(
            "
            INSERT INTO refresh_tokens (token_hash, member_id, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(token.token_hash.as_bytes())
        .bind(token.member.as_i64())
        .bind(token.created_at)
        .bind(token.expires_after.map(|duration| duration.whole_seconds()))
        .execute(self.conn()?)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn fetch_refresh_token(
        &mut self,
        token_hash: &RefreshTokenHash,
    ) -> Result<Option<StoredRefreshToken>> {
        let record = query_as::<_, RefreshTokenRecord>(
            "
            SELECT member_id, token_hash, created_at, expires_after_seconds
            FROM refresh_tokens
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.as_bytes())
        .fetch_optional(self.conn()?)
        .await?;

        let token = record.map(StoredRefreshToken::try_from).transpose()?;
        Ok(token)
    }

    async fn delete_refresh_tokens(&mut self, member: Id<MemberMarker>) -> Result<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE member_id = $1")
            .bind(member.as_i64())
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_post(&mut self, post: &Post) -> Result<()> {
        query(
            "
            INSERT INTO posts (post_id, member_id, title, content, image_url, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(post.id().as_i64())
        .bind(post.author().as_i64())
        .bind(post.title())
        .bind(post.content())
        .bind(post.image_url())
        .bind(post.created_at())
        .bind(post.modified_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn fetch_post(&mut self, id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT post_id, member_id, title, content, image_url, created_at, modified_at
            FROM posts
            WHERE post_id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(self.conn()?)
        .await?;

        Ok(record.map(Post::from))
    }

    async fn fetch_posts_by_modified_desc(&mut self) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT post_id, member_id, title, content, image_url, created_at, modified_at
            FROM posts
            ORDER BY modified_at DESC, post_id DESC
            ",
        )
        .fetch_all(self.conn()?)
        .await?;

        Ok(records.into_iter().map(Post::from).collect())
    }

    async fn update_post(&mut self, post: &Post) -> Result<()> {
        query(
            "
            UPDATE posts
            SET title = $2, content = $3, image_url = $4, modified_at = $5
            WHERE post_id = $1
            ",
        )
        .bind(post.id().as_i64())
        .bind(post.title())
        .bind(post.content())
        .bind(post.image_url())
        .bind(post.modified_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn delete_post(&mut self, id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts WHERE post_id = $1")
            .bind(id.as_i64())
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        query(
            "
            INSERT INTO comments (comment_id, post_id, member_id, content, heart, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(comment.id().as_i64())
        .bind(comment.post().as_i64())
        .bind(comment.author().as_i64())
        .bind(comment.content())
        .bind(heart_column(comment.heart()))
        .bind(comment.created_at())
        .bind(comment.modified_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn fetch_comment(&mut self, id: Id<CommentMarker>) -> Result<Option<Comment>> {
        let record = query_as::<_, CommentRecord>(
            "
            SELECT comment_id, post_id, member_id, content, heart, created_at, modified_at
            FROM comments
            WHERE comment_id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(self.conn()?)
        .await?;

        let comment = record.map(Comment::try_from).transpose()?;
        Ok(comment)
    }

    async fn fetch_comments_by_post(&mut self, post: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT comment_id, post_id, member_id, content, heart, created_at, modified_at
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at, comment_id
            ",
        )
        .bind(post.as_i64())
        .fetch_all(self.conn()?)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    async fn count_comments_by_posts(
        &mut self,
        posts: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>> {
        let records = query_as::<_, CountRecord>(
            "
            SELECT post_id AS id, COUNT(*) AS count
            FROM comments
            WHERE post_id = ANY($1)
            GROUP BY post_id
            ",
        )
        .bind(to_i64s(posts))
        .fetch_all(self.conn()?)
        .await?;

        Ok(to_counts(records))
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        query(
            "
            UPDATE comments
            SET content = $2, heart = $3, modified_at = $4
            WHERE comment_id = $1
            ",
        )
        .bind(comment.id().as_i64())
        .bind(comment.content())
        .bind(heart_column(comment.heart()))
        .bind(comment.modified_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn delete_comment(&mut self, id: Id<CommentMarker>) -> Result<bool> {
        let result = query("DELETE FROM comments WHERE comment_id = $1")
            .bind(id.as_i64())
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_sub_comment(&mut self, sub_comment: &SubComment) -> Result<()> {
        query(
            "
            INSERT INTO sub_comments
                (sub_comment_id, comment_id, member_id, content, heart, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(sub_comment.id().as_i64())
        .bind(sub_comment.comment().as_i64())
        .bind(sub_comment.author().as_i64())
        .bind(sub_comment.content())
        .bind(heart_column(sub_comment.heart()))
        .bind(sub_comment.created_at())
        .bind(sub_comment.modified_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn fetch_sub_comment(
        &mut self,
        id: Id<SubCommentMarker>,
    ) -> Result<Option<SubComment>> {
        let record = query_as::<_, SubCommentRecord>(
            "
            SELECT sub_comment_id, comment_id, member_id, content, heart, created_at, modified_at
            FROM sub_comments
            WHERE sub_comment_id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(self.conn()?)
        .await?;

        let sub_comment = record.map(SubComment::try_from).transpose()?;
        Ok(sub_comment)
    }

    async fn fetch_sub_comments_by_comments(
        &mut self,
        comments: &[Id<CommentMarker>],
    ) -> Result<Vec<SubComment>> {
        let records = query_as::<_, SubCommentRecord>(
            "
            SELECT sub_comment_id, comment_id, member_id, content, heart, created_at, modified_at
            FROM sub_comments
            WHERE comment_id = ANY($1)
            ORDER BY created_at, sub_comment_id
            ",
        )
        .bind(to_i64s(comments))
        .fetch_all(self.conn()?)
        .await?;

        let sub_comments = records
            .into_iter()
            .map(SubComment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(sub_comments)
    }

    async fn update_sub_comment(&mut self, sub_comment: &SubComment) -> Result<()> {
        query(
            "
            UPDATE sub_comments
            SET content = $2, heart = $3, modified_at = $4
            WHERE sub_comment_id = $1
            ",
        )
        .bind(sub_comment.id().as_i64())
        .bind(sub_comment.content())
        .bind(heart_column(sub_comment.heart()))
        .bind(sub_comment.modified_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn delete_sub_comment(&mut self, id: Id<SubCommentMarker>) -> Result<bool> {
        let result = query("DELETE FROM sub_comments WHERE sub_comment_id = $1")
            .bind(id.as_i64())
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_heart(&mut self, heart: &Heart) -> Result<bool> {
        let (queries, target_id) = heart_queries(heart.target);
        let result = query(queries.insert)
            .bind(heart.member.as_i64())
            .bind(target_id)
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_heart(&mut self, heart: &Heart) -> Result<bool> {
        let (queries, target_id) = heart_queries(heart.target);
        let result = query(queries.delete)
            .bind(heart.member.as_i64())
            .bind(target_id)
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn heart_exists(&mut self, heart: &Heart) -> Result<bool> {
        let (queries, target_id) = heart_queries(heart.target);
        let exists = query_scalar::<_, bool>(queries.exists)
            .bind(heart.member.as_i64())
            .bind(target_id)
            .fetch_one(self.conn()?)
            .await?;

        Ok(exists)
    }

    async fn count_hearts(&mut self, target: HeartTarget) -> Result<u64> {
        let (queries, target_id) = heart_queries(target);
        let count = query_scalar::<_, i64>(queries.count)
            .bind(target_id)
            .fetch_one(self.conn()?)
            .await?;

        Ok(to_count(count))
    }

    async fn count_post_hearts(
        &mut self,
        posts: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>> {
        let records = query_as::<_, CountRecord>(
            "
            SELECT post_id AS id, COUNT(*) AS count
            FROM heart_posts
            WHERE post_id = ANY($1)
            GROUP BY post_id
            ",
        )
        .bind(to_i64s(posts))
        .fetch_all(self.conn()?)
        .await?;

        Ok(to_counts(records))
    }
}
