//! A store that keeps everything in process memory.
//!
//! Entities live in per-type maps keyed by id; relations are plain id fields
//! and parent to children lookups are explicit scans. A unit of work holds the
//! arena lock for its whole lifetime and works on a copy that replaces the
//! arena on commit, so units of work are serialized.

use crate::store::{DbError, Result, Store, UnitOfWork};
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
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Clone, Debug, Default)]
struct Arena {
    members: BTreeMap<Id<MemberMarker>, (Member, PasswordDigest)>,
    refresh_tokens: HashMap<RefreshTokenHash, StoredRefreshToken>,
    posts: BTreeMap<Id<PostMarker>, Post>,
    comments: BTreeMap<Id<CommentMarker>, Comment>,
    sub_comments: BTreeMap<Id<SubCommentMarker>, SubComment>,
    hearts: BTreeSet<Heart>,
}

impl Arena {
    fn remove_sub_comments(&mut self, ids: &HashSet<Id<SubCommentMarker>>) {
        self.sub_comments.retain(|id, _| !ids.contains(id));
        self.hearts.retain(|heart| match heart.target {
            HeartTarget::SubComment(id) => !ids.contains(&id),
            _ => true,
        });
    }

    fn remove_comments(&mut self, ids: &HashSet<Id<CommentMarker>>) {
        let sub_comments = self
            .sub_comments
            .values()
            .filter(|sub_comment| ids.contains(&sub_comment.comment()))
            .map(SubComment::id)
            .collect();
        self.remove_sub_comments(&sub_comments);

        self.comments.retain(|id, _| !ids.contains(id));
        self.hearts.retain(|heart| match heart.target {
            HeartTarget::Comment(id) => !ids.contains(&id),
            _ => true,
        });
    }
}

pub struct MemoryStore {
    arena: Arc<AsyncMutex<Arena>>,
    snowflake_generator: Mutex<BlogSnowflakeGenerator>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(snowflake_generator: BlogSnowflakeGenerator) -> Self {
        Self {
            arena: Arc::default(),
            snowflake_generator: Mutex::new(snowflake_generator),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.arena).lock_owned().await;
        let working = Arena::clone(&guard);

        Ok(Box::new(MemoryUnitOfWork {
            guard: Some(guard),
            working,
        }))
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

pub struct MemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<Arena>>,
    working: Arena,
}

impl MemoryUnitOfWork {
    fn arena(&mut self) -> Result<&mut Arena> {
        if self.guard.is_none() {
            return Err(DbError::Finished);
        }

        Ok(&mut self.working)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(&mut self) -> Result<()> {
        let mut guard = self.guard.take().ok_or(DbError::Finished)?;
        *guard = std::mem::take(&mut self.working);
        trace!("Committed in-memory unit of work");

        Ok(())
    }

    async fn insert_member(&mut self, member: &Member, digest: &PasswordDigest) -> Result<()> {
        let arena = self.arena()?;
        if arena
            .members
            .values()
            .any(|(existing, _)| existing.nickname == member.nickname)
        {
            return Err(DbError::Conflict(format!(
                "nickname {}",
                member.nickname.get()
            )));
        }

        arena
            .members
            .insert(member.id, (member.clone(), digest.clone()));
        Ok(())
    }

    async fn fetch_member(&mut self, id: Id<MemberMarker>) -> Result<Option<Member>> {
        Ok(self
            .arena()?
            .members
            .get(&id)
            .map(|(member, _)| member.clone()))
    }

    async fn fetch_members(
        &mut self,
        ids: &[Id<MemberMarker>],
    ) -> Result<HashMap<Id<MemberMarker>, Member>> {
        let arena = self.arena()?;
        Ok(ids
            .iter()
            .filter_map(|id| arena.members.get(id))
            .map(|(member, _)| (member.id, member.clone()))
            .collect())
    }

    async fn fetch_member_credentials(
        &mut self,
        nickname: &Nickname,
    ) -> Result<Option<(Member, PasswordDigest)>> {
        Ok(self
            .arena()?
            .members
            .values()
            .find(|(member, _)| &member.nickname == nickname)
            .cloned())
    }

    async fn insert_refresh_token(&mut self, token: &StoredRefreshToken) -> Result<()> {
        self.arena()?
            .refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn fetch_refresh_token(
        &mut self,
        token_hash: &RefreshTokenHash,
    ) -> Result<Option<StoredRefreshToken>> {
        Ok(self.arena()?.refresh_tokens.get(token_hash).cloned())
    }

    async fn delete_refresh_tokens(&mut self, member: Id<MemberMarker>) -> Result<u64> {
        let tokens = &mut self.arena()?.refresh_tokens;
        let before = tokens.len();
        tokens.retain(|_, token| token.member != member);

        Ok((before - tokens.len()) as u64)
    }

    async fn insert_post(&mut self, post: &Post) -> Result<()> {
        self.arena()?.posts.insert(post.id(), post.clone());
        Ok(())
    }

    async fn fetch_post(&mut self, id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.arena()?.posts.get(&id).cloned())
    }

    async fn fetch_posts_by_modified_desc(&mut self) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self.arena()?.posts.values().cloned().collect();
        posts.sort_by(|a, b| {
            b.modified_at()
                .cmp(&a.modified_at())
                .then_with(|| b.id().cmp(&a.id()))
        });

        Ok(posts)
    }

    async fn update_post(&mut self, post: &Post) -> Result<()> {
        if let Some(stored) = self.arena()?.posts.get_mut(&post.id()) {
            *stored = post.clone();
        }
        Ok(())
    }

    async fn delete_post(&mut self, id: Id<PostMarker>) -> Result<bool> {
        let arena = self.arena()?;
        if arena.posts.remove(&id).is_none() {
            return Ok(false);
        }

        let comments = arena
            .comments
            .values()
            .filter(|comment| comment.post() == id)
            .map(Comment::id)
            .collect();
        arena.remove_comments(&comments);
        arena
            .hearts
            .retain(|heart| heart.target != HeartTarget::Post(id));

        Ok(true)
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        self.arena()?.comments.insert(comment.id(), comment.clone());
        Ok(())
    }

    async fn fetch_comment(&mut self, id: Id<CommentMarker>) -> Result<Option<Comment>> {
        Ok(self.arena()?.comments.get(&id).cloned())
    }

    async fn fetch_comments_by_post(&mut self, post: Id<PostMarker>) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .arena()?
            .comments
            .values()
            .filter(|comment| comment.post() == post)
            .cloned()
            .collect();
        comments.sort_by_key(|comment| (comment.created_at(), comment.id()));

        Ok(comments)
    }

    async fn count_comments_by_posts(
        &mut self,
        posts: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>> {
        let wanted: HashSet<_> = posts.iter().copied().collect();
        let mut counts = HashMap::new();
        for comment in self.arena()?.comments.values() {
            if wanted.contains(&comment.post()) {
                *counts.entry(comment.post()).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        if let Some(stored) = self.arena()?.comments.get_mut(&comment.id()) {
            *stored = comment.clone();
        }
        Ok(())
    }

    async fn delete_comment(&mut self, id: Id<CommentMarker>) -> Result<bool> {
        let arena = self.arena()?;
        if !arena.comments.contains_key(&id) {
            return Ok(false);
        }

        arena.remove_comments(&HashSet::from([id]));
        Ok(true)
    }

    async fn insert_sub_comment(&mut self, sub_comment: &SubComment) -> Result<()> {
        self.arena()?
            .sub_comments
            .insert(sub_comment.id(), sub_comment.clone());
        Ok(())
    }

    async fn fetch_sub_comment(
        &mut self,
        id: Id<SubCommentMarker>,
    ) -> Result<Option<SubComment>> {
        Ok(self.arena()?.sub_comments.get(&id).cloned())
    }

    async fn fetch_sub_comments_by_comments(
        &mut self,
        comments: &[Id<CommentMarker>],
    ) -> Result<Vec<SubComment>> {
        let wanted: HashSet<_> = comments.iter().copied().collect();
        let mut sub_comments: Vec<SubComment> = self
            .arena()?
            .sub_comments
            .values()
            .filter(|sub_comment| wanted.contains(&sub_comment.comment()))
            .cloned()
            .collect();
        sub_comments.sort_by_key(|sub_comment| (sub_comment.created_at(), sub_comment.id()));

        Ok(sub_comments)
    }

    async fn update_sub_comment(&mut self, sub_comment: &SubComment) -> Result<()> {
        if let Some(stored) = self.arena()?.sub_comments.get_mut(&sub_comment.id()) {
            *stored = sub_comment.clone();
        }
        Ok(())
    }

    async fn delete_sub_comment(&mut self, id: Id<SubCommentMarker>) -> Result<bool> {
        let arena = self.arena()?;
        if !arena.sub_comments.contains_key(&id) {
            return Ok(false);
        }

        arena.remove_sub_comments(&HashSet::from([id]));
        Ok(true)
    }

    async fn insert_heart(&mut self, heart: &Heart) -> Result<bool> {
        Ok(self.arena()?.hearts.insert(*heart))
    }

    async fn delete_heart(&mut self, heart: &Heart) -> Result<bool> {
        Ok(self.arena()?.hearts.remove(heart))
    }

    async fn heart_exists(&mut self, heart: &Heart) -> Result<bool> {
        Ok(self.arena()?.hearts.contains(heart))
    }

    async fn count_hearts(&mut self, target: HeartTarget) -> Result<u64> {
        Ok(self
            .arena()?
            .hearts
            .iter()
            .filter(|heart| heart.target == target)
            .count() as u64)
    }

    async fn count_post_hearts(
        &mut self,
        posts: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>> {
        let wanted: HashSet<_> = posts.iter().copied().collect();
        let mut counts = HashMap::new();
        for heart in &self.arena()?.hearts {
            if let HeartTarget::Post(post) = heart.target
                && wanted.contains(&post)
            {
                *counts.entry(post).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryStore,
        store::{DbError, Store, UnitOfWork},
    };
    use blog_common::{
        model::{
            BlogSnowflakeGenerator, Id,
            comment::Comment,
            heart::{Heart, HeartTarget},
            member::{Member, MemberMarker, Nickname, Password, PasswordDigest},
            post::{Post, PostContent},
            sub_comment::SubComment,
        },
        snowflake::{ProcessId, WorkerId},
        util,
    };
    use std::sync::{Arc, LazyLock};

    static DIGEST: LazyLock<PasswordDigest> = LazyLock::new(|| {
        PasswordDigest::create(&Password::new("password".to_owned()).unwrap()).unwrap()
    });

    fn store() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new(BlogSnowflakeGenerator::new(
            WorkerId::default(),
            ProcessId::default(),
        )))
    }

    fn member(store: &dyn Store, nickname: &str) -> Member {
        Member {
            id: store.generate_id().unwrap(),
            nickname: Nickname::new(nickname.to_owned()).unwrap(),
            created_at: util::now(),
        }
    }

    fn post(store: &dyn Store, author: Id<MemberMarker>, title: &str) -> Post {
        Post::new(
            store.generate_id().unwrap(),
            author,
            PostContent {
                title: title.to_owned(),
                content: "content".to_owned(),
            },
            None,
        )
    }

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_no_trace() {
        let store = store();
        let author = member(&*store, "writer");
        let post = post(&*store, author.id, "draft");

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_member(&author, &DIGEST).await.unwrap();
            uow.insert_post(&post).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.fetch_post(post.id()).await.unwrap(), None);
        assert_eq!(uow.fetch_member(author.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn committed_unit_of_work_is_closed() {
        let store = store();
        let author = member(&*store, "writer");

        let mut uow = store.begin().await.unwrap();
        uow.insert_member(&author, &DIGEST).await.unwrap();
        uow.commit().await.unwrap();

        assert!(matches!(
            uow.fetch_member(author.id).await,
            Err(DbError::Finished)
        ));

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.fetch_member(author.id).await.unwrap(), Some(author));
    }

    #[tokio::test]
    async fn duplicate_nickname_conflicts() {
        let store = store();
        let mut uow = store.begin().await.unwrap();
        uow.insert_member(&member(&*store, "same"), &DIGEST)
            .await
            .unwrap();

        assert!(matches!(
            uow.insert_member(&member(&*store, "same"), &DIGEST).await,
            Err(DbError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_post_cascades() {
        let store = store();
        let author = member(&*store, "writer");
        let kept = post(&*store, author.id, "kept");
        let doomed = post(&*store, author.id, "doomed");
        let comment = Comment::new(
            store.generate_id().unwrap(),
            doomed.id(),
            author.id,
            "c".to_owned(),
        );
        let kept_comment = Comment::new(
            store.generate_id().unwrap(),
            kept.id(),
            author.id,
            "k".to_owned(),
        );
        let sub_comment = SubComment::new(
            store.generate_id().unwrap(),
            comment.id(),
            author.id,
            "s".to_owned(),
        );

        let mut uow = store.begin().await.unwrap();
        uow.insert_member(&author, &DIGEST).await.unwrap();
        uow.insert_post(&kept).await.unwrap();
        uow.insert_post(&doomed).await.unwrap();
        uow.insert_comment(&comment).await.unwrap();
        uow.insert_comment(&kept_comment).await.unwrap();
        uow.insert_sub_comment(&sub_comment).await.unwrap();
        for target in [
            HeartTarget::Post(doomed.id()),
            HeartTarget::Comment(comment.id()),
            HeartTarget::SubComment(sub_comment.id()),
            HeartTarget::Post(kept.id()),
        ] {
            assert!(
                uow.insert_heart(&Heart {
                    member: author.id,
                    target
                })
                .await
                .unwrap()
            );
        }
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.delete_post(doomed.id()).await.unwrap());
        assert!(!uow.delete_post(doomed.id()).await.unwrap());
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.fetch_comment(comment.id()).await.unwrap(), None);
        assert_eq!(uow.fetch_sub_comment(sub_comment.id()).await.unwrap(), None);
        assert_eq!(
            uow.count_hearts(HeartTarget::Comment(comment.id()))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            uow.count_hearts(HeartTarget::SubComment(sub_comment.id()))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            uow.fetch_comment(kept_comment.id()).await.unwrap(),
            Some(kept_comment)
        );
        assert_eq!(
            uow.count_post_hearts(&[kept.id(), doomed.id()])
                .await
                .unwrap()
                .get(&kept.id()),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn posts_are_listed_by_modification() {
        let store = store();
        let author = member(&*store, "writer");
        let older = post(&*store, author.id, "older");
        let newer = post(&*store, author.id, "newer");

        let mut uow = store.begin().await.unwrap();
        uow.insert_post(&newer).await.unwrap();
        uow.insert_post(&older).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let titles: Vec<_> = uow
            .fetch_posts_by_modified_desc()
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.title().to_owned())
            .collect();
        assert_eq!(titles, ["newer", "older"]);

        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut edited = older;
        edited.update(PostContent {
            title: "older, edited".to_owned(),
            content: "content".to_owned(),
        });
        uow.update_post(&edited).await.unwrap();

        let first = uow.fetch_posts_by_modified_desc().await.unwrap();
        assert_eq!(first[0].title(), "older, edited");
    }

    #[tokio::test]
    async fn hearts_are_unique_per_member() {
        let store = store();
        let heart = Heart {
            member: Id::from(1),
            target: HeartTarget::Post(Id::from(2)),
        };

        let mut uow = store.begin().await.unwrap();
        assert!(uow.insert_heart(&heart).await.unwrap());
        assert!(!uow.insert_heart(&heart).await.unwrap());
        assert!(uow.heart_exists(&heart).await.unwrap());
        assert_eq!(uow.count_hearts(heart.target).await.unwrap(), 1);
        assert!(uow.delete_heart(&heart).await.unwrap());
        assert!(!uow.delete_heart(&heart).await.unwrap());
    }
}
