use crate::{
    service::{
        AuthHeaders, Credentials, DELETE_SUCCESS, Result, ServiceError, authenticate,
        comment::comment_views, nickname_of, token::TokenProvider,
    },
    storage::{ImageUpload, ObjectStorage},
};
use blog_common::model::{
    Id,
    heart::HeartTarget,
    member::{Member, MemberMarker},
    post::{Post, PostContent, PostDetail, PostListItem, PostMarker, PostSummary},
};
use blog_db::{DbError, Store, UnitOfWork};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    tokens: Arc<TokenProvider>,
}

impl PostService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        tokens: Arc<TokenProvider>,
    ) -> Self {
        Self {
            store,
            storage,
            tokens,
        }
    }

    pub async fn create_post(
        &self,
        content: PostContent,
        image: Option<ImageUpload>,
        headers: &AuthHeaders,
    ) -> Result<PostSummary> {
        let credentials = headers.credentials()?;
        self.member(credentials).await?;
        let image_url = self.upload(image).await?;

        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        let post = Post::new(self.store.generate_id()?, member.id, content, image_url);
        uow.insert_post(&post).await?;
        uow.commit().await?;

        info!(post = %post.id(), member = %member.id, "Created post");
        Ok(PostSummary::new(&post, member.nickname))
    }

    pub async fn get_post(&self, id: Id<PostMarker>) -> Result<PostDetail> {
        let mut uow = self.store.begin().await?;
        let post = Self::is_present_post(&mut *uow, id)
            .await?
            .ok_or(ServiceError::PostNotFound(id))?;

        let author = uow
            .fetch_member(post.author())
            .await?
            .ok_or_else(|| DbError::DanglingReference(format!("member {}", post.author())))?;
        let heart = uow.count_hearts(HeartTarget::Post(id)).await?;
        let comments = comment_views(&mut *uow, id).await?;

        Ok(PostDetail {
            summary: PostSummary::new(&post, author.nickname),
            heart,
            comments,
        })
    }

    pub async fn get_all_posts(&self) -> Result<Vec<PostListItem>> {
        let mut uow = self.store.begin().await?;
        let posts = uow.fetch_posts_by_modified_desc().await?;

        let post_ids: Vec<_> = posts.iter().map(Post::id).collect();
        let mut author_ids: Vec<Id<MemberMarker>> = posts.iter().map(Post::author).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let hearts = uow.count_post_hearts(&post_ids).await?;
        let comment_counts = uow.count_comments_by_posts(&post_ids).await?;
        let members = uow.fetch_members(&author_ids).await?;

        posts
            .iter()
            .map(|post| -> Result<PostListItem> {
                Ok(PostListItem {
                    id: post.id(),
                    title: post.title().to_owned(),
                    author: nickname_of(&members, post.author())?,
                    heart: hearts.get(&post.id()).copied().unwrap_or_default(),
                    comment_count: comment_counts.get(&post.id()).copied().unwrap_or_default(),
                    created_at: post.created_at(),
                    modified_at: post.modified_at(),
                })
            })
            .collect()
    }

    pub async fn update_post(
        &self,
        id: Id<PostMarker>,
        content: PostContent,
        headers: &AuthHeaders,
    ) -> Result<Post> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        let mut post = Self::owned_post(&mut *uow, id, &member).await?;

        post.update(content);
        uow.update_post(&post).await?;
        uow.commit().await?;

        info!(post = %id, member = %member.id, "Updated post");
        Ok(post)
    }

    /// Replaces the image of a post. An empty or missing file clears it.
    ///
    /// The upload happens between two units of work. Ownership is checked in
    /// both.
    pub async fn update_image(
        &self,
        id: Id<PostMarker>,
        image: Option<ImageUpload>,
        headers: &AuthHeaders,
    ) -> Result<Post> {
        let credentials = headers.credentials()?;
        {
            let mut uow = self.store.begin().await?;
            let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
            Self::owned_post(&mut *uow, id, &member).await?;
        }
        let image_url = self.upload(image).await?;

        // The post may have been deleted during the upload
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        let mut post = Self::owned_post(&mut *uow, id, &member).await?;
        post.update_image(image_url);
        uow.update_post(&post).await?;
        uow.commit().await?;

        info!(post = %id, member = %member.id, image = ?post.image_url(), "Updated post image");
        Ok(post)
    }

    pub async fn delete_post(
        &self,
        id: Id<PostMarker>,
        headers: &AuthHeaders,
    ) -> Result<&'static str> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        Self::owned_post(&mut *uow, id, &member).await?;

        uow.delete_post(id).await?;
        uow.commit().await?;

        info!(post = %id, member = %member.id, "Deleted post");
        Ok(DELETE_SUCCESS)
    }

    pub async fn is_present_post(
        uow: &mut dyn UnitOfWork,
        id: Id<PostMarker>,
    ) -> Result<Option<Post>> {
        Ok(uow.fetch_post(id).await?)
    }

    /// The member both auth headers identify, or `None` when they are missing
    /// or invalid.
    pub async fn validate_member(
        &self,
        uow: &mut dyn UnitOfWork,
        headers: &AuthHeaders,
    ) -> Result<Option<Member>> {
        let Ok(credentials) = headers.credentials() else {
            return Ok(None);
        };

        match authenticate(&self.tokens, uow, credentials).await {
            Ok(member) => Ok(Some(member)),
            Err(ServiceError::InvalidToken) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Authenticates in a unit of work that is closed again on return.
    async fn member(&self, credentials: Credentials<'_>) -> Result<Member> {
        let mut uow = self.store.begin().await?;
        authenticate(&self.tokens, &mut *uow, credentials).await
    }

    async fn owned_post(
        uow: &mut dyn UnitOfWork,
        id: Id<PostMarker>,
        member: &Member,
    ) -> Result<Post> {
        let post = Self::is_present_post(uow, id)
            .await?
            .ok_or(ServiceError::PostNotFound(id))?;

        if !post.is_author(member.id) {
            warn!(post = %id, member = %member.id, "Member does not own post");
            return Err(ServiceError::Forbidden);
        }

        Ok(post)
    }

    async fn upload(&self, image: Option<ImageUpload>) -> Result<Option<String>> {
        let Some(image) = image.filter(|image| !image.is_empty()) else {
            return Ok(None);
        };

        let file_name = image.file_name.clone();
        let url = self
            .storage
            .upload_image(image)
            .await
            .map_err(|source| ServiceError::UploadFailed { file_name, source })?;

        Ok(Some(url))
    }
}
