use crate::service::{
    AuthHeaders, DELETE_SUCCESS, Result, ServiceError, authenticate, nickname_of,
    token::TokenProvider,
};
use blog_common::model::{
    Id,
    comment::{Comment, CommentContent, CommentMarker, CommentView, CreateComment},
    member::Member,
    post::PostMarker,
    sub_comment::{SubComment, SubCommentView},
};
use blog_db::{Store, UnitOfWork};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

/// The comments of a post with their sub-comments, oldest first.
///
/// Sub-comments and authors are loaded with one query each.
pub(crate) async fn comment_views(
    uow: &mut dyn UnitOfWork,
    post: Id<PostMarker>,
) -> Result<Vec<CommentView>> {
    let comments = uow.fetch_comments_by_post(post).await?;
    let comment_ids: Vec<_> = comments.iter().map(Comment::id).collect();
    let sub_comments = uow.fetch_sub_comments_by_comments(&comment_ids).await?;

    let mut author_ids: Vec<_> = comments
        .iter()
        .map(Comment::author)
        .chain(sub_comments.iter().map(SubComment::author))
        .collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    let members = uow.fetch_members(&author_ids).await?;

    let mut replies: HashMap<Id<CommentMarker>, Vec<SubCommentView>> = HashMap::new();
    for sub_comment in &sub_comments {
        let author = nickname_of(&members, sub_comment.author())?;
        replies
            .entry(sub_comment.comment())
            .or_default()
            .push(SubCommentView::new(sub_comment, author));
    }

    comments
        .iter()
        .map(|comment| -> Result<CommentView> {
            Ok(CommentView::new(
                comment,
                nickname_of(&members, comment.author())?,
                replies.remove(&comment.id()).unwrap_or_default(),
            ))
        })
        .collect()
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenProvider>,
}

impl CommentService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenProvider>) -> Self {
        Self { store, tokens }
    }

    pub async fn create_comment(
        &self,
        request: CreateComment,
        headers: &AuthHeaders,
    ) -> Result<CommentView> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;

        if uow.fetch_post(request.post_id).await?.is_none() {
            return Err(ServiceError::PostNotFound(request.post_id));
        }

        let comment = Comment::new(
            self.store.generate_id()?,
            request.post_id,
            member.id,
            request.content,
        );
        uow.insert_comment(&comment).await?;
        uow.commit().await?;

        info!(comment = %comment.id(), post = %comment.post(), member = %member.id, "Created comment");
        Ok(CommentView::new(&comment, member.nickname, Vec::new()))
    }

    pub async fn get_comments(&self, post: Id<PostMarker>) -> Result<Vec<CommentView>> {
        let mut uow = self.store.begin().await?;
        if uow.fetch_post(post).await?.is_none() {
            return Err(ServiceError::PostNotFound(post));
        }

        comment_views(&mut *uow, post).await
    }

    pub async fn update_comment(
        &self,
        id: Id<CommentMarker>,
        content: CommentContent,
        headers: &AuthHeaders,
    ) -> Result<CommentView> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        let mut comment = owned_comment(&mut *uow, id, &member).await?;

        comment.update(content);
        uow.update_comment(&comment).await?;
        let sub_comments = uow.fetch_sub_comments_by_comments(&[id]).await?;
        let replies = sub_comment_views(&mut *uow, &sub_comments).await?;
        uow.commit().await?;

        info!(comment = %id, member = %member.id, "Updated comment");
        Ok(CommentView::new(&comment, member.nickname, replies))
    }

    pub async fn delete_comment(
        &self,
        id: Id<CommentMarker>,
        headers: &AuthHeaders,
    ) -> Result<&'static str> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        owned_comment(&mut *uow, id, &member).await?;

        uow.delete_comment(id).await?;
        uow.commit().await?;

        info!(comment = %id, member = %member.id, "Deleted comment");
        Ok(DELETE_SUCCESS)
    }
}

async fn owned_comment(
    uow: &mut dyn UnitOfWork,
    id: Id<CommentMarker>,
    member: &Member,
) -> Result<Comment> {
    let comment = uow
        .fetch_comment(id)
        .await?
        .ok_or(ServiceError::CommentNotFound(id))?;

    if !comment.is_author(member.id) {
        warn!(comment = %id, member = %member.id, "Member does not own comment");
        return Err(ServiceError::Forbidden);
    }

    Ok(comment)
}

async fn sub_comment_views(
    uow: &mut dyn UnitOfWork,
    sub_comments: &[SubComment],
) -> Result<Vec<SubCommentView>> {
    let author_ids: Vec<_> = sub_comments.iter().map(SubComment::author).collect();
    let members = uow.fetch_members(&author_ids).await?;

    sub_comments
        .iter()
        .map(|sub_comment| -> Result<SubCommentView> {
            Ok(SubCommentView::new(
                sub_comment,
                nickname_of(&members, sub_comment.author())?,
            ))
        })
        .collect()
}
