use crate::service::{
    AuthHeaders, DELETE_SUCCESS, Result, ServiceError, authenticate, token::TokenProvider,
};
use blog_common::model::{
    Id,
    member::Member,
    sub_comment::{
        CreateSubComment, SubComment, SubCommentContent, SubCommentMarker, SubCommentView,
    },
};
use blog_db::{Store, UnitOfWork};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct SubCommentService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenProvider>,
}

impl SubCommentService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenProvider>) -> Self {
        Self { store, tokens }
    }

    pub async fn create_sub_comment(
        &self,
        request: CreateSubComment,
        headers: &AuthHeaders,
    ) -> Result<SubCommentView> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;

        if uow.fetch_comment(request.comment_id).await?.is_none() {
            return Err(ServiceError::CommentNotFound(request.comment_id));
        }

        let sub_comment = SubComment::new(
            self.store.generate_id()?,
            request.comment_id,
            member.id,
            request.content,
        );
        uow.insert_sub_comment(&sub_comment).await?;
        uow.commit().await?;

        info!(
            sub_comment = %sub_comment.id(),
            comment = %sub_comment.comment(),
            member = %member.id,
            "Created sub-comment"
        );
        Ok(SubCommentView::new(&sub_comment, member.nickname))
    }

    pub async fn update_sub_comment(
        &self,
        id: Id<SubCommentMarker>,
        content: SubCommentContent,
        headers: &AuthHeaders,
    ) -> Result<SubCommentView> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        let mut sub_comment = owned_sub_comment(&mut *uow, id, &member).await?;

        sub_comment.update(content);
        uow.update_sub_comment(&sub_comment).await?;
        uow.commit().await?;

        info!(sub_comment = %id, member = %member.id, "Updated sub-comment");
        Ok(SubCommentView::new(&sub_comment, member.nickname))
    }

    pub async fn delete_sub_comment(
        &self,
        id: Id<SubCommentMarker>,
        headers: &AuthHeaders,
    ) -> Result<&'static str> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        owned_sub_comment(&mut *uow, id, &member).await?;

        uow.delete_sub_comment(id).await?;
        uow.commit().await?;

        info!(sub_comment = %id, member = %member.id, "Deleted sub-comment");
        Ok(DELETE_SUCCESS)
    }
}

async fn owned_sub_comment(
    uow: &mut dyn UnitOfWork,
    id: Id<SubCommentMarker>,
    member: &Member,
) -> Result<SubComment> {
    let sub_comment = uow
        .fetch_sub_comment(id)
        .await?
        .ok_or(ServiceError::SubCommentNotFound(id))?;

    if !sub_comment.is_author(member.id) {
        warn!(sub_comment = %id, member = %member.id, "Member does not own sub-comment");
        return Err(ServiceError::Forbidden);
    }

    Ok(sub_comment)
}

#[cfg(test)]
mod tests {
    use crate::service::{AuthHeaders, ServiceError, test_support::Fixture};
    use blog_common::model::{
        Id,
        comment::CreateComment,
        post::PostContent,
        sub_comment::{CreateSubComment, SubCommentContent},
    };

    #[tokio::test]
    async fn sub_comment_lifecycle() {
        let fixture = Fixture::new();
        let (_, writer) = fixture.login("writer").await;
        let (_, other) = fixture.login("other").await;
        let post = fixture
            .posts
            .create_post(PostContent::default(), None, &writer)
            .await
            .unwrap();
        let comment = fixture
            .comments
            .create_comment(
                CreateComment {
                    post_id: post.id,
                    content: "comment".to_owned(),
                },
                &other,
            )
            .await
            .unwrap();

        assert!(matches!(
            fixture
                .sub_comments
                .create_sub_comment(
                    CreateSubComment {
                        comment_id: Id::from(1_u64),
                        content: "lost".to_owned(),
                    },
                    &writer,
                )
                .await,
            Err(ServiceError::CommentNotFound(_))
        ));

        let reply = fixture
            .sub_comments
            .create_sub_comment(
                CreateSubComment {
                    comment_id: comment.id,
                    content: "reply".to_owned(),
                },
                &writer,
            )
            .await
            .unwrap();
        assert_eq!(reply.heart, 0);

        let edit = || SubCommentContent {
            content: "edited".to_owned(),
        };
        assert!(matches!(
            fixture
                .sub_comments
                .update_sub_comment(reply.id, edit(), &other)
                .await,
            Err(ServiceError::Forbidden)
        ));
        assert_eq!(
            fixture
                .sub_comments
                .update_sub_comment(reply.id, edit(), &writer)
                .await
                .unwrap()
                .content,
            "edited"
        );

        assert!(matches!(
            fixture
                .sub_comments
                .delete_sub_comment(reply.id, &AuthHeaders::default())
                .await,
            Err(ServiceError::MissingCredentials)
        ));
        fixture
            .sub_comments
            .delete_sub_comment(reply.id, &writer)
            .await
            .unwrap();
        assert!(matches!(
            fixture
                .sub_comments
                .update_sub_comment(reply.id, edit(), &writer)
                .await,
            Err(ServiceError::SubCommentNotFound(_))
        ));

        let comments = fixture.comments.get_comments(post.id).await.unwrap();
        assert!(comments[0].sub_comments.is_empty());
    }
}
