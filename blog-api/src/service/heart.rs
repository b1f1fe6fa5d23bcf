use crate::service::{AuthHeaders, Result, ServiceError, authenticate, token::TokenProvider};
use blog_common::model::heart::{Heart, HeartTarget, HeartView};
use blog_db::{Store, UnitOfWork};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct HeartService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenProvider>,
}

impl HeartService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenProvider>) -> Self {
        Self { store, tokens }
    }

    /// Likes the target. Liking twice has no further effect.
    pub async fn heart(&self, target: HeartTarget, headers: &AuthHeaders) -> Result<HeartView> {
        self.set_heart(target, headers, true).await
    }

    pub async fn unheart(&self, target: HeartTarget, headers: &AuthHeaders) -> Result<HeartView> {
        self.set_heart(target, headers, false).await
    }

    async fn set_heart(
        &self,
        target: HeartTarget,
        headers: &AuthHeaders,
        liked: bool,
    ) -> Result<HeartView> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;
        ensure_target_exists(&mut *uow, target).await?;

        let heart = Heart {
            member: member.id,
            target,
        };
        let changed = if liked {
            uow.insert_heart(&heart).await?
        } else {
            uow.delete_heart(&heart).await?
        };

        let count = uow.count_hearts(target).await?;
        if changed {
            store_count(&mut *uow, target, count).await?;
        }
        uow.commit().await?;

        if changed {
            info!(?target, member = %member.id, liked, count, "Changed heart");
        }
        Ok(HeartView {
            target,
            liked,
            heart: count,
        })
    }
}

async fn ensure_target_exists(uow: &mut dyn UnitOfWork, target: HeartTarget) -> Result<()> {
    let exists = match target {
        HeartTarget::Post(id) => uow.fetch_post(id).await?.is_some(),
        HeartTarget::Comment(id) => uow.fetch_comment(id).await?.is_some(),
        HeartTarget::SubComment(id) => uow.fetch_sub_comment(id).await?.is_some(),
    };

    if exists {
        Ok(())
    } else {
        Err(match target {
            HeartTarget::Post(id) => ServiceError::PostNotFound(id),
            HeartTarget::Comment(id) => ServiceError::CommentNotFound(id),
            HeartTarget::SubComment(id) => ServiceError::SubCommentNotFound(id),
        })
    }
}

/// Writes the denormalized counter of comments and sub-comments.
async fn store_count(uow: &mut dyn UnitOfWork, target: HeartTarget, count: u64) -> Result<()> {
    match target {
        HeartTarget::Post(_) => {}
        HeartTarget::Comment(id) => {
            if let Some(mut comment) = uow.fetch_comment(id).await? {
                comment.update_heart(count);
                uow.update_comment(&comment).await?;
            }
        }
        HeartTarget::SubComment(id) => {
            if let Some(mut sub_comment) = uow.fetch_sub_comment(id).await? {
                sub_comment.update_heart(count);
                uow.update_sub_comment(&sub_comment).await?;
            }
        }
    }

    Ok(())
}
