use crate::{
    model::{
        Id,
        comment::CommentMarker,
        member::{MemberMarker, Nickname},
    },
    util,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SubCommentMarker;

/// A reply to a comment. Replies do not nest further.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct SubComment {
    id: Id<SubCommentMarker>,
    comment: Id<CommentMarker>,
    author: Id<MemberMarker>,
    content: String,
    heart: u64,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    modified_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SubCommentParts {
    pub id: Id<SubCommentMarker>,
    pub comment: Id<CommentMarker>,
    pub author: Id<MemberMarker>,
    pub content: String,
    pub heart: u64,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct CreateSubComment {
    pub comment_id: Id<CommentMarker>,
    pub content: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct SubCommentContent {
    pub content: String,
}

impl SubComment {
    #[must_use]
    pub fn new(
        id: Id<SubCommentMarker>,
        comment: Id<CommentMarker>,
        author: Id<MemberMarker>,
        content: String,
    ) -> Self {
        let now = util::now();
        Self {
            id,
            comment,
            author,
            content,
            heart: 0,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn update_heart(&mut self, heart: u64) {
        self.heart = heart;
    }

    pub fn update(&mut self, content: SubCommentContent) {
        self.content = content.content;
        self.modified_at = util::now();
    }

    #[must_use]
    pub fn is_author(&self, member: Id<MemberMarker>) -> bool {
        self.author == member
    }

    #[must_use]
    pub fn id(&self) -> Id<SubCommentMarker> {
        self.id
    }

    #[must_use]
    pub fn comment(&self) -> Id<CommentMarker> {
        self.comment
    }

    #[must_use]
    pub fn author(&self) -> Id<MemberMarker> {
        self.author
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn heart(&self) -> u64 {
        self.heart
    }

    #[must_use]
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    #[must_use]
    pub fn modified_at(&self) -> OffsetDateTime {
        self.modified_at
    }
}

impl From<SubCommentParts> for SubComment {
    fn from(parts: SubCommentParts) -> Self {
        Self {
            id: parts.id,
            comment: parts.comment,
            author: parts.author,
            content: parts.content,
            heart: parts.heart,
            created_at: parts.created_at,
            modified_at: parts.modified_at,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct SubCommentView {
    pub id: Id<SubCommentMarker>,
    pub author: Nickname,
    pub content: String,
    pub heart: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl SubCommentView {
    #[must_use]
    pub fn new(sub_comment: &SubComment, author: Nickname) -> Self {
        Self {
            id: sub_comment.id,
            author,
            content: sub_comment.content.clone(),
            heart: sub_comment.heart,
            created_at: sub_comment.created_at,
            modified_at: sub_comment.modified_at,
        }
    }
}
