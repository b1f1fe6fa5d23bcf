use crate::{
    model::{
        Id,
        member::{MemberMarker, Nickname},
        post::PostMarker,
        sub_comment::SubCommentView,
    },
    util,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Comment {
    id: Id<CommentMarker>,
    post: Id<PostMarker>,
    author: Id<MemberMarker>,
    content: String,
    heart: u64,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    modified_at: OffsetDateTime,
}

/// Stored columns of a comment, used to rebuild it.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CommentParts {
    pub id: Id<CommentMarker>,
    pub post: Id<PostMarker>,
    pub author: Id<MemberMarker>,
    pub content: String,
    pub heart: u64,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct CreateComment {
    pub post_id: Id<PostMarker>,
    pub content: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct CommentContent {
    pub content: String,
}

impl Comment {
    #[must_use]
    pub fn new(
        id: Id<CommentMarker>,
        post: Id<PostMarker>,
        author: Id<MemberMarker>,
        content: String,
    ) -> Self {
        let now = util::now();
        Self {
            id,
            post,
            author,
            content,
            heart: 0,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn update(&mut self, content: CommentContent) {
        self.content = content.content;
        self.modified_at = util::now();
    }

    pub fn update_heart(&mut self, heart: u64) {
        self.heart = heart;
    }

    #[must_use]
    pub fn is_author(&self, member: Id<MemberMarker>) -> bool {
        self.author == member
    }

    #[must_use]
    pub fn id(&self) -> Id<CommentMarker> {
        self.id
    }

    #[must_use]
    pub fn post(&self) -> Id<PostMarker> {
        self.post
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

impl From<CommentParts> for Comment {
    fn from(parts: CommentParts) -> Self {
        Self {
            id: parts.id,
            post: parts.post,
            author: parts.author,
            content: parts.content,
            heart: parts.heart,
            created_at: parts.created_at,
            modified_at: parts.modified_at,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct CommentView {
    pub id: Id<CommentMarker>,
    pub author: Nickname,
    pub content: String,
    pub heart: u64,
    pub sub_comments: Vec<SubCommentView>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl CommentView {
    #[must_use]
    pub fn new(comment: &Comment, author: Nickname, sub_comments: Vec<SubCommentView>) -> Self {
        Self {
            id: comment.id,
            author,
            content: comment.content.clone(),
            heart: comment.heart,
            sub_comments,
            created_at: comment.created_at,
            modified_at: comment.modified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        comment::{Comment, CommentContent},
    };

    #[test]
    fn update_and_heart() {
        let mut comment = Comment::new(Id::from(3), Id::from(2), Id::from(1), "hi".to_owned());
        assert_eq!(comment.heart(), 0);

        comment.update(CommentContent {
            content: "hello".to_owned(),
        });
        comment.update_heart(4);

        assert_eq!(comment.content(), "hello");
        assert_eq!(comment.heart(), 4);
        assert_eq!(comment.post(), Id::from(2));
        assert!(comment.is_author(Id::from(1)));
        assert!(!comment.is_author(Id::from(2)));
    }
}
