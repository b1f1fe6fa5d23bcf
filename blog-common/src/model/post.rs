use crate::{
    model::{
        Id,
        comment::CommentView,
        member::{MemberMarker, Nickname},
    },
    util,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A blog post.
///
/// Everything except title, content and image is fixed at construction;
/// those change only through [`Post::update`] and [`Post::update_image`].
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Post {
    id: Id<PostMarker>,
    author: Id<MemberMarker>,
    title: String,
    content: String,
    image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    modified_at: OffsetDateTime,
}

/// Stored columns of a post, used to rebuild it.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostParts {
    pub id: Id<PostMarker>,
    pub author: Id<MemberMarker>,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

/// Title and content as submitted by a client.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct PostContent {
    pub title: String,
    pub content: String,
}

impl Post {
    #[must_use]
    pub fn new(
        id: Id<PostMarker>,
        author: Id<MemberMarker>,
        content: PostContent,
        image_url: Option<String>,
    ) -> Self {
        let now = util::now();
        Self {
            id,
            author,
            title: content.title,
            content: content.content,
            image_url,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn update(&mut self, content: PostContent) {
        self.title = content.title;
        self.content = content.content;
        self.modified_at = util::now();
    }

    pub fn update_image(&mut self, image_url: Option<String>) {
        self.image_url = image_url;
        self.modified_at = util::now();
    }

    #[must_use]
    pub fn is_author(&self, member: Id<MemberMarker>) -> bool {
        self.author == member
    }

    #[must_use]
    pub fn id(&self) -> Id<PostMarker> {
        self.id
    }

    #[must_use]
    pub fn author(&self) -> Id<MemberMarker> {
        self.author
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
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

impl From<PostParts> for Post {
    fn from(parts: PostParts) -> Self {
        Self {
            id: parts.id,
            author: parts.author,
            title: parts.title,
            content: parts.content,
            image_url: parts.image_url,
            created_at: parts.created_at,
            modified_at: parts.modified_at,
        }
    }
}

/// Returned after a post was created.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: Id<PostMarker>,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author: Nickname,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl PostSummary {
    #[must_use]
    pub fn new(post: &Post, author: Nickname) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            content: post.content.clone(),
            image_url: post.image_url.clone(),
            author,
            created_at: post.created_at,
            modified_at: post.modified_at,
        }
    }
}

/// A post with its comment tree.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub summary: PostSummary,
    pub heart: u64,
    pub comments: Vec<CommentView>,
}

/// One line of the post listing.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostListItem {
    pub id: Id<PostMarker>,
    pub title: String,
    pub author: Nickname,
    pub heart: u64,
    pub comment_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        post::{Post, PostContent},
    };

    fn post() -> Post {
        Post::new(
            Id::from(10),
            Id::from(1),
            PostContent {
                title: "first".to_owned(),
                content: "hello".to_owned(),
            },
            None,
        )
    }

    #[test]
    fn only_the_author_owns_a_post() {
        let post = post();
        assert!(post.is_author(Id::from(1)));
        assert!(!post.is_author(Id::from(2)));
    }

    #[test]
    fn update_keeps_identity() {
        let mut post = post();
        let created_at = post.created_at();

        post.update(PostContent {
            title: "second".to_owned(),
            content: "edited".to_owned(),
        });
        post.update_image(Some("https://bucket/img.png".to_owned()));

        assert_eq!(post.id(), Id::from(10));
        assert_eq!(post.author(), Id::from(1));
        assert_eq!(post.title(), "second");
        assert_eq!(post.content(), "edited");
        assert_eq!(post.image_url(), Some("https://bucket/img.png"));
        assert_eq!(post.created_at(), created_at);
        assert!(post.modified_at() >= created_at);

        post.update_image(None);
        assert_eq!(post.image_url(), None);
    }
}
