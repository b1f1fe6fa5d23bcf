use crate::model::{
    Id, comment::CommentMarker, member::MemberMarker, post::PostMarker,
    sub_comment::SubCommentMarker,
};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum HeartTarget {
    Post(Id<PostMarker>),
    Comment(Id<CommentMarker>),
    SubComment(Id<SubCommentMarker>),
}

/// A member liking a post, comment or sub-comment.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Heart {
    pub member: Id<MemberMarker>,
    pub target: HeartTarget,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct HeartView {
    pub target: HeartTarget,
    pub liked: bool,
    pub heart: u64,
}
