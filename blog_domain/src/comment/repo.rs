use crate::error::BlogResult;
use crate::timestamp::Timestamptz;
use crate::{CommentId, PostId, UserId};

use entrait::entrait_export as entrait;

/// A stored comment joined with its author and its number of direct replies.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Comment {
    pub comment_id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub text: String,
    pub author_id: UserId,
    pub author_name: String,
    pub author_avatar_path: Option<String>,
    pub reply_count: i64,
    pub created_at: Timestamptz,
    pub modified_at: Timestamptz,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct NewComment<'a> {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub text: &'a str,
    pub author_id: UserId,
    pub now: Timestamptz,
}

/// Which slice of the comment forest a listing looks at.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Filter<'a> {
    /// Comments of a post that have no parent.
    TopLevel { post_id: PostId },
    /// Direct replies to `parent_id` within a post.
    Replies {
        post_id: PostId,
        parent_id: CommentId,
    },
    /// Comments of a post at any depth whose text or author name contains
    /// `term`. `term` is expected to be lower-case already.
    Search { post_id: PostId, term: &'a str },
    /// Direct replies to `parent_id`, whatever post they are in.
    RepliesOfAnyPost { parent_id: CommentId },
    /// Everything, in insertion order.
    All,
}

impl Filter<'_> {
    /// Every listing is newest first, except the unfiltered one.
    pub fn newest_first(&self) -> bool {
        !matches!(self, Self::All)
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct Listing {
    pub comments: Vec<Comment>,
    /// Size of the whole filtered set, not of the window.
    pub total: i64,
}

#[entrait(CommentRepoImpl, delegate_by = DelegateCommentRepo, mock_api = CommentRepoMock)]
pub trait CommentRepo {
    /// Fails with `PostNotFound`/`ParentNotFound` when the post or the
    /// parent is gone at the moment of insertion.
    async fn insert_comment(&self, new_comment: NewComment<'_>) -> BlogResult<Comment>;

    async fn find_comment(&self, comment_id: CommentId) -> BlogResult<Option<Comment>>;

    async fn update_comment_text(
        &self,
        comment_id: CommentId,
        text: &str,
        modified_at: Timestamptz,
    ) -> BlogResult<Option<Comment>>;

    async fn select_comments(&self, filter: Filter<'_>, window: Window) -> BlogResult<Listing>;

    async fn select_comment_ids_by_author(&self, author_id: UserId) -> BlogResult<Vec<CommentId>>;

    /// Removes every given root together with its whole reply subtree.
    /// Roots that no longer exist are skipped. Returns the removed ids,
    /// descendants before their ancestors.
    async fn delete_comment_trees(&self, roots: &[CommentId]) -> BlogResult<Vec<CommentId>>;

    /// Removes every comment of a post in one pass.
    async fn delete_post_comments(&self, post_id: PostId) -> BlogResult<Vec<CommentId>>;
}
