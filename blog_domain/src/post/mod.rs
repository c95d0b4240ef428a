//! The comment engine does not own posts. It only needs to ask the post
//! subsystem a few questions about them.

use crate::error::BlogResult;
use crate::{PostId, UserId};

use entrait::entrait_export as entrait;

#[entrait(PostRepoImpl, delegate_by = DelegatePostRepo, mock_api = PostRepoMock)]
pub trait PostRepo {
    async fn post_exists(&self, post_id: PostId) -> BlogResult<bool>;

    async fn find_post_owner(&self, post_id: PostId) -> BlogResult<Option<UserId>>;

    async fn select_post_ids_by_owner(&self, owner: UserId) -> BlogResult<Vec<PostId>>;
}
