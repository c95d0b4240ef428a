pub mod query;
pub mod repo;
pub mod tree;

use crate::error::{BlogError, BlogResult};
use crate::post::PostRepo;
use crate::timestamp::Timestamptz;
use crate::{CommentId, PostId, System, UserId};
use query::ListCommentsQuery;
use repo::CommentRepo;

use entrait::entrait_export as entrait;

/// Longest accepted comment text, in characters.
pub const MAX_TEXT_CHARS: usize = 2500;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub text: String,
    pub author_id: UserId,
    pub author_name: String,
    pub author_avatar_path: Option<String>,
    pub reply_count: i64,
    pub date_created: Timestamptz,
    pub date_modified: Timestamptz,
}

impl From<repo::Comment> for Comment {
    fn from(db: repo::Comment) -> Self {
        Self {
            id: db.comment_id,
            post_id: db.post_id,
            parent_id: db.parent_id,
            text: db.text,
            author_id: db.author_id,
            author_name: db.author_name,
            author_avatar_path: db.author_avatar_path,
            reply_count: db.reply_count,
            date_created: db.created_at,
            date_modified: db.modified_at,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreate {
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub text: String,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct CommentUpdate {
    pub text: String,
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub has_next: bool,
    pub has_previous: bool,
    pub result: Vec<Comment>,
}

#[entrait(pub Api)]
pub mod api {
    use super::*;

    pub async fn list_comments(
        deps: &impl CommentRepo,
        query: ListCommentsQuery,
    ) -> BlogResult<CommentPage> {
        let (selection, page) = query.resolve()?;
        let listing = deps
            .select_comments(selection.filter(), page.window())
            .await?;
        let (has_next, has_previous) = page.flags(listing.total);

        Ok(CommentPage {
            has_next,
            has_previous,
            result: listing.comments.into_iter().map(Into::into).collect(),
        })
    }

    pub async fn fetch_comment(
        deps: &impl CommentRepo,
        comment_id: CommentId,
    ) -> BlogResult<Comment> {
        deps.find_comment(comment_id)
            .await?
            .map(Into::into)
            .ok_or(BlogError::CommentNotFound(comment_id))
    }

    pub async fn add_comment(
        deps: &(impl System + PostRepo + CommentRepo),
        author_id: UserId,
        comment: CommentCreate,
    ) -> BlogResult<Comment> {
        let text = checked_text(&comment.text)?;

        if !deps.post_exists(comment.post_id).await? {
            return Err(BlogError::PostNotFound(comment.post_id));
        }

        if let Some(parent_id) = comment.parent_id {
            let parent = deps
                .find_comment(parent_id)
                .await?
                .ok_or(BlogError::ParentNotFound(parent_id))?;

            if parent.post_id != comment.post_id {
                return Err(BlogError::InvalidRelation {
                    parent_id,
                    post_id: comment.post_id,
                });
            }
        }

        let inserted = deps
            .insert_comment(repo::NewComment {
                post_id: comment.post_id,
                parent_id: comment.parent_id,
                text,
                author_id,
                now: deps.get_current_time().into(),
            })
            .await?;

        tracing::debug!(
            comment_id = %inserted.comment_id,
            post_id = %inserted.post_id,
            "comment added"
        );

        Ok(inserted.into())
    }

    pub async fn update_comment(
        deps: &(impl System + CommentRepo),
        comment_id: CommentId,
        update: CommentUpdate,
        caller_may_edit: bool,
    ) -> BlogResult<Comment> {
        let existing = deps
            .find_comment(comment_id)
            .await?
            .ok_or(BlogError::CommentNotFound(comment_id))?;

        if !caller_may_edit {
            return Err(BlogError::Forbidden);
        }

        let text = checked_text(&update.text)?;
        let modified_at = existing
            .modified_at
            .advanced_to(deps.get_current_time());

        deps.update_comment_text(comment_id, text, modified_at)
            .await?
            .map(Into::into)
            .ok_or(BlogError::CommentNotFound(comment_id))
    }

    pub async fn delete_comment(
        deps: &impl CommentRepo,
        comment_id: CommentId,
        caller_may_delete: bool,
    ) -> BlogResult<()> {
        if deps.find_comment(comment_id).await?.is_none() {
            return Err(BlogError::CommentNotFound(comment_id));
        }

        if !caller_may_delete {
            return Err(BlogError::Forbidden);
        }

        let removed = deps.delete_comment_trees(&[comment_id]).await?;
        if removed.is_empty() {
            // Lost a race against another cascade.
            return Err(BlogError::CommentNotFound(comment_id));
        }

        tracing::info!(
            comment_id = %comment_id,
            removed = removed.len(),
            "comment subtree deleted"
        );

        Ok(())
    }

    pub async fn delete_all_comments_for_post(
        deps: &impl CommentRepo,
        post_id: PostId,
    ) -> BlogResult<u64> {
        let removed = deps.delete_post_comments(post_id).await?;

        tracing::info!(post_id = %post_id, removed = removed.len(), "post comments deleted");

        Ok(removed.len() as u64)
    }

    pub async fn delete_all_comments_for_author(
        deps: &(impl PostRepo + CommentRepo),
        author_id: UserId,
    ) -> BlogResult<u64> {
        let mut removed = 0;

        for post_id in deps.select_post_ids_by_owner(author_id).await? {
            removed += delete_all_comments_for_post(deps, post_id).await?;
        }

        // What is left are comments on other people's posts. Replies that
        // other users wrote underneath go with them.
        let roots = deps.select_comment_ids_by_author(author_id).await?;
        if !roots.is_empty() {
            removed += deps.delete_comment_trees(&roots).await?.len() as u64;
        }

        tracing::info!(author_id = %author_id, removed, "author comments deleted");

        Ok(removed)
    }
}

/// Over-long text is rejected, never truncated.
fn checked_text(text: &str) -> BlogResult<&str> {
    if text.trim().is_empty() {
        return Err(BlogError::bad_request("text", "must not be empty"));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(BlogError::bad_request(
            "text",
            format!("must not exceed {MAX_TEXT_CHARS} characters"),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::repo::CommentRepoMock;
    use super::*;
    use crate::post::PostRepoMock;

    use assert_matches::*;
    use time::format_description::well_known::Rfc3339;
    use unimock::*;

    fn test_timestamp() -> Timestamptz {
        Timestamptz(time::OffsetDateTime::parse("2019-10-12T07:20:50.52Z", &Rfc3339).unwrap())
    }

    fn test_db_comment() -> repo::Comment {
        repo::Comment {
            comment_id: CommentId(1),
            post_id: PostId(1),
            parent_id: None,
            text: "text".to_string(),
            author_id: UserId(1),
            author_name: "author".to_string(),
            author_avatar_path: None,
            reply_count: 0,
            created_at: test_timestamp(),
            modified_at: test_timestamp(),
        }
    }

    #[tokio::test]
    async fn add_comment_to_missing_post_should_be_not_found() {
        let deps = Unimock::new(
            PostRepoMock::post_exists
                .next_call(matching!(PostId(1)))
                .returns(Ok(false)),
        );

        assert_matches!(
            api::add_comment(
                &deps,
                UserId(1),
                CommentCreate {
                    post_id: PostId(1),
                    parent_id: None,
                    text: "hello".to_string(),
                },
            )
            .await,
            Err(BlogError::PostNotFound(PostId(1)))
        );
    }

    #[tokio::test]
    async fn add_comment_with_missing_parent_should_be_not_found() {
        let deps = Unimock::new((
            PostRepoMock::post_exists
                .next_call(matching!(PostId(1)))
                .returns(Ok(true)),
            CommentRepoMock::find_comment
                .next_call(matching!(CommentId(9)))
                .returns(Ok(None)),
        ));

        assert_matches!(
            api::add_comment(
                &deps,
                UserId(1),
                CommentCreate {
                    post_id: PostId(1),
                    parent_id: Some(CommentId(9)),
                    text: "hello".to_string(),
                },
            )
            .await,
            Err(BlogError::ParentNotFound(CommentId(9)))
        );
    }

    #[test]
    fn text_is_checked_by_characters_not_bytes() {
        assert!(checked_text(&"ø".repeat(MAX_TEXT_CHARS)).is_ok());
        assert_matches!(
            checked_text(&"x".repeat(MAX_TEXT_CHARS + 1)),
            Err(BlogError::BadRequest { field, .. }) if field == "text"
        );
        assert_matches!(
            checked_text("  \n"),
            Err(BlogError::BadRequest { field, .. }) if field == "text"
        );
    }

    #[tokio::test]
    async fn delete_missing_comment_should_be_not_found() {
        let deps = Unimock::new(
            CommentRepoMock::find_comment
                .next_call(matching!(CommentId(1)))
                .returns(Ok(None)),
        );

        assert_matches!(
            api::delete_comment(&deps, CommentId(1), true).await,
            Err(BlogError::CommentNotFound(CommentId(1)))
        );
    }

    #[tokio::test]
    async fn forbidden_delete_should_not_touch_the_tree() {
        // Any call to `delete_comment_trees` would make the mock panic.
        let deps = Unimock::new(
            CommentRepoMock::find_comment
                .next_call(matching!(CommentId(1)))
                .returns(Ok(Some(test_db_comment()))),
        );

        assert_matches!(
            api::delete_comment(&deps, CommentId(1), false).await,
            Err(BlogError::Forbidden)
        );
    }

    #[tokio::test]
    async fn list_comments_should_compute_pagination_flags() {
        let deps = Unimock::new(
            CommentRepoMock::select_comments
                .next_call(matching!(
                    repo::Filter::TopLevel { post_id: PostId(1) },
                    repo::Window {
                        offset: 5,
                        limit: 5
                    }
                ))
                .returns(Ok(repo::Listing {
                    comments: vec![],
                    total: 6,
                })),
        );

        let page = api::list_comments(
            &deps,
            ListCommentsQuery {
                post_id: Some("1".to_string()),
                top_level: true,
                page: Some("2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(!page.has_next);
        assert!(page.has_previous);
    }
}
