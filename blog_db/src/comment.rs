use crate::DbResultExt;
use crate::GetDb;

use blog_domain::comment::repo::*;
use blog_domain::comment::tree::ReplyIndex;
use blog_domain::error::{BlogError, BlogResult};
use blog_domain::timestamp::Timestamptz;
use blog_domain::{CommentId, PostId, UserId};

use entrait::*;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

/// Comment columns joined with the author. `$from` is a table or CTE name.
macro_rules! select_comment {
    ($from:literal) => {
        concat!(
            r#"
            SELECT
                comment.comment_id,
                comment.post_id,
                comment.parent_id,
                comment.text,
                comment.author_id,
                author.name author_name,
                author.avatar_path author_avatar_path,
                (
                    SELECT count(*) FROM app.comment reply WHERE reply.parent_id = comment.comment_id
                ) reply_count,
                comment.created_at,
                comment.modified_at
            FROM "#,
            $from,
            r#" comment
            INNER JOIN app.user author ON author.user_id = comment.author_id
            "#
        )
    };
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    comment_id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    text: String,
    author_id: i64,
    author_name: String,
    author_avatar_path: Option<String>,
    reply_count: i64,
    created_at: OffsetDateTime,
    modified_at: OffsetDateTime,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            comment_id: CommentId(row.comment_id),
            post_id: PostId(row.post_id),
            parent_id: row.parent_id.map(CommentId),
            text: row.text,
            author_id: UserId(row.author_id),
            author_name: row.author_name,
            author_avatar_path: row.author_avatar_path,
            reply_count: row.reply_count,
            created_at: Timestamptz(row.created_at),
            modified_at: Timestamptz(row.modified_at),
        }
    }
}

pub struct PgCommentRepo;

#[entrait]
impl blog_domain::comment::repo::CommentRepoImpl for PgCommentRepo {
    pub async fn insert_comment(
        deps: &impl GetDb,
        new_comment: NewComment<'_>,
    ) -> BlogResult<Comment> {
        let pg_pool = &deps.get_db().pg_pool;
        let post_id = new_comment.post_id;
        let parent_id = new_comment.parent_id;

        // The foreign keys re-check post and parent inside the insert, so a
        // concurrent cascade either waits for us or makes the insert fail.
        let inserted = sqlx::query_as::<_, CommentRow>(concat!(
            r#"
            WITH inserted AS (
                INSERT INTO app.comment (post_id, parent_id, author_id, text, created_at, modified_at)
                SELECT $1, $2, $3, $4, $5, $5
                WHERE $2::bigint IS NULL OR EXISTS (
                    SELECT 1 FROM app.comment parent WHERE parent.comment_id = $2 AND parent.post_id = $1
                )
                RETURNING *
            )"#,
            select_comment!("inserted")
        ))
        .bind(post_id.0)
        .bind(parent_id.map(|id| id.0))
        .bind(new_comment.author_id.0)
        .bind(new_comment.text)
        .bind(new_comment.now.0)
        .fetch_optional(pg_pool)
        .await
        .on_constraint(|constraint| match constraint {
            "comment_post_id_fkey" => Some(BlogError::PostNotFound(post_id)),
            "comment_parent_id_fkey" => parent_id.map(BlogError::ParentNotFound),
            "comment_author_id_fkey" => Some(BlogError::Unauthorized),
            _ => None,
        })?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // Only the parent guard can suppress the insert.
        let parent_id = parent_id.ok_or_else(|| anyhow::anyhow!("comment insert returned no row"))?;
        let parent_post: Option<i64> =
            sqlx::query_scalar("SELECT post_id FROM app.comment WHERE comment_id = $1")
                .bind(parent_id.0)
                .fetch_optional(pg_pool)
                .await
                .to_blog_err()?;

        Err(match parent_post {
            Some(_) => BlogError::InvalidRelation { parent_id, post_id },
            None => BlogError::ParentNotFound(parent_id),
        })
    }

    pub async fn find_comment(
        deps: &impl GetDb,
        comment_id: CommentId,
    ) -> BlogResult<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(concat!(
            select_comment!("app.comment"),
            "WHERE comment.comment_id = $1"
        ))
        .bind(comment_id.0)
        .fetch_optional(&deps.get_db().pg_pool)
        .await
        .to_blog_err()?;

        Ok(row.map(Into::into))
    }

    pub async fn update_comment_text(
        deps: &impl GetDb,
        comment_id: CommentId,
        text: &str,
        modified_at: Timestamptz,
    ) -> BlogResult<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(concat!(
            r#"
            WITH updated AS (
                UPDATE app.comment SET text = $2, modified_at = $3
                WHERE comment_id = $1
                RETURNING *
            )"#,
            select_comment!("updated")
        ))
        .bind(comment_id.0)
        .bind(text)
        .bind(modified_at.0)
        .fetch_optional(&deps.get_db().pg_pool)
        .await
        .to_blog_err()?;

        Ok(row.map(Into::into))
    }

    pub async fn select_comments(
        deps: &impl GetDb,
        filter: Filter<'_>,
        window: Window,
    ) -> BlogResult<Listing> {
        let pg_pool = &deps.get_db().pg_pool;

        let mut query = QueryBuilder::<Postgres>::new(select_comment!("app.comment"));
        push_filter(&mut query, filter);
        if filter.newest_first() {
            query.push(" ORDER BY comment.created_at DESC, comment.comment_id");
        } else {
            query.push(" ORDER BY comment.comment_id");
        }
        query
            .push(" LIMIT ")
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset);

        let rows: Vec<CommentRow> = query
            .build_query_as()
            .fetch_all(pg_pool)
            .await
            .to_blog_err()?;

        let mut count = QueryBuilder::<Postgres>::new(
            r#"
            SELECT count(*)
            FROM app.comment comment
            INNER JOIN app.user author ON author.user_id = comment.author_id
            "#,
        );
        push_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(pg_pool)
            .await
            .to_blog_err()?;

        Ok(Listing {
            comments: rows.into_iter().map(Into::into).collect(),
            total,
        })
    }

    pub async fn select_comment_ids_by_author(
        deps: &impl GetDb,
        author_id: UserId,
    ) -> BlogResult<Vec<CommentId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT comment_id FROM app.comment WHERE author_id = $1 ORDER BY comment_id",
        )
        .bind(author_id.0)
        .fetch_all(&deps.get_db().pg_pool)
        .await
        .to_blog_err()?;

        Ok(ids.into_iter().map(CommentId).collect())
    }

    pub async fn delete_comment_trees(
        deps: &impl GetDb,
        roots: &[CommentId],
    ) -> BlogResult<Vec<CommentId>> {
        let root_ids: Vec<i64> = roots.iter().map(|id| id.0).collect();
        let mut tx = deps.get_db().pg_pool.begin().await.to_blog_err()?;

        let post_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT post_id FROM app.comment WHERE comment_id = ANY($1)",
        )
        .bind(&root_ids[..])
        .fetch_all(&mut *tx)
        .await
        .to_blog_err()?;

        lock_posts(&mut tx, &post_ids).await?;

        let links: Vec<(i64, Option<i64>)> =
            sqlx::query_as("SELECT comment_id, parent_id FROM app.comment WHERE post_id = ANY($1)")
                .bind(&post_ids[..])
                .fetch_all(&mut *tx)
                .await
                .to_blog_err()?;

        let index = ReplyIndex::new(
            links
                .into_iter()
                .map(|(comment_id, parent_id)| (CommentId(comment_id), parent_id.map(CommentId))),
        );
        let doomed = index.cascade(roots.iter().copied());

        if !doomed.is_empty() {
            let doomed_ids: Vec<i64> = doomed.iter().map(|id| id.0).collect();
            sqlx::query("DELETE FROM app.comment WHERE comment_id = ANY($1)")
                .bind(&doomed_ids[..])
                .execute(&mut *tx)
                .await
                .to_blog_err()?;
        }

        tx.commit().await.to_blog_err()?;

        tracing::debug!(posts = post_ids.len(), removed = doomed.len(), "comment trees deleted");

        Ok(doomed)
    }

    pub async fn delete_post_comments(
        deps: &impl GetDb,
        post_id: PostId,
    ) -> BlogResult<Vec<CommentId>> {
        let mut tx = deps.get_db().pg_pool.begin().await.to_blog_err()?;

        lock_posts(&mut tx, &[post_id.0]).await?;

        let removed: Vec<i64> =
            sqlx::query_scalar("DELETE FROM app.comment WHERE post_id = $1 RETURNING comment_id")
                .bind(post_id.0)
                .fetch_all(&mut *tx)
                .await
                .to_blog_err()?;

        tx.commit().await.to_blog_err()?;

        Ok(removed.into_iter().map(CommentId).collect())
    }
}

/// Conflicts with the key-share lock an insert's post foreign key takes, so
/// no reply can appear in these posts until the transaction ends.
async fn lock_posts(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    post_ids: &[i64],
) -> BlogResult<()> {
    sqlx::query("SELECT post_id FROM app.post WHERE post_id = ANY($1) ORDER BY post_id FOR UPDATE")
        .bind(post_ids)
        .fetch_all(&mut **tx)
        .await
        .to_blog_err()?;

    Ok(())
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: Filter<'_>) {
    match filter {
        Filter::TopLevel { post_id } => {
            query
                .push(" WHERE comment.post_id = ")
                .push_bind(post_id.0)
                .push(" AND comment.parent_id IS NULL");
        }
        Filter::Replies { post_id, parent_id } => {
            query
                .push(" WHERE comment.post_id = ")
                .push_bind(post_id.0)
                .push(" AND comment.parent_id = ")
                .push_bind(parent_id.0);
        }
        Filter::Search { post_id, term } => {
            query
                .push(" WHERE comment.post_id = ")
                .push_bind(post_id.0)
                .push(" AND (strpos(lower(comment.text), ")
                .push_bind(term.to_owned())
                .push(") > 0 OR strpos(lower(author.name), ")
                .push_bind(term.to_owned())
                .push(") > 0)");
        }
        Filter::RepliesOfAnyPost { parent_id } => {
            query
                .push(" WHERE comment.parent_id = ")
                .push_bind(parent_id.0);
        }
        Filter::All => {}
    }
}
