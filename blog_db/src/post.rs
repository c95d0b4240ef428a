use crate::DbResultExt;
use crate::GetDb;

use blog_domain::error::BlogResult;
use blog_domain::{PostId, UserId};

use entrait::*;

pub struct PgPostRepo;

#[entrait]
impl blog_domain::post::PostRepoImpl for PgPostRepo {
    pub async fn post_exists(deps: &impl GetDb, post_id: PostId) -> BlogResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM app.post WHERE post_id = $1)")
            .bind(post_id.0)
            .fetch_one(&deps.get_db().pg_pool)
            .await
            .to_blog_err()
    }

    pub async fn find_post_owner(
        deps: &impl GetDb,
        post_id: PostId,
    ) -> BlogResult<Option<UserId>> {
        let owner: Option<i64> =
            sqlx::query_scalar("SELECT author_id FROM app.post WHERE post_id = $1")
                .bind(post_id.0)
                .fetch_optional(&deps.get_db().pg_pool)
                .await
                .to_blog_err()?;

        Ok(owner.map(UserId))
    }

    pub async fn select_post_ids_by_owner(
        deps: &impl GetDb,
        owner: UserId,
    ) -> BlogResult<Vec<PostId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT post_id FROM app.post WHERE author_id = $1 ORDER BY post_id")
                .bind(owner.0)
                .fetch_all(&deps.get_db().pg_pool)
                .await
                .to_blog_err()?;

        Ok(ids.into_iter().map(PostId).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_test_db;
    use crate::test_data::*;

    use blog_domain::post::PostRepo;

    #[tokio::test]
    async fn post_lookups() -> BlogResult<()> {
        let Some(db) = create_test_db().await else {
            return Ok(());
        };
        let owner = insert_test_user(&db, "second").await;
        let post_id = insert_test_post(&db, owner).await;

        assert!(db.post_exists(post_id).await?);
        assert!(!db.post_exists(PostId(999)).await?);
        assert_eq!(Some(owner), db.find_post_owner(post_id).await?);
        assert_eq!(None, db.find_post_owner(PostId(999)).await?);
        assert_eq!(vec![post_id], db.select_post_ids_by_owner(owner).await?);

        Ok(())
    }
}
