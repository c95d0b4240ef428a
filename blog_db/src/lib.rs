pub mod comment;
pub mod mem;
pub mod post;

use blog_domain::error::{BlogError, BlogResult};

use anyhow::Context;
use entrait::*;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Db {
    pub pg_pool: PgPool,
}

impl Db {
    pub async fn init(url: &str) -> anyhow::Result<Self> {
        let pg_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(50)
            .connect(url)
            .await
            .context("could not connect to database_url")?;

        sqlx::migrate!("../migrations").run(&pg_pool).await?;

        Ok(Db { pg_pool })
    }
}

#[entrait]
pub trait GetDb {
    fn get_db(&self) -> &Db;
}

impl GetDb for Db {
    fn get_db(&self) -> &Db {
        self
    }
}

trait DbResultExt<T> {
    fn to_blog_err(self) -> BlogResult<T>;

    /// Translate a violation of a named constraint into a domain error.
    /// Constraints the mapper does not recognize stay internal errors.
    fn on_constraint(self, map: impl FnOnce(&str) -> Option<BlogError>) -> BlogResult<T>;
}

impl<T> DbResultExt<T> for Result<T, sqlx::Error> {
    fn to_blog_err(self) -> BlogResult<T> {
        self.map_err(|e| BlogError::Anyhow(e.into()))
    }

    fn on_constraint(self, map: impl FnOnce(&str) -> Option<BlogError>) -> BlogResult<T> {
        self.map_err(|e| {
            let mapped = match &e {
                sqlx::Error::Database(dbe) => dbe.constraint().and_then(map),
                _ => None,
            };
            mapped.unwrap_or_else(|| BlogError::Anyhow(e.into()))
        })
    }
}

#[cfg(test)]
impl blog_domain::comment::repo::DelegateCommentRepo<Self> for Db {
    type Target = comment::PgCommentRepo;
}

#[cfg(test)]
impl blog_domain::post::DelegatePostRepo<Self> for Db {
    type Target = post::PgPostRepo;
}

/// A fresh database per test thread, or `None` when no `DATABASE_URL` is
/// configured and Postgres tests should be skipped.
#[cfg(test)]
async fn create_test_db() -> Option<entrait::Impl<Db>> {
    use sha2::Digest;
    use sqlx::Connection;

    let mut url = database_server_url()?;

    let mut hasher = sha2::Sha256::new();
    hasher.update(std::thread::current().name().unwrap().as_bytes());
    let thread_hash = hex::encode(hasher.finalize());
    let db_name = &thread_hash[0..24];

    let mut connection = sqlx::PgConnection::connect(url.as_str()).await.unwrap();

    sqlx::query(&format!(r#"DROP DATABASE IF EXISTS "{db_name}""#))
        .execute(&mut connection)
        .await
        .expect("failed to drop");

    sqlx::query(&format!(r#"CREATE DATABASE "{db_name}""#))
        .execute(&mut connection)
        .await
        .expect("failed creating test database");

    url.set_path(db_name);

    let pg_pool = sqlx::PgPool::connect(url.as_str())
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pg_pool)
        .await
        .expect("Failed to migrate");

    Some(entrait::Impl::new(Db { pg_pool }))
}

#[cfg(test)]
fn database_server_url() -> Option<url::Url> {
    // (re)load the .env file
    dotenv::dotenv().ok();

    let mut url: url::Url = std::env::var("DATABASE_URL")
        .ok()?
        .parse()
        .expect("malformed DATABASE_URL");

    if let Ok(mut path) = url.path_segments_mut() {
        path.clear();
    }

    Some(url)
}
