use crate::config::Config;

use blog_db::comment::PgCommentRepo;
use blog_db::mem::{GetMemStore, MemCommentRepo, MemPostRepo, MemStore};
use blog_db::post::PgPostRepo;
use blog_db::{Db, GetDb};
use blog_domain::comment::repo::DelegateCommentRepo;
use blog_domain::post::DelegatePostRepo;
use blog_domain::{GetConfig, System};

use std::sync::Arc;
use time::OffsetDateTime;

/// Application backed by Postgres.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub db: Db,
}

impl System for App {
    fn get_current_time(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

impl GetConfig for App {
    fn get_jwt_signing_key(&self) -> &hmac::Hmac<sha2::Sha384> {
        &self.config.jwt_signing_key.0
    }
}

impl GetDb for App {
    fn get_db(&self) -> &Db {
        &self.db
    }
}

impl DelegateCommentRepo<Self> for App {
    type Target = PgCommentRepo;
}

impl DelegatePostRepo<Self> for App {
    type Target = PgPostRepo;
}

/// Application backed by the process-local store.
#[derive(Clone)]
pub struct MemApp {
    pub config: Arc<Config>,
    pub store: Arc<MemStore>,
}

impl System for MemApp {
    fn get_current_time(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

impl GetConfig for MemApp {
    fn get_jwt_signing_key(&self) -> &hmac::Hmac<sha2::Sha384> {
        &self.config.jwt_signing_key.0
    }
}

impl GetMemStore for MemApp {
    fn get_mem_store(&self) -> &MemStore {
        &self.store
    }
}

impl DelegateCommentRepo<Self> for MemApp {
    type Target = MemCommentRepo;
}

impl DelegatePostRepo<Self> for MemApp {
    type Target = MemPostRepo;
}
