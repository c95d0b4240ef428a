use blog_app::app::{App, MemApp};
use blog_app::config::Config;
use blog_app::routes::api_router;
use blog_db::mem::MemStore;
use blog_domain::user::auth::SignCaller;
use blog_domain::user::Caller;

use clap::Parser;
use entrait::Impl;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog_app=debug,blog_domain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::parse());
    let listen_addr = config.listen_addr;

    let router = match config.database_url.clone() {
        Some(database_url) => {
            let db = blog_db::Db::init(&database_url).await?;
            api_router(Impl::new(App { config, db }))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, serving seeded in-memory comments");

            let store = MemStore::seeded(time::OffsetDateTime::now_utc().into())?;
            let users = store.users()?;
            let app = Impl::new(MemApp {
                config,
                store: Arc::new(store),
            });

            for user in users {
                let token = app.sign_caller(Caller {
                    user_id: user.user_id,
                    is_admin: user.is_admin,
                });
                tracing::info!(
                    user_id = %user.user_id,
                    name = %user.name,
                    email = %user.email,
                    "token: {token}"
                );
            }

            api_router(app)
        }
    };

    blog_app::serve(router, listen_addr).await
}
