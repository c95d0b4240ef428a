use blog_domain::comment::query::ListCommentsQuery;
use blog_domain::comment::{self, Comment, CommentCreate, CommentPage, CommentUpdate};
use blog_domain::error::{BlogError, BlogResult};
use blog_domain::post::PostRepo;
use blog_domain::user::auth::{Authenticate, Token};
use blog_domain::{CommentId, PostId, UserId};

use axum::extract::{Extension, Path, Query};
use axum::routing::{delete, get};
use axum::Json;

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct Deleted {
    pub deleted: u64,
}

pub struct CommentRoutes<D>(std::marker::PhantomData<D>);

impl<D> CommentRoutes<D>
where
    D: comment::Api + PostRepo + Authenticate + Sized + Clone + Send + Sync + 'static,
{
    pub fn router() -> axum::Router {
        axum::Router::new()
            .route(
                "/comments",
                get(Self::list_comments).post(Self::add_comment),
            )
            .route(
                "/comments/:id",
                get(Self::get_comment)
                    .put(Self::update_comment)
                    .delete(Self::delete_comment),
            )
            .route(
                "/posts/:post_id/comments",
                delete(Self::delete_post_comments),
            )
            .route(
                "/users/:user_id/comments",
                delete(Self::delete_author_comments),
            )
    }

    async fn list_comments(
        Extension(deps): Extension<D>,
        Query(query): Query<ListCommentsQuery>,
    ) -> BlogResult<Json<CommentPage>> {
        Ok(Json(deps.list_comments(query).await?))
    }

    async fn get_comment(
        Extension(deps): Extension<D>,
        Path(id): Path<String>,
    ) -> BlogResult<Json<Comment>> {
        let comment_id = CommentId::parse_param("id", &id)?;
        Ok(Json(deps.fetch_comment(comment_id).await?))
    }

    async fn add_comment(
        Extension(deps): Extension<D>,
        token: Token,
        Json(body): Json<CommentCreate>,
    ) -> BlogResult<Json<Comment>> {
        let caller = deps.authenticate(token)?;
        Ok(Json(deps.add_comment(caller.user_id, body).await?))
    }

    async fn update_comment(
        Extension(deps): Extension<D>,
        token: Token,
        Path(id): Path<String>,
        Json(body): Json<CommentUpdate>,
    ) -> BlogResult<Json<Comment>> {
        let caller = deps.authenticate(token)?;
        let comment_id = CommentId::parse_param("id", &id)?;
        let existing = deps.fetch_comment(comment_id).await?;

        Ok(Json(
            deps.update_comment(comment_id, body, caller.may_mutate(existing.author_id))
                .await?,
        ))
    }

    async fn delete_comment(
        Extension(deps): Extension<D>,
        token: Token,
        Path(id): Path<String>,
    ) -> BlogResult<()> {
        let caller = deps.authenticate(token)?;
        let comment_id = CommentId::parse_param("id", &id)?;
        let existing = deps.fetch_comment(comment_id).await?;

        deps.delete_comment(comment_id, caller.may_mutate(existing.author_id))
            .await
    }

    /// For the post subsystem: the post's owner or an admin may clear it.
    async fn delete_post_comments(
        Extension(deps): Extension<D>,
        token: Token,
        Path(post_id): Path<String>,
    ) -> BlogResult<Json<Deleted>> {
        let caller = deps.authenticate(token)?;
        let post_id = PostId::parse_param("postId", &post_id)?;
        let owner = deps
            .find_post_owner(post_id)
            .await?
            .ok_or(BlogError::PostNotFound(post_id))?;

        if !caller.may_mutate(owner) {
            return Err(BlogError::Forbidden);
        }

        Ok(Json(Deleted {
            deleted: deps.delete_all_comments_for_post(post_id).await?,
        }))
    }

    /// For the user subsystem: a user's own account, or any account for admins.
    async fn delete_author_comments(
        Extension(deps): Extension<D>,
        token: Token,
        Path(user_id): Path<String>,
    ) -> BlogResult<Json<Deleted>> {
        let caller = deps.authenticate(token)?;
        let user_id = UserId::parse_param("userId", &user_id)?;

        if !caller.may_mutate(user_id) {
            return Err(BlogError::Forbidden);
        }

        Ok(Json(Deleted {
            deleted: deps.delete_all_comments_for_author(user_id).await?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MemApp;
    use crate::test_util::*;
    use blog_db::mem::MemStore;
    use blog_domain::user::auth::SignCaller;
    use blog_domain::user::Caller;

    use axum::http::header::AUTHORIZATION;
    use axum::http::{Request, StatusCode};
    use entrait::Impl;
    use std::sync::Arc;

    struct TestServer {
        deps: Impl<MemApp>,
        author: String,
        stranger: String,
        admin: String,
        author_id: UserId,
        post_id: PostId,
    }

    impl TestServer {
        fn new() -> Self {
            let store = MemStore::new();
            let author_id = store.insert_user("first", "first@gmail.com", false).unwrap();
            let stranger_id = store.insert_user("second", "second@gmail.com", false).unwrap();
            let admin_id = store.insert_user("admin", "admin@gmail.com", true).unwrap();
            let post_id = store.insert_post(stranger_id).unwrap();

            let deps = Impl::new(MemApp {
                config: Arc::new(test_config()),
                store: Arc::new(store),
            });
            let token = |user_id, is_admin| deps.sign_caller(Caller { user_id, is_admin });

            Self {
                author: token(author_id, false),
                stranger: token(stranger_id, false),
                admin: token(admin_id, true),
                author_id,
                post_id,
                deps,
            }
        }

        fn router(&self) -> axum::Router {
            crate::routes::api_router(self.deps.clone())
        }

        async fn post_comment(&self, token: &str, parent_id: Option<CommentId>) -> Comment {
            let (status, comment) = request_json::<Comment>(
                self.router(),
                Request::post("/api/comments")
                    .header(AUTHORIZATION, format!("Token {token}"))
                    .with_json_body(CommentCreate {
                        post_id: self.post_id,
                        parent_id,
                        text: "Super post!".to_string(),
                    }),
            )
            .await
            .unwrap();
            assert_eq!(StatusCode::OK, status);
            comment
        }
    }

    #[tokio::test]
    async fn add_comment_without_token_should_give_401() {
        let server = TestServer::new();

        let (status, _) = request(
            server.router(),
            Request::post("/api/comments").with_json_body(CommentCreate {
                post_id: server.post_id,
                parent_id: None,
                text: "anonymous".to_string(),
            }),
        )
        .await;

        assert_eq!(StatusCode::UNAUTHORIZED, status);
    }

    #[tokio::test]
    async fn added_comment_can_be_fetched() {
        let server = TestServer::new();
        let comment = server.post_comment(&server.author, None).await;

        assert_eq!(server.author_id, comment.author_id);
        assert_eq!("first", comment.author_name);

        let (status, fetched) = request_json::<Comment>(
            server.router(),
            Request::get(format!("/api/comments/{}", comment.id)).empty_body(),
        )
        .await
        .unwrap();

        assert_eq!(StatusCode::OK, status);
        assert_eq!(comment, fetched);
    }

    #[tokio::test]
    async fn listing_has_pagination_flags() {
        let server = TestServer::new();
        for _ in 0..6 {
            server.post_comment(&server.author, None).await;
        }

        let (status, page) = request_json::<CommentPage>(
            server.router(),
            Request::get(format!(
                "/api/comments?postId={}&topLevel=true&limit=5&page=1",
                server.post_id
            ))
            .empty_body(),
        )
        .await
        .unwrap();

        assert_eq!(StatusCode::OK, status);
        assert_eq!(5, page.result.len());
        assert!(page.has_next);
        assert!(!page.has_previous);
    }

    #[tokio::test]
    async fn malformed_post_id_should_give_400() {
        let server = TestServer::new();

        let (status, body) = request(
            server.router(),
            Request::get("/api/comments?postId=abc").empty_body(),
        )
        .await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        let errors: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(errors["errors"]["postId"].is_array());
    }

    #[tokio::test]
    async fn missing_comment_should_give_404() {
        let server = TestServer::new();

        let (status, _) = request(
            server.router(),
            Request::get("/api/comments/999").empty_body(),
        )
        .await;

        assert_eq!(StatusCode::NOT_FOUND, status);
    }

    #[tokio::test]
    async fn only_author_or_admin_may_update() {
        let server = TestServer::new();
        let comment = server.post_comment(&server.author, None).await;
        let update = |token: &str| {
            Request::put(format!("/api/comments/{}", comment.id))
                .header(AUTHORIZATION, format!("Token {token}"))
                .with_json_body(CommentUpdate {
                    text: "edited".to_string(),
                })
        };

        let (status, _) = request(server.router(), update(&server.stranger)).await;
        assert_eq!(StatusCode::FORBIDDEN, status);

        let (status, updated) = request_json::<Comment>(server.router(), update(&server.admin))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, status);
        assert_eq!("edited", updated.text);
        assert_eq!(comment.author_id, updated.author_id);
    }

    #[tokio::test]
    async fn delete_cascades_through_replies() {
        let server = TestServer::new();
        let root = server.post_comment(&server.author, None).await;
        let reply = server.post_comment(&server.stranger, Some(root.id)).await;
        server.post_comment(&server.admin, Some(reply.id)).await;

        let delete_root = |token: &str| {
            Request::delete(format!("/api/comments/{}", root.id))
                .header(AUTHORIZATION, format!("Token {token}"))
                .empty_body()
        };

        let (status, _) = request(server.router(), delete_root(&server.stranger)).await;
        assert_eq!(StatusCode::FORBIDDEN, status);

        let (status, _) = request(server.router(), delete_root(&server.author)).await;
        assert_eq!(StatusCode::OK, status);

        let (_, page) = request_json::<CommentPage>(
            server.router(),
            Request::get("/api/comments").empty_body(),
        )
        .await
        .unwrap();
        assert!(page.result.is_empty());
    }

    #[tokio::test]
    async fn post_owner_may_clear_post_comments() {
        let server = TestServer::new();
        server.post_comment(&server.author, None).await;
        server.post_comment(&server.author, None).await;

        let clear = |token: &str| {
            Request::delete(format!("/api/posts/{}/comments", server.post_id))
                .header(AUTHORIZATION, format!("Token {token}"))
                .empty_body()
        };

        let (status, _) = request(server.router(), clear(&server.author)).await;
        assert_eq!(StatusCode::FORBIDDEN, status);

        let (status, deleted) = request_json::<Deleted>(server.router(), clear(&server.stranger))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, status);
        assert_eq!(2, deleted.deleted);
    }

    #[tokio::test]
    async fn admin_may_clear_author_comments() {
        let server = TestServer::new();
        server.post_comment(&server.author, None).await;

        let (status, deleted) = request_json::<Deleted>(
            server.router(),
            Request::delete(format!("/api/users/{}/comments", server.author_id))
                .header(AUTHORIZATION, format!("Token {}", server.admin))
                .empty_body(),
        )
        .await
        .unwrap();

        assert_eq!(StatusCode::OK, status);
        assert_eq!(1, deleted.deleted);
    }
}
