mod comment_routes;

pub use comment_routes::CommentRoutes;

use blog_domain::comment;
use blog_domain::post::PostRepo;
use blog_domain::user::auth::Authenticate;

use axum::extract::Extension;
use axum::routing::Router;
use tower_http::trace::TraceLayer;

/// Axum API router over any fully wired application.
pub fn api_router<D>(deps: D) -> axum::Router
where
    D: comment::Api + PostRepo + Authenticate + Sized + Clone + Send + Sync + 'static,
{
    Router::new()
        .nest("/api", CommentRoutes::<D>::router())
        .layer(Extension(deps))
        .layer(TraceLayer::new_for_http())
}
