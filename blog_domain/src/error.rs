use crate::{CommentId, PostId};

use axum::http::header::WWW_AUTHENTICATE;
use axum::http::StatusCode;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::borrow::Cow;
use std::collections::HashMap;

pub type BlogResult<T, E = BlogError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum BlogError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("post {0} not found")]
    PostNotFound(PostId),

    #[error("comment {0} not found")]
    CommentNotFound(CommentId),

    #[error("parent comment {0} not found")]
    ParentNotFound(CommentId),

    #[error("parent comment {parent_id} does not belong to post {post_id}")]
    InvalidRelation {
        parent_id: CommentId,
        post_id: PostId,
    },

    #[error("{field}: {message}")]
    BadRequest {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("an internal server error occurred")]
    Anyhow(#[from] anyhow::Error),
}

impl BlogError {
    pub fn bad_request(
        field: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::BadRequest {
            field: field.into(),
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::PostNotFound(_) => StatusCode::NOT_FOUND,
            Self::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Self::ParentNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRelation { .. } => StatusCode::BAD_REQUEST,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for BlogError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (
                self.status_code(),
                [(WWW_AUTHENTICATE, HeaderValue::from_static("Token"))]
                    .into_iter()
                    .collect::<HeaderMap>(),
                self.to_string(),
            )
                .into_response(),
            Self::Forbidden => (self.status_code(), ()).into_response(),
            Self::PostNotFound(_) => {
                errors_response(self.status_code(), "postId", self.to_string())
            }
            Self::CommentNotFound(_) => {
                errors_response(self.status_code(), "id", self.to_string())
            }
            Self::ParentNotFound(_) => {
                errors_response(self.status_code(), "parentId", self.to_string())
            }
            Self::InvalidRelation { .. } => {
                errors_response(self.status_code(), "parentId", self.to_string())
            }
            Self::BadRequest {
                ref field,
                ref message,
            } => errors_response(self.status_code(), field.clone(), message.clone()),
            Self::Anyhow(ref e) => {
                tracing::error!("Generic error: {:?}", e);
                (self.status_code(), self.to_string()).into_response()
            }
        }
    }
}

#[derive(serde::Serialize)]
struct JsonErrors {
    errors: HashMap<Cow<'static, str>, Vec<Cow<'static, str>>>,
}

fn errors_response(
    status: StatusCode,
    field: impl Into<Cow<'static, str>>,
    message: impl Into<Cow<'static, str>>,
) -> Response {
    (
        status,
        Json(JsonErrors {
            errors: HashMap::from([(field.into(), vec![message.into()])]),
        }),
    )
        .into_response()
}
