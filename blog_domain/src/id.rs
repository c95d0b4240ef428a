use crate::error::{BlogError, BlogResult};

use std::borrow::Cow;

/// Numeric surrogate keys. Query parameters and path segments arrive as text,
/// so each id knows how to parse itself into a `BadRequest`-flavoured result.
macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Eq,
            PartialEq,
            Hash,
            Ord,
            PartialOrd,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn parse_param(
                field: impl Into<Cow<'static, str>>,
                raw: &str,
            ) -> BlogResult<Self> {
                raw.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| BlogError::bad_request(field, format!("`{raw}` is not a number")))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

surrogate_id!(UserId);
surrogate_id!(PostId);
surrogate_id!(
    /// Comment ids are handed out in increasing order and never reused,
    /// so ascending id is also insertion order.
    CommentId
);
