use super::repo::{Filter, Window};
use crate::error::{BlogError, BlogResult};
use crate::{CommentId, PostId};

pub const DEFAULT_PAGE_LIMIT: i64 = 5;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Raw listing parameters as they arrive in the query string.
///
/// Ids and paging numbers are kept as text so that a malformed value becomes
/// a field-level `BadRequest` rather than a generic extractor rejection.
#[derive(serde::Deserialize, Default, Debug, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ListCommentsQuery {
    pub post_id: Option<String>,
    pub parent_id: Option<String>,
    /// Explicit marker for "comments without a parent".
    pub top_level: bool,
    pub name: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Which comments to list, with the search term normalised.
#[derive(Debug, Eq, PartialEq)]
pub enum Selection {
    TopLevel {
        post_id: PostId,
    },
    Replies {
        post_id: PostId,
        parent_id: CommentId,
    },
    Search {
        post_id: PostId,
        term: String,
    },
    RepliesOfAnyPost {
        parent_id: CommentId,
    },
    All,
}

impl Selection {
    pub fn filter(&self) -> Filter<'_> {
        match self {
            Self::TopLevel { post_id } => Filter::TopLevel { post_id: *post_id },
            Self::Replies { post_id, parent_id } => Filter::Replies {
                post_id: *post_id,
                parent_id: *parent_id,
            },
            Self::Search { post_id, term } => Filter::Search {
                post_id: *post_id,
                term,
            },
            Self::RepliesOfAnyPost { parent_id } => Filter::RepliesOfAnyPost {
                parent_id: *parent_id,
            },
            Self::All => Filter::All,
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct PageRequest {
    /// 1-based.
    pub page: i64,
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn start_index(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn window(&self) -> Window {
        Window {
            offset: self.start_index(),
            limit: self.limit,
        }
    }

    /// `(has_next, has_previous)` for a filtered set of `total` comments.
    pub fn flags(&self, total: i64) -> (bool, bool) {
        let start = self.start_index();
        (start + self.limit < total, start - self.limit >= 0)
    }
}

impl ListCommentsQuery {
    pub fn resolve(&self) -> BlogResult<(Selection, PageRequest)> {
        Ok((self.selection()?, self.page_request()?))
    }

    fn selection(&self) -> BlogResult<Selection> {
        let post_id = self
            .post_id
            .as_deref()
            .map(|raw| PostId::parse_param("postId", raw))
            .transpose()?;
        let parent_id = self
            .parent_id
            .as_deref()
            .map(|raw| CommentId::parse_param("parentId", raw))
            .transpose()?;

        if self.top_level && parent_id.is_some() {
            return Err(BlogError::bad_request(
                "topLevel",
                "cannot be combined with parentId",
            ));
        }

        Ok(match (post_id, parent_id) {
            (Some(post_id), None) if self.top_level => Selection::TopLevel { post_id },
            (Some(post_id), Some(parent_id)) => Selection::Replies { post_id, parent_id },
            (Some(post_id), None) => Selection::Search {
                post_id,
                term: self.name.as_deref().unwrap_or_default().to_lowercase(),
            },
            (None, Some(parent_id)) => Selection::RepliesOfAnyPost { parent_id },
            (None, None) if self.top_level => {
                return Err(BlogError::bad_request("topLevel", "requires postId"));
            }
            (None, None) => Selection::All,
        })
    }

    fn page_request(&self) -> BlogResult<PageRequest> {
        let defaults = PageRequest::default();
        let page = parse_positive("page", self.page.as_deref())?.unwrap_or(defaults.page);
        let limit = parse_positive("limit", self.limit.as_deref())?.unwrap_or(defaults.limit);

        if limit > MAX_PAGE_LIMIT {
            return Err(BlogError::bad_request(
                "limit",
                format!("must not exceed {MAX_PAGE_LIMIT}"),
            ));
        }
        // Keep `(page - 1) * limit` well inside i64.
        if page > i64::MAX / MAX_PAGE_LIMIT {
            return Err(BlogError::bad_request("page", "is out of range"));
        }

        Ok(PageRequest { page, limit })
    }
}

fn parse_positive(field: &'static str, raw: Option<&str>) -> BlogResult<Option<i64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 1 => Ok(Some(value)),
        Ok(_) => Err(BlogError::bad_request(field, "must be at least 1")),
        Err(_) => Err(BlogError::bad_request(
            field,
            format!("`{raw}` is not a number"),
        )),
    }
}
