pub mod auth;

use crate::UserId;

/// The authenticated party behind a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Caller {
    /// Admins may modify anything, everybody else only what they wrote.
    pub fn may_mutate(&self, author_id: UserId) -> bool {
        self.is_admin || self.user_id == author_id
    }
}
