pub mod comment;
pub mod error;
pub mod post;
pub mod timestamp;
pub mod user;

mod id;

pub use id::{CommentId, PostId, UserId};

use entrait::entrait;

///
/// Mockable system abstraction
///
#[entrait]
pub trait System {
    fn get_current_time(&self) -> time::OffsetDateTime;
}

///
/// Mockable config accessor
///
#[entrait]
pub trait GetConfig {
    fn get_jwt_signing_key(&self) -> &hmac::Hmac<sha2::Sha384>;
}
