pub mod link;
pub mod user;

pub use link::{CreateLinkRequest, Link};
pub use user::{UpsertUserRequest, User};
