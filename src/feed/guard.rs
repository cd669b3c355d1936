use crate::db::models::Post;
use crate::feed::domain::UserId;

/// Only the creator may change or remove a post.
pub fn can_mutate(identity: &UserId, post: &Post) -> bool {
    post.creator == *identity
}
