pub mod comment;
pub mod comment_sub;
pub mod follow;
pub mod goal;
pub mod reaction;
pub mod unread_comment;
pub mod user;
