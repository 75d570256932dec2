use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entities::{comment, goal, reaction, user};

pub const DEFAULT_FEED_LIMIT: u64 = 20;

/// Exactly one way to look up a single user.
#[derive(Clone, Debug)]
pub enum UserLookup {
    Id(Uuid),
    Username(String),
    Email(String),
}

/// Exactly one way to select a set of goals.
#[derive(Clone, Debug)]
pub enum GoalFilter {
    OwnedBy(Uuid),
    ByIds(Vec<Uuid>),
}

/// Exactly one way to select a set of comments.
#[derive(Clone, Debug)]
pub enum CommentFilter {
    ByAuthor(Uuid),
    ByGoal(Uuid),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewGoal {
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GoalChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_completed: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewReaction {
    pub user_id: Uuid,
    pub goal_id: Uuid,
    pub reaction: Value,
    pub reaction_library: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewComment {
    pub user_id: Uuid,
    pub goal_id: Uuid,
    pub comment: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: u64,
    pub leaders: u64,
}

/// A user annotated with whether the searching user already follows them.
#[derive(Clone, Debug, Serialize)]
pub struct UserSearchResult {
    pub user: user::Model,
    pub leader: bool,
}

/// A goal joined with its owner and, for sub-goals, its parent.
#[derive(Clone, Debug, Serialize)]
pub struct GoalView {
    pub goal: goal::Model,
    pub user: user::Model,
    pub parent: Option<goal::Model>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommentView {
    pub comment: comment::Model,
    pub user: user::Model,
}

/// A feed-ready projection of an announcement-eligible goal.
#[derive(Clone, Debug, Serialize)]
pub struct Announcement {
    pub goal: goal::Model,
    pub user: user::Model,
    pub parent: Option<goal::Model>,
    pub reactions: Vec<reaction::Model>,
    pub comment_count: i64,
    pub sort_on: DateTime<Utc>,
}
