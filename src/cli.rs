use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "cairn",
    version,
    about = "Track shared goals and follow other people's progress"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "CAIRN_DATA_DIR",
        default_value = ".",
        value_name = "PATH",
        help = "Directory holding the cairn database"
    )]
    pub data_dir: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Follow(FollowCommand),
    #[command(subcommand)]
    Goal(GoalCommand),
    Feed(Feed),
    #[command(subcommand)]
    Reaction(ReactionCommand),
    #[command(subcommand)]
    Comment(CommentCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Add(UserAdd),
    Show(UserShow),
    Search(UserSearch),
    Leaders(UserLeaders),
    Followers(UserFollowers),
    Remove(UserRemove),
}

#[derive(Subcommand, Debug)]
pub enum FollowCommand {
    Add(FollowEdge),
    Remove(FollowEdge),
    Counts(FollowCounts),
}

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    Add(GoalAdd),
    List(GoalList),
    Show(GoalShow),
    Update(GoalUpdate),
    Remove(GoalRemove),
}

#[derive(Subcommand, Debug)]
pub enum ReactionCommand {
    Add(ReactionAdd),
    List(ReactionList),
    Remove(ReactionRemove),
}

#[derive(Subcommand, Debug)]
pub enum CommentCommand {
    Add(CommentAdd),
    List(CommentList),
    Counts(CommentCounts),
    Subscribe(CommentSubscribe),
    Unread(CommentUnread),
    #[command(name = "mark-read")]
    MarkRead(CommentMarkRead),
}

#[derive(Args, Debug)]
pub struct UserAdd {
    pub username: String,
    pub email: String,
}

#[derive(Args, Debug)]
pub struct UserShow {
    #[arg(long, value_name = "ID", conflicts_with_all = ["username", "email"])]
    pub id: Option<Uuid>,
    #[arg(long, value_name = "NAME", conflicts_with = "email")]
    pub username: Option<String>,
    #[arg(long, value_name = "EMAIL")]
    pub email: Option<String>,
}

#[derive(Args, Debug)]
pub struct UserSearch {
    #[arg(value_name = "VIEWER_ID")]
    pub viewer_id: Uuid,
}

#[derive(Args, Debug)]
pub struct UserLeaders {
    pub user_id: Uuid,
}

#[derive(Args, Debug)]
pub struct UserFollowers {
    pub user_id: Uuid,
}

#[derive(Args, Debug)]
pub struct UserRemove {
    pub user_id: Uuid,
}

#[derive(Args, Debug)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub leader_id: Uuid,
}

#[derive(Args, Debug)]
pub struct FollowCounts {
    pub user_id: Uuid,
}

#[derive(Args, Debug)]
pub struct GoalAdd {
    pub user_id: Uuid,
    pub description: String,
    #[arg(long, value_name = "GOAL_ID")]
    pub parent: Option<Uuid>,
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,
    #[arg(long, value_name = "DATETIME", help = "Due date, RFC 3339")]
    pub due: Option<DateTime<Utc>>,
    #[arg(long)]
    pub completed: bool,
}

#[derive(Args, Debug)]
pub struct GoalList {
    #[arg(
        long,
        value_name = "USER_ID",
        conflicts_with = "ids",
        required_unless_present = "ids"
    )]
    pub owner: Option<Uuid>,
    #[arg(long, value_name = "GOAL_ID", num_args = 1..)]
    pub ids: Vec<Uuid>,
    #[arg(long, help = "Only announcement-eligible goals")]
    pub eligible: bool,
}

#[derive(Args, Debug)]
pub struct GoalShow {
    pub goal_id: Uuid,
}

#[derive(Args, Debug)]
pub struct GoalUpdate {
    pub goal_id: Uuid,
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
    #[arg(long, value_name = "DATETIME")]
    pub due: Option<DateTime<Utc>>,
    #[arg(long, conflicts_with = "open")]
    pub completed: bool,
    #[arg(long)]
    pub open: bool,
}

#[derive(Args, Debug)]
pub struct GoalRemove {
    pub goal_id: Uuid,
}

#[derive(Args, Debug)]
pub struct Feed {
    pub user_id: Uuid,
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ReactionAdd {
    pub user_id: Uuid,
    pub goal_id: Uuid,
    #[arg(value_name = "JSON", help = "Reaction payload as a JSON document")]
    pub reaction: String,
    #[arg(
        long,
        value_name = "LIBRARY",
        default_value = "rn-emoji-keyboard:^1.7.0"
    )]
    pub library: String,
}

#[derive(Args, Debug)]
pub struct ReactionList {
    pub goal_id: Uuid,
}

#[derive(Args, Debug)]
pub struct ReactionRemove {
    pub reaction_id: Uuid,
}

#[derive(Args, Debug)]
pub struct CommentAdd {
    pub user_id: Uuid,
    pub goal_id: Uuid,
    pub comment: String,
}

#[derive(Args, Debug)]
pub struct CommentList {
    #[arg(
        long,
        value_name = "GOAL_ID",
        conflicts_with = "author",
        required_unless_present = "author"
    )]
    pub goal: Option<Uuid>,
    #[arg(long, value_name = "USER_ID")]
    pub author: Option<Uuid>,
}

#[derive(Args, Debug)]
pub struct CommentCounts {
    #[arg(value_name = "GOAL_ID", num_args = 1..)]
    pub goal_ids: Vec<Uuid>,
}

#[derive(Args, Debug)]
pub struct CommentSubscribe {
    pub user_id: Uuid,
    pub goal_id: Uuid,
}

#[derive(Args, Debug)]
pub struct CommentUnread {
    pub user_id: Uuid,
    #[arg(long, help = "Print the count only")]
    pub count: bool,
}

#[derive(Args, Debug)]
pub struct CommentMarkRead {
    pub user_id: Uuid,
    #[arg(value_name = "COMMENT_ID", num_args = 1..)]
    pub comment_ids: Vec<Uuid>,
}
