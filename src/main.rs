mod app;
mod cli;
mod db;
mod entities;
mod error;
mod model;
mod util;

use clap::Parser;

use crate::app::App;
use crate::cli::{
    Cli, Command, CommentAdd, CommentCommand, CommentCounts, CommentList, CommentMarkRead,
    CommentSubscribe,
    CommentUnread, Feed, FollowCommand, FollowCounts, FollowEdge, GoalAdd, GoalCommand, GoalList,
    GoalRemove, GoalShow, GoalUpdate, ReactionAdd, ReactionCommand, ReactionList, ReactionRemove,
    UserAdd, UserCommand, UserFollowers, UserLeaders, UserRemove, UserSearch, UserShow,
};
use crate::error::AppError;
use crate::model::{
    CommentFilter, GoalChanges, GoalFilter, NewComment, NewGoal, NewReaction, NewUser, UserLookup,
    DEFAULT_FEED_LIMIT,
};
use crate::util::{
    format_announcement, format_comment_line, format_goal_detail, format_goal_line,
    format_reaction_line, format_search_result, format_user_detail, format_user_line,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Cli { data_dir, command } = Cli::parse();

    // the sqlite URL needs an absolute path; the flag accepts relative ones
    let data_dir = std::path::absolute(&data_dir)?;
    let db_path = db::resolve_db_path(&data_dir);
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    let app = App::new(db);

    match command {
        Command::User(command) => handle_user(&app, command).await,
        Command::Follow(command) => handle_follow(&app, command).await,
        Command::Goal(command) => handle_goal(&app, command).await,
        Command::Feed(args) => handle_feed(&app, args).await,
        Command::Reaction(command) => handle_reaction(&app, command).await,
        Command::Comment(command) => handle_comment(&app, command).await,
    }
}

async fn handle_user(app: &App, command: UserCommand) -> Result<(), AppError> {
    match command {
        UserCommand::Add(args) => handle_user_add(app, args).await,
        UserCommand::Show(args) => handle_user_show(app, args).await,
        UserCommand::Search(args) => handle_user_search(app, args).await,
        UserCommand::Leaders(args) => handle_user_leaders(app, args).await,
        UserCommand::Followers(args) => handle_user_followers(app, args).await,
        UserCommand::Remove(args) => handle_user_remove(app, args).await,
    }
}

async fn handle_user_add(app: &App, args: UserAdd) -> Result<(), AppError> {
    let user = app
        .create_user(NewUser {
            username: args.username,
            email: args.email,
        })
        .await?;
    println!("Created user ID: {}: {}", user.id, user.username);
    Ok(())
}

async fn handle_user_show(app: &App, args: UserShow) -> Result<(), AppError> {
    let lookup = match (args.id, args.username, args.email) {
        (Some(id), _, _) => UserLookup::Id(id),
        (_, Some(username), _) => UserLookup::Username(username),
        (_, _, Some(email)) => UserLookup::Email(email),
        _ => {
            return Err(AppError::InvalidInput(
                "one of --id, --username or --email is required".to_string(),
            ))
        }
    };
    match app.get_user(lookup).await? {
        Some(user) => println!("{}", format_user_detail(&user)),
        None => println!("No user found."),
    }
    Ok(())
}

async fn handle_user_search(app: &App, args: UserSearch) -> Result<(), AppError> {
    let results = app.search_users(args.viewer_id).await?;
    if results.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    for result in &results {
        println!("{}", format_search_result(result));
    }
    Ok(())
}

async fn handle_user_leaders(app: &App, args: UserLeaders) -> Result<(), AppError> {
    let leaders = app.leaders(args.user_id).await?;
    if leaders.is_empty() {
        println!("No leaders found.");
        return Ok(());
    }
    for leader in &leaders {
        println!("{}", format_user_line(leader));
    }
    Ok(())
}

async fn handle_user_followers(app: &App, args: UserFollowers) -> Result<(), AppError> {
    let followers = app.followers(args.user_id).await?;
    if followers.is_empty() {
        println!("No followers found.");
        return Ok(());
    }
    for follower in &followers {
        println!("{}", format_user_line(follower));
    }
    Ok(())
}

async fn handle_user_remove(app: &App, args: UserRemove) -> Result<(), AppError> {
    app.delete_user(args.user_id).await?;
    println!("User ID: {} removed.", args.user_id);
    Ok(())
}

async fn handle_follow(app: &App, command: FollowCommand) -> Result<(), AppError> {
    match command {
        FollowCommand::Add(args) => handle_follow_add(app, args).await,
        FollowCommand::Remove(args) => handle_follow_remove(app, args).await,
        FollowCommand::Counts(args) => handle_follow_counts(app, args).await,
    }
}

async fn handle_follow_add(app: &App, args: FollowEdge) -> Result<(), AppError> {
    let edge = app.create_follow(args.follower_id, args.leader_id).await?;
    println!("User {} now follows {}.", edge.follower_id, edge.leader_id);
    Ok(())
}

async fn handle_follow_remove(app: &App, args: FollowEdge) -> Result<(), AppError> {
    app.delete_follow(args.follower_id, args.leader_id).await?;
    println!(
        "User {} no longer follows {}.",
        args.follower_id, args.leader_id
    );
    Ok(())
}

async fn handle_follow_counts(app: &App, args: FollowCounts) -> Result<(), AppError> {
    let counts = app.follow_counts(args.user_id).await?;
    println!("Followers: {}", counts.followers);
    println!("Following: {}", counts.leaders);
    Ok(())
}

async fn handle_goal(app: &App, command: GoalCommand) -> Result<(), AppError> {
    match command {
        GoalCommand::Add(args) => handle_goal_add(app, args).await,
        GoalCommand::List(args) => handle_goal_list(app, args).await,
        GoalCommand::Show(args) => handle_goal_show(app, args).await,
        GoalCommand::Update(args) => handle_goal_update(app, args).await,
        GoalCommand::Remove(args) => handle_goal_remove(app, args).await,
    }
}

async fn handle_goal_add(app: &App, args: GoalAdd) -> Result<(), AppError> {
    let goal = app
        .create_goal(NewGoal {
            user_id: args.user_id,
            parent_id: args.parent,
            title: args.title,
            description: args.description,
            due_date: args.due,
            is_completed: args.completed,
        })
        .await?;
    println!("Created goal ID: {}: {}", goal.id, goal.description);
    Ok(())
}

async fn handle_goal_list(app: &App, args: GoalList) -> Result<(), AppError> {
    let filter = match args.owner {
        Some(owner) => GoalFilter::OwnedBy(owner),
        None => GoalFilter::ByIds(args.ids),
    };
    let views = app.fetch_goals(filter, args.eligible).await?;
    if views.is_empty() {
        println!("No goals found.");
        return Ok(());
    }
    for view in &views {
        println!("{}", format_goal_line(view));
    }
    Ok(())
}

async fn handle_goal_show(app: &App, args: GoalShow) -> Result<(), AppError> {
    let views = app
        .fetch_goals(GoalFilter::ByIds(vec![args.goal_id]), false)
        .await?;
    match views.first() {
        Some(view) => println!("{}", format_goal_detail(view)),
        None => return Err(AppError::NotFound(format!("goal id {}", args.goal_id))),
    }
    Ok(())
}

async fn handle_goal_update(app: &App, args: GoalUpdate) -> Result<(), AppError> {
    let is_completed = if args.completed {
        Some(true)
    } else if args.open {
        Some(false)
    } else {
        None
    };
    let goal = app
        .update_goal(
            args.goal_id,
            GoalChanges {
                title: args.title,
                description: args.description,
                due_date: args.due,
                is_completed,
            },
        )
        .await?;
    println!("Updated goal ID: {}.", goal.id);
    Ok(())
}

async fn handle_goal_remove(app: &App, args: GoalRemove) -> Result<(), AppError> {
    app.delete_goal(args.goal_id).await?;
    println!("Goal ID: {} removed.", args.goal_id);
    Ok(())
}

async fn handle_feed(app: &App, args: Feed) -> Result<(), AppError> {
    let limit = args.limit.unwrap_or(DEFAULT_FEED_LIMIT);
    let feed = app.announcements(args.user_id, limit).await?;
    if feed.is_empty() {
        println!("No announcements.");
        return Ok(());
    }
    for entry in &feed {
        println!("{}", format_announcement(entry));
    }
    Ok(())
}

async fn handle_reaction(app: &App, command: ReactionCommand) -> Result<(), AppError> {
    match command {
        ReactionCommand::Add(args) => handle_reaction_add(app, args).await,
        ReactionCommand::List(args) => handle_reaction_list(app, args).await,
        ReactionCommand::Remove(args) => handle_reaction_remove(app, args).await,
    }
}

async fn handle_reaction_add(app: &App, args: ReactionAdd) -> Result<(), AppError> {
    let payload: serde_json::Value = serde_json::from_str(&args.reaction)?;
    let reaction = app
        .create_reaction(NewReaction {
            user_id: args.user_id,
            goal_id: args.goal_id,
            reaction: payload,
            reaction_library: args.library,
        })
        .await?;
    println!("Created reaction ID: {}.", reaction.id);
    Ok(())
}

async fn handle_reaction_list(app: &App, args: ReactionList) -> Result<(), AppError> {
    let grouped = app.reactions_by_goal(&[args.goal_id]).await?;
    let reactions = grouped.get(&args.goal_id).map(Vec::as_slice).unwrap_or(&[]);
    if reactions.is_empty() {
        println!("No reactions found for goal ID: {}.", args.goal_id);
        return Ok(());
    }
    for reaction in reactions {
        println!("{}", format_reaction_line(reaction));
    }
    Ok(())
}

async fn handle_reaction_remove(app: &App, args: ReactionRemove) -> Result<(), AppError> {
    app.delete_reaction(args.reaction_id).await?;
    println!("Reaction ID: {} removed.", args.reaction_id);
    Ok(())
}

async fn handle_comment(app: &App, command: CommentCommand) -> Result<(), AppError> {
    match command {
        CommentCommand::Add(args) => handle_comment_add(app, args).await,
        CommentCommand::List(args) => handle_comment_list(app, args).await,
        CommentCommand::Counts(args) => handle_comment_counts(app, args).await,
        CommentCommand::Subscribe(args) => handle_comment_subscribe(app, args).await,
        CommentCommand::Unread(args) => handle_comment_unread(app, args).await,
        CommentCommand::MarkRead(args) => handle_comment_mark_read(app, args).await,
    }
}

async fn handle_comment_add(app: &App, args: CommentAdd) -> Result<(), AppError> {
    let comment = app
        .create_comment(NewComment {
            user_id: args.user_id,
            goal_id: args.goal_id,
            comment: args.comment,
        })
        .await?;
    println!("Created comment ID: {}.", comment.id);
    Ok(())
}

async fn handle_comment_list(app: &App, args: CommentList) -> Result<(), AppError> {
    let filter = match (args.goal, args.author) {
        (Some(goal_id), _) => CommentFilter::ByGoal(goal_id),
        (_, Some(author_id)) => CommentFilter::ByAuthor(author_id),
        _ => {
            return Err(AppError::InvalidInput(
                "one of --goal or --author is required".to_string(),
            ))
        }
    };
    let views = app.fetch_comments(filter).await?;
    if views.is_empty() {
        println!("No comments found.");
        return Ok(());
    }
    for view in &views {
        println!("{}", format_comment_line(view));
    }
    Ok(())
}

async fn handle_comment_counts(app: &App, args: CommentCounts) -> Result<(), AppError> {
    let counts = app.comment_counts_by_goal(&args.goal_ids).await?;
    for goal_id in &args.goal_ids {
        let count = counts.get(goal_id).copied().unwrap_or(0);
        println!("Goal {goal_id}: {count} comments");
    }
    Ok(())
}

async fn handle_comment_subscribe(app: &App, args: CommentSubscribe) -> Result<(), AppError> {
    app.subscribe_comments(args.user_id, args.goal_id).await?;
    println!(
        "User {} subscribed to comments on goal {}.",
        args.user_id, args.goal_id
    );
    Ok(())
}

async fn handle_comment_unread(app: &App, args: CommentUnread) -> Result<(), AppError> {
    if args.count {
        let count = app.unread_comment_count(args.user_id).await?;
        println!("Unread comments: {count}");
        return Ok(());
    }
    let views = app.unread_comments(args.user_id).await?;
    if views.is_empty() {
        println!("No unread comments.");
        return Ok(());
    }
    for view in &views {
        println!("{}", format_comment_line(view));
    }
    Ok(())
}

async fn handle_comment_mark_read(app: &App, args: CommentMarkRead) -> Result<(), AppError> {
    let marked = app
        .mark_comments_read(args.user_id, &args.comment_ids)
        .await?;
    println!("Marked {marked} comments read.");
    Ok(())
}
