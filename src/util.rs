use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entities::{reaction, user};
use crate::model::{Announcement, CommentView, GoalView, UserSearchResult};

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_user_detail(user: &user::Model) -> String {
    let mut output = String::new();
    output.push_str(&format!("User ID: {}\n", user.id));
    output.push_str(&format!("Username: {}\n", user.username));
    output.push_str(&format!("Email: {}\n", user.email));
    output.push_str(&format!("Created: {}\n", format_datetime(user.created_at)));
    output.push_str(&format!("Updated: {}", format_datetime(user.updated_at)));
    output
}

pub fn format_user_line(user: &user::Model) -> String {
    format!("- {} <{}> (user id {})", user.username, user.email, user.id)
}

pub fn format_search_result(result: &UserSearchResult) -> String {
    let marker = if result.leader { "following" } else { "-" };
    format!(
        "- [{}] {} <{}> (user id {})",
        marker, result.user.username, result.user.email, result.user.id
    )
}

pub fn format_goal_detail(view: &GoalView) -> String {
    let mut output = String::new();
    output.push_str(&format!("Goal ID: {}\n", view.goal.id));
    output.push_str(&format!(
        "Owner: {} (user id {})\n",
        view.user.username, view.user.id
    ));
    if let Some(parent) = &view.parent {
        output.push_str(&format!(
            "Parent: {} (goal id {})\n",
            parent.description, parent.id
        ));
    }
    if has_text(&view.goal.title) {
        output.push_str(&format!(
            "Title: {}\n",
            view.goal.title.as_deref().unwrap_or("")
        ));
    }
    output.push_str(&format!("Description: {}\n", view.goal.description));
    if let Some(due_date) = view.goal.due_date {
        output.push_str(&format!("Due: {}\n", format_datetime(due_date)));
    }
    output.push_str(&format!("Completed: {}\n", view.goal.is_completed));
    output.push_str(&format!(
        "Created: {}\n",
        format_datetime(view.goal.created_at)
    ));
    output.push_str(&format!(
        "Updated: {}",
        format_datetime(view.goal.updated_at)
    ));
    output
}

pub fn format_goal_line(view: &GoalView) -> String {
    let marker = if view.goal.is_completed { "x" } else { " " };
    let kind = if view.goal.parent_id.is_some() {
        "sub-goal"
    } else {
        "goal"
    };
    format!(
        "- [{}] {} ({} id {}, owner {})",
        marker, view.goal.description, kind, view.goal.id, view.user.username
    )
}

fn reaction_emoji(reaction: &reaction::Model) -> String {
    match &reaction.reaction {
        Value::Object(map) => match map.get("emoji") {
            Some(Value::String(emoji)) => emoji.clone(),
            _ => reaction.reaction.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn format_announcement(entry: &Announcement) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} @ {}\n",
        entry.user.username,
        format_datetime(entry.sort_on)
    ));
    if let Some(parent) = &entry.parent {
        output.push_str(&format!(
            "  Completed a sub-goal of: {}\n",
            parent.description
        ));
    }
    output.push_str(&format!(
        "  {} (goal id {})\n",
        entry.goal.description, entry.goal.id
    ));
    let reactions: Vec<String> = entry.reactions.iter().map(reaction_emoji).collect();
    output.push_str(&format!(
        "  Reactions: {}  Comments: {}",
        if reactions.is_empty() {
            "(none)".to_string()
        } else {
            reactions.join(" ")
        },
        entry.comment_count
    ));
    output
}

pub fn format_comment_line(view: &CommentView) -> String {
    format!(
        "- {} @ {}: {} (comment id {})",
        view.user.username,
        format_datetime(view.comment.created_at),
        view.comment.comment,
        view.comment.id
    )
}

pub fn format_reaction_line(reaction: &reaction::Model) -> String {
    format!(
        "- {} [{}] by user {} @ {} (reaction id {})",
        reaction_emoji(reaction),
        reaction.reaction_library,
        reaction.user_id,
        format_datetime(reaction.created_at),
        reaction.id
    )
}
