use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{comment, comment_sub, follow, goal, reaction, unread_comment, user};
use crate::error::AppError;

pub fn resolve_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("cairn.db")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_stmt = schema.create_table_from_entity(user::Entity);
    user_stmt.if_not_exists();
    db.execute(builder.build(&user_stmt)).await?;

    let mut follow_stmt = schema.create_table_from_entity(follow::Entity);
    follow_stmt.if_not_exists();
    db.execute(builder.build(&follow_stmt)).await?;

    let mut goal_stmt = schema.create_table_from_entity(goal::Entity);
    goal_stmt.if_not_exists();
    db.execute(builder.build(&goal_stmt)).await?;

    let mut reaction_stmt = schema.create_table_from_entity(reaction::Entity);
    reaction_stmt.if_not_exists();
    db.execute(builder.build(&reaction_stmt)).await?;

    let mut comment_stmt = schema.create_table_from_entity(comment::Entity);
    comment_stmt.if_not_exists();
    db.execute(builder.build(&comment_stmt)).await?;

    let mut sub_stmt = schema.create_table_from_entity(comment_sub::Entity);
    sub_stmt.if_not_exists();
    db.execute(builder.build(&sub_stmt)).await?;

    let mut unread_stmt = schema.create_table_from_entity(unread_comment::Entity);
    unread_stmt.if_not_exists();
    db.execute(builder.build(&unread_stmt)).await?;

    let builder = db.get_database_backend();

    let mut username_index = Index::create()
        .name("idx_users_username")
        .table(user::Entity)
        .col(user::Column::Username)
        .unique()
        .to_owned();
    username_index.if_not_exists();
    db.execute(builder.build(&username_index)).await?;

    let mut email_index = Index::create()
        .name("idx_users_email")
        .table(user::Entity)
        .col(user::Column::Email)
        .unique()
        .to_owned();
    email_index.if_not_exists();
    db.execute(builder.build(&email_index)).await?;

    let mut goal_owner_index = Index::create()
        .name("idx_goals_owner")
        .table(goal::Entity)
        .col(goal::Column::UserId)
        .to_owned();
    goal_owner_index.if_not_exists();
    db.execute(builder.build(&goal_owner_index)).await?;

    let mut goal_parent_index = Index::create()
        .name("idx_goals_parent")
        .table(goal::Entity)
        .col(goal::Column::ParentId)
        .to_owned();
    goal_parent_index.if_not_exists();
    db.execute(builder.build(&goal_parent_index)).await?;

    let mut reaction_goal_index = Index::create()
        .name("idx_reactions_goal")
        .table(reaction::Entity)
        .col(reaction::Column::GoalId)
        .to_owned();
    reaction_goal_index.if_not_exists();
    db.execute(builder.build(&reaction_goal_index)).await?;

    let mut comment_goal_index = Index::create()
        .name("idx_comments_goal")
        .table(comment::Entity)
        .col(comment::Column::GoalId)
        .to_owned();
    comment_goal_index.if_not_exists();
    db.execute(builder.build(&comment_goal_index)).await?;

    let mut unread_user_index = Index::create()
        .name("idx_unread_comments_user")
        .table(unread_comment::Entity)
        .col(unread_comment::Column::UserId)
        .col(unread_comment::Column::Read)
        .to_owned();
    unread_user_index.if_not_exists();
    db.execute(builder.build(&unread_user_index)).await?;

    Ok(())
}
