use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{comment, comment_sub, follow, goal, reaction, unread_comment, user};
use crate::error::AppError;
use crate::model::{
    Announcement, CommentFilter, CommentView, FollowCounts, GoalChanges, GoalFilter, GoalView,
    NewComment, NewGoal, NewReaction, NewUser, UserLookup, UserSearchResult,
};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 15;
const TEXT_MAX: usize = 280;

pub struct App {
    db: DatabaseConnection,
}

impl App {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    // ---- users ----

    pub async fn create_user(&self, input: NewUser) -> Result<user::Model, AppError> {
        ensure_username(&input.username)?;
        ensure_email(&input.email)?;
        let now = Utc::now();
        let active = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(input.username),
            email: Set(input.email),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(active.insert(&self.db).await?)
    }

    pub async fn get_user(&self, lookup: UserLookup) -> Result<Option<user::Model>, AppError> {
        let filter = match lookup {
            UserLookup::Id(id) => user::Column::Id.eq(id),
            UserLookup::Username(username) => user::Column::Username.eq(username),
            UserLookup::Email(email) => user::Column::Email.eq(email),
        };
        Ok(user::Entity::find().filter(filter).one(&self.db).await?)
    }

    /// Every user except the searcher, flagged with whether the searcher
    /// already follows them.
    pub async fn search_users(&self, viewer_id: Uuid) -> Result<Vec<UserSearchResult>, AppError> {
        let leader_ids: HashSet<Uuid> = self.leader_ids(viewer_id).await?.into_iter().collect();
        let users = user::Entity::find()
            .filter(user::Column::Id.ne(viewer_id))
            .order_by_asc(user::Column::Username)
            .all(&self.db)
            .await?;
        Ok(users
            .into_iter()
            .map(|user| UserSearchResult {
                leader: leader_ids.contains(&user.id),
                user,
            })
            .collect())
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let result = user::Entity::delete_by_id(user_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("user id {user_id}")));
        }
        Ok(())
    }

    // ---- social graph ----

    async fn leader_ids(&self, follower_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let edges = follow::Entity::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .all(&self.db)
            .await?;
        Ok(edges.into_iter().map(|edge| edge.leader_id).collect())
    }

    pub async fn leaders(&self, follower_id: Uuid) -> Result<Vec<user::Model>, AppError> {
        let leader_ids = self.leader_ids(follower_id).await?;
        if leader_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(leader_ids))
            .order_by_asc(user::Column::Username)
            .all(&self.db)
            .await?)
    }

    pub async fn followers(&self, leader_id: Uuid) -> Result<Vec<user::Model>, AppError> {
        let edges = follow::Entity::find()
            .filter(follow::Column::LeaderId.eq(leader_id))
            .all(&self.db)
            .await?;
        let follower_ids: Vec<Uuid> = edges.into_iter().map(|edge| edge.follower_id).collect();
        if follower_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(follower_ids))
            .order_by_asc(user::Column::Username)
            .all(&self.db)
            .await?)
    }

    pub async fn create_follow(
        &self,
        follower_id: Uuid,
        leader_id: Uuid,
    ) -> Result<follow::Model, AppError> {
        self.ensure_user_exists(follower_id).await?;
        self.ensure_user_exists(leader_id).await?;
        let now = Utc::now();
        let active = follow::ActiveModel {
            follower_id: Set(follower_id),
            leader_id: Set(leader_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(active.insert(&self.db).await?)
    }

    pub async fn delete_follow(&self, follower_id: Uuid, leader_id: Uuid) -> Result<(), AppError> {
        let result = follow::Entity::delete_many()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::LeaderId.eq(leader_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "follow {follower_id} -> {leader_id}"
            )));
        }
        Ok(())
    }

    pub async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts, AppError> {
        let followers = follow::Entity::find()
            .filter(follow::Column::LeaderId.eq(user_id))
            .count(&self.db)
            .await?;
        let leaders = follow::Entity::find()
            .filter(follow::Column::FollowerId.eq(user_id))
            .count(&self.db)
            .await?;
        Ok(FollowCounts { followers, leaders })
    }

    // ---- goals ----

    pub async fn create_goal(&self, input: NewGoal) -> Result<goal::Model, AppError> {
        ensure_text("goal description", &input.description)?;
        self.ensure_user_exists(input.user_id).await?;
        if let Some(parent_id) = input.parent_id {
            let parent = goal::Entity::find_by_id(parent_id).one(&self.db).await?;
            if parent.is_none() {
                return Err(AppError::NotFound(format!("goal id {parent_id}")));
            }
        }

        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            let now = Utc::now();
            let active = goal::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(input.user_id),
                parent_id: Set(input.parent_id),
                title: Set(input.title),
                description: Set(input.description),
                due_date: Set(input.due_date),
                is_completed: Set(input.is_completed),
                created_at: Set(now),
                updated_at: Set(now),
            };
            let created = active.insert(&txn).await?;
            // the owner hears about comments on their own goal
            self.subscribe_with_conn(&txn, created.user_id, created.id)
                .await?;
            Ok(created)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Read goals joined with their owner and parent. `announcements_only`
    /// keeps top-level goals and completed sub-goals only.
    pub async fn fetch_goals(
        &self,
        filter: GoalFilter,
        announcements_only: bool,
    ) -> Result<Vec<GoalView>, AppError> {
        let mut select = match filter {
            GoalFilter::OwnedBy(user_id) => {
                goal::Entity::find().filter(goal::Column::UserId.eq(user_id))
            }
            GoalFilter::ByIds(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                goal::Entity::find().filter(goal::Column::Id.is_in(ids))
            }
        };
        if announcements_only {
            select = select.filter(announcement_eligible());
        }
        let goals = select
            .order_by_desc(goal::Column::UpdatedAt)
            .order_by_asc(goal::Column::Id)
            .all(&self.db)
            .await?;
        self.enrich_goals(goals).await
    }

    pub async fn update_goal(
        &self,
        goal_id: Uuid,
        changes: GoalChanges,
    ) -> Result<goal::Model, AppError> {
        if let Some(description) = changes.description.as_deref() {
            ensure_text("goal description", description)?;
        }

        let mut active = goal::ActiveModel {
            id: Set(goal_id),
            ..Default::default()
        };
        if let Some(title) = changes.title {
            active.title = Set(Some(title));
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(due_date) = changes.due_date {
            active.due_date = Set(Some(due_date));
        }
        if let Some(is_completed) = changes.is_completed {
            active.is_completed = Set(is_completed);
        }
        active.updated_at = Set(Utc::now());

        match active.update(&self.db).await {
            Ok(model) => Ok(model),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::NotFound(format!("goal id {goal_id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete_goal(&self, goal_id: Uuid) -> Result<(), AppError> {
        let result = goal::Entity::delete_by_id(goal_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("goal id {goal_id}")));
        }
        Ok(())
    }

    // ---- announcement feed ----

    /// The aggregated feed for a user: their own announcement-eligible goals
    /// plus those of everyone they follow, most recently touched first.
    pub async fn announcements(
        &self,
        viewer_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Announcement>, AppError> {
        // set union of the viewer and their leaders; a redundant or
        // self-referential follow edge must not duplicate goals
        let mut owner_ids = self.leader_ids(viewer_id).await?;
        if !owner_ids.contains(&viewer_id) {
            owner_ids.push(viewer_id);
        }

        let goals = goal::Entity::find()
            .filter(goal::Column::UserId.is_in(owner_ids))
            .filter(announcement_eligible())
            .order_by_desc(goal::Column::UpdatedAt)
            .order_by_asc(goal::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        // rollups are fetched for the surviving goals only, one query each
        let goal_ids: Vec<Uuid> = goals.iter().map(|goal| goal.id).collect();
        let mut reactions = self.reactions_by_goal(&goal_ids).await?;
        let mut comment_counts = self.comment_counts_by_goal(&goal_ids).await?;

        let views = self.enrich_goals(goals).await?;
        Ok(views
            .into_iter()
            .map(|view| {
                let GoalView { goal, user, parent } = view;
                Announcement {
                    reactions: reactions.remove(&goal.id).unwrap_or_default(),
                    comment_count: comment_counts.remove(&goal.id).unwrap_or(0),
                    sort_on: goal.updated_at,
                    goal,
                    user,
                    parent,
                }
            })
            .collect())
    }

    // ---- reactions ----

    pub async fn create_reaction(&self, input: NewReaction) -> Result<reaction::Model, AppError> {
        self.ensure_user_exists(input.user_id).await?;
        self.ensure_goal_exists(input.goal_id).await?;
        let now = Utc::now();
        let active = reaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(input.user_id),
            goal_id: Set(input.goal_id),
            reaction: Set(input.reaction),
            reaction_library: Set(input.reaction_library),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(active.insert(&self.db).await?)
    }

    pub async fn delete_reaction(&self, reaction_id: Uuid) -> Result<(), AppError> {
        let result = reaction::Entity::delete_by_id(reaction_id)
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("reaction id {reaction_id}")));
        }
        Ok(())
    }

    pub async fn reactions_by_goal(
        &self,
        goal_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<reaction::Model>>, AppError> {
        let mut grouped = HashMap::new();
        if goal_ids.is_empty() {
            return Ok(grouped);
        }
        let rows = reaction::Entity::find()
            .filter(reaction::Column::GoalId.is_in(goal_ids.to_vec()))
            .order_by_asc(reaction::Column::CreatedAt)
            .order_by_asc(reaction::Column::Id)
            .all(&self.db)
            .await?;
        for row in rows {
            grouped
                .entry(row.goal_id)
                .or_insert_with(Vec::new)
                .push(row);
        }
        Ok(grouped)
    }

    // ---- comments ----

    pub async fn create_comment(&self, input: NewComment) -> Result<comment::Model, AppError> {
        ensure_text("comment", &input.comment)?;
        self.ensure_user_exists(input.user_id).await?;
        self.ensure_goal_exists(input.goal_id).await?;

        let txn = self.db.begin().await?;
        let result: Result<comment::Model, AppError> = async {
            let now = Utc::now();
            let active = comment::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(input.user_id),
                goal_id: Set(input.goal_id),
                comment: Set(input.comment),
                created_at: Set(now),
                updated_at: Set(now),
            };
            let created = active.insert(&txn).await?;

            // fan an unread marker out to every subscriber except the author
            let subs = comment_sub::Entity::find()
                .filter(comment_sub::Column::GoalId.eq(created.goal_id))
                .all(&txn)
                .await?;
            for sub in subs {
                if sub.user_id == created.user_id {
                    continue;
                }
                let unread = unread_comment::ActiveModel {
                    user_id: Set(sub.user_id),
                    comment_id: Set(created.id),
                    goal_id: Set(created.goal_id),
                    read: Set(false),
                };
                unread.insert(&txn).await?;
            }
            // subscribe after the fan-out so the author is never notified
            // of their own comment
            self.subscribe_with_conn(&txn, created.user_id, created.goal_id)
                .await?;
            Ok(created)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn fetch_comments(
        &self,
        filter: CommentFilter,
    ) -> Result<Vec<CommentView>, AppError> {
        let filter = match filter {
            CommentFilter::ByAuthor(user_id) => comment::Column::UserId.eq(user_id),
            CommentFilter::ByGoal(goal_id) => comment::Column::GoalId.eq(goal_id),
        };
        let comments = comment::Entity::find()
            .filter(filter)
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await?;
        self.enrich_comments(comments).await
    }

    pub async fn comment_counts_by_goal(
        &self,
        goal_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>, AppError> {
        if goal_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, i64)> = comment::Entity::find()
            .select_only()
            .column(comment::Column::GoalId)
            .column_as(comment::Column::Id.count(), "count")
            .filter(comment::Column::GoalId.is_in(goal_ids.to_vec()))
            .group_by(comment::Column::GoalId)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn subscribe_comments(&self, user_id: Uuid, goal_id: Uuid) -> Result<(), AppError> {
        self.ensure_user_exists(user_id).await?;
        self.ensure_goal_exists(goal_id).await?;
        self.subscribe_with_conn(&self.db, user_id, goal_id).await
    }

    async fn subscribe_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
        goal_id: Uuid,
    ) -> Result<(), AppError> {
        let existing = comment_sub::Entity::find_by_id((user_id, goal_id))
            .one(db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        let active = comment_sub::ActiveModel {
            user_id: Set(user_id),
            goal_id: Set(goal_id),
            created_at: Set(Utc::now()),
        };
        active.insert(db).await?;
        Ok(())
    }

    pub async fn unread_comment_count(&self, user_id: Uuid) -> Result<u64, AppError> {
        Ok(unread_comment::Entity::find()
            .filter(unread_comment::Column::UserId.eq(user_id))
            .filter(unread_comment::Column::Read.eq(false))
            .count(&self.db)
            .await?)
    }

    pub async fn unread_comments(&self, user_id: Uuid) -> Result<Vec<CommentView>, AppError> {
        let unread = unread_comment::Entity::find()
            .filter(unread_comment::Column::UserId.eq(user_id))
            .filter(unread_comment::Column::Read.eq(false))
            .all(&self.db)
            .await?;
        let comment_ids: Vec<Uuid> = unread.into_iter().map(|row| row.comment_id).collect();
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let comments = comment::Entity::find()
            .filter(comment::Column::Id.is_in(comment_ids))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await?;
        self.enrich_comments(comments).await
    }

    pub async fn mark_comments_read(
        &self,
        user_id: Uuid,
        comment_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        if comment_ids.is_empty() {
            return Ok(0);
        }
        let result = unread_comment::Entity::update_many()
            .col_expr(unread_comment::Column::Read, Expr::value(true))
            .filter(unread_comment::Column::UserId.eq(user_id))
            .filter(unread_comment::Column::CommentId.is_in(comment_ids.to_vec()))
            .filter(unread_comment::Column::Read.eq(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    // ---- shared helpers ----

    async fn ensure_user_exists(&self, user_id: Uuid) -> Result<(), AppError> {
        let existing = user::Entity::find_by_id(user_id).one(&self.db).await?;
        if existing.is_none() {
            return Err(AppError::NotFound(format!("user id {user_id}")));
        }
        Ok(())
    }

    async fn ensure_goal_exists(&self, goal_id: Uuid) -> Result<(), AppError> {
        let existing = goal::Entity::find_by_id(goal_id).one(&self.db).await?;
        if existing.is_none() {
            return Err(AppError::NotFound(format!("goal id {goal_id}")));
        }
        Ok(())
    }

    async fn enrich_goals(&self, goals: Vec<goal::Model>) -> Result<Vec<GoalView>, AppError> {
        if goals.is_empty() {
            return Ok(Vec::new());
        }
        let owner_ids: HashSet<Uuid> = goals.iter().map(|goal| goal.user_id).collect();
        let users = user::Entity::find()
            .filter(user::Column::Id.is_in(owner_ids))
            .all(&self.db)
            .await?;
        let users: HashMap<Uuid, user::Model> =
            users.into_iter().map(|user| (user.id, user)).collect();

        let parent_ids: HashSet<Uuid> = goals.iter().filter_map(|goal| goal.parent_id).collect();
        let parents: HashMap<Uuid, goal::Model> = if parent_ids.is_empty() {
            HashMap::new()
        } else {
            goal::Entity::find()
                .filter(goal::Column::Id.is_in(parent_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|parent| (parent.id, parent))
                .collect()
        };

        let mut views = Vec::with_capacity(goals.len());
        for goal in goals {
            let user = users
                .get(&goal.user_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("user id {}", goal.user_id)))?;
            let parent = goal.parent_id.and_then(|id| parents.get(&id).cloned());
            views.push(GoalView { goal, user, parent });
        }
        Ok(views)
    }

    async fn enrich_comments(
        &self,
        comments: Vec<comment::Model>,
    ) -> Result<Vec<CommentView>, AppError> {
        if comments.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids: HashSet<Uuid> = comments.iter().map(|comment| comment.user_id).collect();
        let users: HashMap<Uuid, user::Model> = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let mut views = Vec::with_capacity(comments.len());
        for comment in comments {
            let user = users
                .get(&comment.user_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("user id {}", comment.user_id)))?;
            views.push(CommentView { comment, user });
        }
        Ok(views)
    }
}

/// Top-level goals always qualify; sub-goals only once completed.
fn announcement_eligible() -> Condition {
    Condition::any()
        .add(goal::Column::ParentId.is_null())
        .add(goal::Column::IsCompleted.eq(true))
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_text(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    if value.chars().count() > TEXT_MAX {
        return Err(AppError::InvalidInput(format!(
            "{label} cannot exceed {TEXT_MAX} characters"
        )));
    }
    Ok(())
}

fn ensure_username(value: &str) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < USERNAME_MIN || len > USERNAME_MAX {
        return Err(AppError::InvalidInput(format!(
            "username must be {USERNAME_MIN} to {USERNAME_MAX} characters"
        )));
    }
    Ok(())
}

fn ensure_email(value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() || !value.contains('@') {
        return Err(AppError::InvalidInput(format!(
            "invalid email address: {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_app() -> (TempDir, App) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        (dir, App::new(db))
    }

    async fn create_user(app: &App, username: &str) -> user::Model {
        app.create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
        })
        .await
        .expect("create user")
    }

    async fn create_goal(app: &App, user_id: Uuid, description: &str) -> goal::Model {
        app.create_goal(NewGoal {
            user_id,
            parent_id: None,
            title: Some("title".to_string()),
            description: description.to_string(),
            due_date: None,
            is_completed: false,
        })
        .await
        .expect("create goal")
    }

    async fn create_subgoal(
        app: &App,
        user_id: Uuid,
        parent_id: Uuid,
        is_completed: bool,
    ) -> goal::Model {
        app.create_goal(NewGoal {
            user_id,
            parent_id: Some(parent_id),
            title: None,
            description: "subgoal".to_string(),
            due_date: None,
            is_completed,
        })
        .await
        .expect("create subgoal")
    }

    async fn react(app: &App, user_id: Uuid, goal_id: Uuid) -> reaction::Model {
        app.create_reaction(NewReaction {
            user_id,
            goal_id,
            reaction: json!({"emoji": "🎉", "slug": "party_popper"}),
            reaction_library: "rn-emoji-keyboard:^1.7.0".to_string(),
        })
        .await
        .expect("create reaction")
    }

    async fn comment_on(app: &App, user_id: Uuid, goal_id: Uuid, text: &str) -> comment::Model {
        app.create_comment(NewComment {
            user_id,
            goal_id,
            comment: text.to_string(),
        })
        .await
        .expect("create comment")
    }

    #[tokio::test]
    async fn create_get_delete_user() {
        let (_dir, app) = setup_app().await;
        let created = create_user(&app, "user1").await;

        let by_id = app
            .get_user(UserLookup::Id(created.id))
            .await
            .expect("get by id");
        assert_eq!(by_id, Some(created.clone()));
        let by_username = app
            .get_user(UserLookup::Username("user1".to_string()))
            .await
            .expect("get by username");
        assert_eq!(by_username, Some(created.clone()));
        let by_email = app
            .get_user(UserLookup::Email("user1@example.com".to_string()))
            .await
            .expect("get by email");
        assert_eq!(by_email, Some(created.clone()));

        app.delete_user(created.id).await.expect("delete user");
        let gone = app
            .get_user(UserLookup::Id(created.id))
            .await
            .expect("get after delete");
        assert_eq!(gone, None);
    }

    #[tokio::test]
    async fn missing_user_is_none_not_error() {
        let (_dir, app) = setup_app().await;
        let found = app
            .get_user(UserLookup::Id(Uuid::new_v4()))
            .await
            .expect("get missing user");
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_by_store() {
        let (_dir, app) = setup_app().await;
        create_user(&app, "user1").await;
        let err = app
            .create_user(NewUser {
                username: "user1".to_string(),
                email: "other@example.com".to_string(),
            })
            .await
            .unwrap_err();
        match err {
            AppError::Db(_) => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_user_validates_username_and_email() {
        let (_dir, app) = setup_app().await;
        let err = app
            .create_user(NewUser {
                username: "ab".to_string(),
                email: "ab@example.com".to_string(),
            })
            .await
            .unwrap_err();
        match err {
            AppError::InvalidInput(message) => assert!(message.contains("username")),
            other => panic!("unexpected error: {other}"),
        }

        let err = app
            .create_user(NewUser {
                username: "user1".to_string(),
                email: "not-an-email".to_string(),
            })
            .await
            .unwrap_err();
        match err {
            AppError::InvalidInput(message) => assert!(message.contains("email")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn followers_and_leaders() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        let u2 = create_user(&app, "user2").await;
        app.create_follow(u1.id, u0.id).await.expect("follow");
        app.create_follow(u2.id, u0.id).await.expect("follow");

        let leaders = app.leaders(u1.id).await.expect("leaders");
        assert_eq!(leaders, vec![u0.clone()]);
        assert!(app.leaders(u0.id).await.expect("leaders").is_empty());
        let followers = app.followers(u0.id).await.expect("followers");
        assert_eq!(followers, vec![u1.clone(), u2.clone()]);
    }

    #[tokio::test]
    async fn follow_counts_symmetry() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        app.create_follow(u1.id, u0.id).await.expect("follow");

        let counts = app.follow_counts(u0.id).await.expect("counts");
        assert_eq!(counts.followers, 1);
        assert_eq!(counts.leaders, 0);
        let counts = app.follow_counts(u1.id).await.expect("counts");
        assert_eq!(counts.followers, 0);
        assert_eq!(counts.leaders, 1);
    }

    #[tokio::test]
    async fn delete_follow_removes_edge() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        app.create_follow(u1.id, u0.id).await.expect("follow");
        app.delete_follow(u1.id, u0.id).await.expect("unfollow");
        assert!(app.followers(u0.id).await.expect("followers").is_empty());

        let err = app.delete_follow(u1.id, u0.id).await.unwrap_err();
        match err {
            AppError::NotFound(_) => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn search_users_flags_leaders_and_excludes_self() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        let u2 = create_user(&app, "user2").await;
        app.create_follow(u0.id, u1.id).await.expect("follow");

        let results = app.search_users(u0.id).await.expect("search");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|entry| entry.user.id != u0.id));
        let flagged: Vec<(Uuid, bool)> = results
            .iter()
            .map(|entry| (entry.user.id, entry.leader))
            .collect();
        assert!(flagged.contains(&(u1.id, true)));
        assert!(flagged.contains(&(u2.id, false)));
    }

    #[tokio::test]
    async fn subgoal_requires_existing_parent() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let err = app
            .create_goal(NewGoal {
                user_id: u0.id,
                parent_id: Some(Uuid::new_v4()),
                title: None,
                description: "orphan".to_string(),
                due_date: None,
                is_completed: false,
            })
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => assert!(message.contains("goal id")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_goals_enriches_owner_and_parent() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let top = create_goal(&app, u0.id, "top").await;
        let sub = create_subgoal(&app, u0.id, top.id, true).await;

        let views = app
            .fetch_goals(GoalFilter::OwnedBy(u0.id), false)
            .await
            .expect("fetch goals");
        assert_eq!(views.len(), 2);
        for view in &views {
            assert_eq!(view.user, u0);
        }
        let sub_view = views
            .iter()
            .find(|view| view.goal.id == sub.id)
            .expect("sub view");
        assert_eq!(sub_view.parent.as_ref(), Some(&top));
        let top_view = views
            .iter()
            .find(|view| view.goal.id == top.id)
            .expect("top view");
        assert!(top_view.parent.is_none());
    }

    #[tokio::test]
    async fn fetch_goals_by_ids() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let g1 = create_goal(&app, u0.id, "one").await;
        let _g2 = create_goal(&app, u0.id, "two").await;

        let views = app
            .fetch_goals(GoalFilter::ByIds(vec![g1.id]), false)
            .await
            .expect("fetch by ids");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].goal.id, g1.id);

        let empty = app
            .fetch_goals(GoalFilter::ByIds(Vec::new()), false)
            .await
            .expect("fetch empty ids");
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn eligibility_excludes_incomplete_subgoals() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let top = create_goal(&app, u0.id, "top").await;
        let sub = create_subgoal(&app, u0.id, top.id, false).await;

        let eligible = app
            .fetch_goals(GoalFilter::OwnedBy(u0.id), true)
            .await
            .expect("eligible");
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].goal.id, top.id);

        app.update_goal(
            sub.id,
            GoalChanges {
                is_completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("complete subgoal");

        let eligible = app
            .fetch_goals(GoalFilter::OwnedBy(u0.id), true)
            .await
            .expect("eligible after completion");
        assert_eq!(eligible.len(), 2);
    }

    #[tokio::test]
    async fn update_goal_applies_partial_patch() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let created = create_goal(&app, u0.id, "before").await;

        let updated = app
            .update_goal(
                created.id,
                GoalChanges {
                    is_completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("update goal");
        assert!(updated.is_completed);
        assert_eq!(updated.description, "before");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        let err = app
            .update_goal(Uuid::new_v4(), GoalChanges::default())
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(_) => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn announcements_include_self_without_leaders() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let goal = create_goal(&app, u0.id, "mine").await;

        let feed = app.announcements(u0.id, 20).await.expect("feed");
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].goal.id, goal.id);
        assert_eq!(feed[0].user, u0);
        assert_eq!(feed[0].sort_on, goal.updated_at);
    }

    #[tokio::test]
    async fn announcements_union_not_concatenation() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        let goal = create_goal(&app, u0.id, "mine").await;
        create_goal(&app, u1.id, "leader goal").await;
        app.create_follow(u0.id, u1.id).await.expect("follow");
        // a self-follow edge must not duplicate the viewer's own goals
        app.create_follow(u0.id, u0.id).await.expect("self follow");

        let feed = app.announcements(u0.id, 20).await.expect("feed");
        let own: Vec<_> = feed
            .iter()
            .filter(|entry| entry.goal.id == goal.id)
            .collect();
        assert_eq!(own.len(), 1);
        assert_eq!(feed.len(), 2);
    }

    #[tokio::test]
    async fn announcements_three_user_scenario() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        let u2 = create_user(&app, "user2").await;
        for user in [&u0, &u1, &u2] {
            let top = create_goal(&app, user.id, "top").await;
            create_subgoal(&app, user.id, top.id, true).await;
        }
        app.create_follow(u0.id, u1.id).await.expect("follow");
        app.create_follow(u0.id, u2.id).await.expect("follow");

        let feed = app.announcements(u0.id, 20).await.expect("feed for u0");
        assert_eq!(feed.len(), 6);
        let owners: HashSet<Uuid> = feed.iter().map(|entry| entry.user.id).collect();
        assert_eq!(owners, HashSet::from([u0.id, u1.id, u2.id]));

        let feed = app.announcements(u1.id, 20).await.expect("feed for u1");
        assert_eq!(feed.len(), 2);
        assert!(feed.iter().all(|entry| entry.user.id == u1.id));
    }

    #[tokio::test]
    async fn announcements_order_most_recent_first() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let older = create_goal(&app, u0.id, "older").await;
        let newer = create_goal(&app, u0.id, "newer").await;

        let feed = app.announcements(u0.id, 20).await.expect("feed");
        assert_eq!(feed[0].goal.id, newer.id);
        assert_eq!(feed[1].goal.id, older.id);

        // touching the older goal moves it to the front
        app.update_goal(
            older.id,
            GoalChanges {
                description: Some("touched".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("touch goal");
        let feed = app.announcements(u0.id, 20).await.expect("feed");
        assert_eq!(feed[0].goal.id, older.id);
        assert!(feed[0].sort_on > feed[1].sort_on);
    }

    #[tokio::test]
    async fn announcements_tie_break_on_goal_id() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let now = Utc::now();
        let mut ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();
        // insert in reverse so insertion order cannot mask the ordering
        for id in ids.iter().rev() {
            let active = goal::ActiveModel {
                id: Set(*id),
                user_id: Set(u0.id),
                parent_id: Set(None),
                title: Set(None),
                description: Set("tied".to_string()),
                due_date: Set(None),
                is_completed: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            };
            active.insert(&app.db).await.expect("insert goal");
        }

        let feed = app.announcements(u0.id, 20).await.expect("feed");
        let feed_ids: Vec<Uuid> = feed.iter().map(|entry| entry.goal.id).collect();
        assert_eq!(feed_ids, ids.to_vec());
    }

    #[tokio::test]
    async fn announcements_respect_limit() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        for i in 0..5 {
            create_goal(&app, u0.id, &format!("goal {i}")).await;
        }
        let feed = app.announcements(u0.id, 3).await.expect("feed");
        assert_eq!(feed.len(), 3);
    }

    #[tokio::test]
    async fn announcements_attach_rollups() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        let goal = create_goal(&app, u0.id, "reacted").await;
        let quiet = create_goal(&app, u0.id, "quiet").await;
        react(&app, u1.id, goal.id).await;
        comment_on(&app, u1.id, goal.id, "first").await;
        comment_on(&app, u1.id, goal.id, "second").await;

        let feed = app.announcements(u0.id, 20).await.expect("feed");
        let loud = feed
            .iter()
            .find(|entry| entry.goal.id == goal.id)
            .expect("loud entry");
        assert_eq!(loud.reactions.len(), 1);
        assert_eq!(loud.comment_count, 2);
        let silent = feed
            .iter()
            .find(|entry| entry.goal.id == quiet.id)
            .expect("quiet entry");
        assert!(silent.reactions.is_empty());
        assert_eq!(silent.comment_count, 0);
    }

    #[tokio::test]
    async fn announcements_for_unknown_viewer_are_empty() {
        let (_dir, app) = setup_app().await;
        let feed = app
            .announcements(Uuid::new_v4(), 20)
            .await
            .expect("feed for unknown viewer");
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn rollup_helpers_batch_by_goal() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let g1 = create_goal(&app, u0.id, "one").await;
        let g2 = create_goal(&app, u0.id, "two").await;
        react(&app, u0.id, g1.id).await;
        react(&app, u0.id, g1.id).await;
        comment_on(&app, u0.id, g2.id, "note").await;

        let reactions = app
            .reactions_by_goal(&[g1.id, g2.id])
            .await
            .expect("reactions");
        assert_eq!(reactions.get(&g1.id).map(Vec::len), Some(2));
        assert!(reactions.get(&g2.id).is_none());

        let counts = app
            .comment_counts_by_goal(&[g1.id, g2.id])
            .await
            .expect("counts");
        assert!(counts.get(&g1.id).is_none());
        assert_eq!(counts.get(&g2.id), Some(&1));

        assert!(app.reactions_by_goal(&[]).await.expect("empty").is_empty());
        assert!(app
            .comment_counts_by_goal(&[])
            .await
            .expect("empty")
            .is_empty());
    }

    #[tokio::test]
    async fn comment_fanout_excludes_author() {
        let (_dir, app) = setup_app().await;
        let owner = create_user(&app, "owner").await;
        let alice = create_user(&app, "alice").await;
        let bob = create_user(&app, "bob").await;
        let goal = create_goal(&app, owner.id, "discussed").await;

        // the goal owner is auto-subscribed; alice subscribes by commenting
        comment_on(&app, alice.id, goal.id, "hi").await;
        assert_eq!(app.unread_comment_count(owner.id).await.expect("count"), 1);
        assert_eq!(app.unread_comment_count(alice.id).await.expect("count"), 0);

        comment_on(&app, bob.id, goal.id, "hello").await;
        assert_eq!(app.unread_comment_count(owner.id).await.expect("count"), 2);
        assert_eq!(app.unread_comment_count(alice.id).await.expect("count"), 1);
        assert_eq!(app.unread_comment_count(bob.id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn comment_subscription_is_idempotent() {
        let (_dir, app) = setup_app().await;
        let owner = create_user(&app, "owner").await;
        let goal = create_goal(&app, owner.id, "mine").await;

        // already subscribed via goal creation; both paths must tolerate it
        app.subscribe_comments(owner.id, goal.id)
            .await
            .expect("subscribe again");
        comment_on(&app, owner.id, goal.id, "first").await;
        comment_on(&app, owner.id, goal.id, "second").await;

        let subs = comment_sub::Entity::find()
            .filter(comment_sub::Column::GoalId.eq(goal.id))
            .count(&app.db)
            .await
            .expect("count subs");
        assert_eq!(subs, 1);
        // authors never see their own comments as unread
        assert_eq!(app.unread_comment_count(owner.id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn mark_comments_read_clears_unread() {
        let (_dir, app) = setup_app().await;
        let owner = create_user(&app, "owner").await;
        let alice = create_user(&app, "alice").await;
        let goal = create_goal(&app, owner.id, "discussed").await;
        let c1 = comment_on(&app, alice.id, goal.id, "one").await;
        let c2 = comment_on(&app, alice.id, goal.id, "two").await;

        let unread = app.unread_comments(owner.id).await.expect("unread");
        assert_eq!(unread.len(), 2);
        assert!(unread.iter().all(|view| view.user == alice));

        let marked = app
            .mark_comments_read(owner.id, &[c1.id, c2.id])
            .await
            .expect("mark read");
        assert_eq!(marked, 2);
        // rows already read do not count as state changes
        let marked_again = app
            .mark_comments_read(owner.id, &[c1.id, c2.id])
            .await
            .expect("mark read again");
        assert_eq!(marked_again, 0);
        assert_eq!(app.unread_comment_count(owner.id).await.expect("count"), 0);
        assert!(app
            .unread_comments(owner.id)
            .await
            .expect("unread after read")
            .is_empty());
    }

    #[tokio::test]
    async fn fetch_comments_by_author_or_goal() {
        let (_dir, app) = setup_app().await;
        let owner = create_user(&app, "owner").await;
        let alice = create_user(&app, "alice").await;
        let g1 = create_goal(&app, owner.id, "one").await;
        let g2 = create_goal(&app, owner.id, "two").await;
        comment_on(&app, alice.id, g1.id, "on one").await;
        comment_on(&app, alice.id, g2.id, "on two").await;
        comment_on(&app, owner.id, g1.id, "reply").await;

        let by_goal = app
            .fetch_comments(CommentFilter::ByGoal(g1.id))
            .await
            .expect("by goal");
        assert_eq!(by_goal.len(), 2);
        assert!(by_goal.iter().all(|view| view.comment.goal_id == g1.id));

        let by_author = app
            .fetch_comments(CommentFilter::ByAuthor(alice.id))
            .await
            .expect("by author");
        assert_eq!(by_author.len(), 2);
        assert!(by_author.iter().all(|view| view.user == alice));
    }

    #[tokio::test]
    async fn delete_goal_cascades_to_dependents() {
        let (_dir, app) = setup_app().await;
        let owner = create_user(&app, "owner").await;
        let alice = create_user(&app, "alice").await;
        let top = create_goal(&app, owner.id, "top").await;
        let sub = create_subgoal(&app, owner.id, top.id, true).await;
        react(&app, alice.id, top.id).await;
        comment_on(&app, alice.id, top.id, "hi").await;
        comment_on(&app, alice.id, sub.id, "there").await;

        app.delete_goal(top.id).await.expect("delete goal");

        assert_eq!(goal::Entity::find().count(&app.db).await.expect("goals"), 0);
        assert_eq!(
            reaction::Entity::find()
                .count(&app.db)
                .await
                .expect("reactions"),
            0
        );
        assert_eq!(
            comment::Entity::find()
                .count(&app.db)
                .await
                .expect("comments"),
            0
        );
        assert_eq!(
            comment_sub::Entity::find()
                .count(&app.db)
                .await
                .expect("subs"),
            0
        );
        assert_eq!(
            unread_comment::Entity::find()
                .count(&app.db)
                .await
                .expect("unreads"),
            0
        );
    }

    #[tokio::test]
    async fn delete_user_cascades_to_goals_and_follows() {
        let (_dir, app) = setup_app().await;
        let u0 = create_user(&app, "user0").await;
        let u1 = create_user(&app, "user1").await;
        app.create_follow(u1.id, u0.id).await.expect("follow");
        let top = create_goal(&app, u0.id, "top").await;
        create_subgoal(&app, u0.id, top.id, false).await;

        app.delete_user(u0.id).await.expect("delete user");

        assert_eq!(goal::Entity::find().count(&app.db).await.expect("goals"), 0);
        assert_eq!(
            follow::Entity::find()
                .count(&app.db)
                .await
                .expect("follows"),
            0
        );
        let counts = app.follow_counts(u1.id).await.expect("counts");
        assert_eq!(counts.leaders, 0);
    }
}
