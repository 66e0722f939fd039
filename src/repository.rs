use crate::error::{AppError, AppResult};
use crate::models::{NewPost, Post, Role, User, UserRole};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository Trait
///
/// The persistence contract for the three stores (users, roles, posts).
/// Services only ever see `Arc<dyn Repository>`, so the PostgreSQL
/// implementation and the in-memory one are interchangeable.
///
/// Every method is a single atomic unit against the store. Methods that touch
/// more than one table (`create_user`) run inside one transaction.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Roles ---
    async fn find_role(&self, name: UserRole) -> AppResult<Option<Role>>;
    /// Inserts any missing role of the fixed vocabulary. Idempotent.
    async fn seed_roles(&self) -> AppResult<()>;

    // --- Users ---
    async fn find_user_by_id(&self, id: i64) -> AppResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn username_exists(&self, username: &str) -> AppResult<bool>;
    /// Inserts the user together with its initial role membership.
    /// A username collision surfaces as `AppError::UserAlreadyExists`.
    async fn create_user(&self, username: &str, password_hash: &str, role: &Role)
    -> AppResult<User>;
    /// No-op when the membership already exists.
    async fn grant_role(&self, user_id: i64, role: &Role) -> AppResult<()>;
    /// No-op when the membership does not exist.
    async fn revoke_role(&self, user_id: i64, role: &Role) -> AppResult<()>;
    /// Deletes the user, its memberships and its posts. Returns false if absent.
    async fn delete_user(&self, id: i64) -> AppResult<bool>;

    // --- Posts ---
    async fn find_post(&self, id: i64) -> AppResult<Option<Post>>;
    async fn find_all_posts(&self) -> AppResult<Vec<Post>>;
    async fn find_posts_by_author(&self, author_id: i64) -> AppResult<Vec<Post>>;
    async fn create_post(&self, post: NewPost) -> AppResult<Post>;
    /// Overwrites title and content and refreshes `updated_at`.
    /// Returns `None` when the post no longer exists.
    async fn update_post(&self, id: i64, title: &str, content: &str) -> AppResult<Option<Post>>;
    async fn delete_post(&self, id: i64) -> AppResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- PostgreSQL ---

/// PostgresRepository
///
/// The production implementation, backed by a `PgPool`. Queries are built at
/// runtime so the crate compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw user row with its role names aggregated into an array.
#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    roles: Vec<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let roles = row
            .roles
            .iter()
            .filter_map(|name| match name.parse::<UserRole>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(user_id = row.id, error = %e, "ignoring unknown role name");
                    None
                }
            })
            .collect();
        User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            roles,
        }
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: i64,
    name: String,
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.password_hash,
           COALESCE(array_agg(r.name ORDER BY r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
"#;

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.author_id, u.username AS author, p.created_at, p.updated_at
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

fn map_username_conflict(e: sqlx::Error, username: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::UserAlreadyExists(username.to_string())
        }
        _ => AppError::Database(e),
    }
}

/// The author row vanished between the service's lookup and the insert.
fn map_missing_author(e: sqlx::Error, author_id: i64) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::NotFound(format!("Cannot find user with id: {}", author_id))
        }
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_role(&self, name: UserRole) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>("SELECT id, name FROM roles WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| {
            r.name
                .parse::<UserRole>()
                .ok()
                .map(|name| Role { id: r.id, name })
        }))
    }

    async fn seed_roles(&self) -> AppResult<()> {
        for role in UserRole::ALL {
            sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(role.as_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn find_user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let query = format!("{USER_SELECT} WHERE u.id = $1 GROUP BY u.id");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let query = format!("{USER_SELECT} WHERE u.username = $1 GROUP BY u.id");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let query = format!("{USER_SELECT} GROUP BY u.id ORDER BY u.id");
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// create_user
    ///
    /// Inserts the user row and its first `user_roles` row in one transaction.
    /// The transaction rolls back when dropped on any early return.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &Role,
    ) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_username_conflict(e, username))?;

        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(id)
            .bind(role.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            roles: BTreeSet::from([role.name]),
        })
    }

    async fn grant_role(&self, user_id: i64, role: &Role) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: i64, role: &Role) -> AppResult<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> AppResult<bool> {
        // user_roles and posts go with it via ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_post(&self, id: i64) -> AppResult<Option<Post>> {
        let query = format!("{POST_SELECT} WHERE p.id = $1");
        let post = sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn find_all_posts(&self) -> AppResult<Vec<Post>> {
        let query = format!("{POST_SELECT} ORDER BY p.created_at DESC, p.id DESC");
        let posts = sqlx::query_as::<_, Post>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    async fn find_posts_by_author(&self, author_id: i64) -> AppResult<Vec<Post>> {
        let query =
            format!("{POST_SELECT} WHERE p.author_id = $1 ORDER BY p.created_at DESC, p.id DESC");
        let posts = sqlx::query_as::<_, Post>(&query)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    /// create_post
    ///
    /// Inserts and joins the author's username in one round trip (CTE).
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let created = sqlx::query_as::<_, Post>(
            r#"
            WITH inserted AS (
                INSERT INTO posts (title, content, author_id, created_at, updated_at)
                VALUES ($1, $2, $3, NOW(), NOW())
                RETURNING id, title, content, author_id, created_at, updated_at
            )
            SELECT i.id, i.title, i.content, i.author_id, u.username AS author, i.created_at, i.updated_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_missing_author(e, post.author_id))?;
        Ok(created)
    }

    async fn update_post(&self, id: i64, title: &str, content: &str) -> AppResult<Option<Post>> {
        let updated = sqlx::query_as::<_, Post>(
            r#"
            WITH updated AS (
                UPDATE posts
                SET title = $2, content = $3, updated_at = NOW()
                WHERE id = $1
                RETURNING id, title, content, author_id, created_at, updated_at
            )
            SELECT p.id, p.title, p.content, p.author_id, u.username AS author, p.created_at, p.updated_at
            FROM updated p JOIN users u ON u.id = p.author_id
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

// --- In-Memory ---

#[derive(Debug, Clone)]
struct StoredUser {
    username: String,
    password_hash: String,
    roles: BTreeSet<UserRole>,
}

#[derive(Debug, Clone)]
struct StoredPost {
    title: String,
    content: String,
    author_id: i64,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    next_role_id: i64,
    next_user_id: i64,
    next_post_id: i64,
    roles: BTreeMap<UserRole, i64>,
    users: BTreeMap<i64, StoredUser>,
    posts: BTreeMap<i64, StoredPost>,
}

impl Store {
    fn user(&self, id: i64, stored: &StoredUser) -> User {
        User {
            id,
            username: stored.username.clone(),
            password_hash: stored.password_hash.clone(),
            roles: stored.roles.clone(),
        }
    }

    fn post(&self, id: i64, stored: &StoredPost) -> Option<Post> {
        let author = self.users.get(&stored.author_id)?;
        Some(Post {
            id,
            title: stored.title.clone(),
            content: stored.content.clone(),
            author_id: stored.author_id,
            author: author.username.clone(),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    fn posts_where(&self, keep: impl Fn(&StoredPost) -> bool) -> Vec<Post> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|(_, p)| keep(p))
            .filter_map(|(id, p)| self.post(*id, p))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory behind one `RwLock`.
/// Used by the test suites and handy for running the API without PostgreSQL.
/// Ids are assigned sequentially from 1, like a fresh `BIGSERIAL`.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    /// A store with the USER and ADMIN roles already seeded.
    pub fn new() -> Self {
        let mut store = Store::default();
        for role in UserRole::ALL {
            store.next_role_id += 1;
            store.roles.insert(role, store.next_role_id);
        }
        Self {
            store: RwLock::new(store),
        }
    }

    /// A store without any seeded roles, mimicking a database that was never migrated.
    pub fn without_roles() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_role(&self, name: UserRole) -> AppResult<Option<Role>> {
        let store = self.store.read().await;
        Ok(store.roles.get(&name).map(|id| Role { id: *id, name }))
    }

    async fn seed_roles(&self) -> AppResult<()> {
        let mut store = self.store.write().await;
        for role in UserRole::ALL {
            if !store.roles.contains_key(&role) {
                store.next_role_id += 1;
                let id = store.next_role_id;
                store.roles.insert(role, id);
            }
        }
        Ok(())
    }

    async fn find_user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.get(&id).map(|u| store.user(id, u)))
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store
            .users
            .iter()
            .find(|(_, u)| u.username == username)
            .map(|(id, u)| store.user(*id, u)))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let store = self.store.read().await;
        Ok(store
            .users
            .iter()
            .map(|(id, u)| store.user(*id, u))
            .collect())
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let store = self.store.read().await;
        Ok(store.users.values().any(|u| u.username == username))
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &Role,
    ) -> AppResult<User> {
        let mut store = self.store.write().await;
        if store.users.values().any(|u| u.username == username) {
            return Err(AppError::UserAlreadyExists(username.to_string()));
        }
        store.next_user_id += 1;
        let id = store.next_user_id;
        let stored = StoredUser {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            roles: BTreeSet::from([role.name]),
        };
        let user = store.user(id, &stored);
        store.users.insert(id, stored);
        Ok(user)
    }

    async fn grant_role(&self, user_id: i64, role: &Role) -> AppResult<()> {
        let mut store = self.store.write().await;
        if let Some(user) = store.users.get_mut(&user_id) {
            user.roles.insert(role.name);
        }
        Ok(())
    }

    async fn revoke_role(&self, user_id: i64, role: &Role) -> AppResult<()> {
        let mut store = self.store.write().await;
        if let Some(user) = store.users.get_mut(&user_id) {
            user.roles.remove(&role.name);
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let mut store = self.store.write().await;
        if store.users.remove(&id).is_none() {
            return Ok(false);
        }
        store.posts.retain(|_, p| p.author_id != id);
        Ok(true)
    }

    async fn find_post(&self, id: i64) -> AppResult<Option<Post>> {
        let store = self.store.read().await;
        Ok(store.posts.get(&id).and_then(|p| store.post(id, p)))
    }

    async fn find_all_posts(&self) -> AppResult<Vec<Post>> {
        let store = self.store.read().await;
        Ok(store.posts_where(|_| true))
    }

    async fn find_posts_by_author(&self, author_id: i64) -> AppResult<Vec<Post>> {
        let store = self.store.read().await;
        Ok(store.posts_where(|p| p.author_id == author_id))
    }

    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&post.author_id) {
            return Err(AppError::NotFound(format!(
                "Cannot find user with id: {}",
                post.author_id
            )));
        }
        store.next_post_id += 1;
        let id = store.next_post_id;
        let now = Utc::now();
        let stored = StoredPost {
            title: post.title,
            content: post.content,
            author_id: post.author_id,
            created_at: now,
            updated_at: now,
        };
        let created = store.post(id, &stored);
        store.posts.insert(id, stored);
        created.ok_or_else(|| AppError::InternalConsistency("post author vanished".to_string()))
    }

    async fn update_post(&self, id: i64, title: &str, content: &str) -> AppResult<Option<Post>> {
        let mut store = self.store.write().await;
        let Some(stored) = store.posts.get_mut(&id) else {
            return Ok(None);
        };
        stored.title = title.to_string();
        stored.content = content.to_string();
        stored.updated_at = Utc::now();
        let stored = stored.clone();
        Ok(store.post(id, &stored))
    }

    async fn delete_post(&self, id: i64) -> AppResult<bool> {
        let mut store = self.store.write().await;
        Ok(store.posts.remove(&id).is_some())
    }
}
