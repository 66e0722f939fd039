//! Runs against a real PostgreSQL database named by `DATABASE_URL`.
//! Ignored by default: `cargo test -- --ignored` with a scratch database.

use blog_post_manager::{
    AppError,
    models::{NewPost, UserRole},
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use tokio::test;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        sqlx::query("TRUNCATE posts, user_roles, users RESTART IDENTITY CASCADE")
            .execute(&pool)
            .await
            .expect("Failed to reset tables.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// All scenarios share one database, so they run as a single test.
#[test]
#[ignore]
async fn test_postgres_repository_end_to_end() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    // Roles
    repo.seed_roles().await.unwrap();
    repo.seed_roles().await.unwrap();
    let user_role = repo.find_role(UserRole::User).await.unwrap().unwrap();
    let admin_role = repo.find_role(UserRole::Admin).await.unwrap().unwrap();

    // Users
    let alice = repo.create_user("alice", "hash-a", &user_role).await.unwrap();
    assert!(repo.username_exists("alice").await.unwrap());
    assert!(matches!(
        repo.create_user("alice", "hash-b", &user_role).await,
        Err(AppError::UserAlreadyExists(_))
    ));

    repo.grant_role(alice.id, &admin_role).await.unwrap();
    repo.grant_role(alice.id, &admin_role).await.unwrap();
    let loaded = repo.find_user_by_id(alice.id).await.unwrap().unwrap();
    assert!(loaded.roles.contains(&UserRole::Admin));
    repo.revoke_role(alice.id, &admin_role).await.unwrap();
    let loaded = repo.find_user_by_username("alice").await.unwrap().unwrap();
    assert!(!loaded.roles.contains(&UserRole::Admin));
    assert!(loaded.roles.contains(&UserRole::User));

    // Posts
    let post = repo
        .create_post(NewPost {
            title: "Hello".to_string(),
            content: "World!!".to_string(),
            author_id: alice.id,
        })
        .await
        .unwrap();
    assert_eq!(post.author, "alice");

    let updated = repo
        .update_post(post.id, "Edited", "Changed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.created_at, post.created_at);
    assert!(updated.updated_at >= post.updated_at);
    assert_eq!(repo.find_posts_by_author(alice.id).await.unwrap().len(), 1);
    assert!(repo.update_post(9_999, "x", "y").await.unwrap().is_none());

    // Cascade
    assert!(repo.delete_user(alice.id).await.unwrap());
    assert!(repo.find_post(post.id).await.unwrap().is_none());
    assert!(!repo.delete_user(alice.id).await.unwrap());
    assert!(!repo.delete_post(post.id).await.unwrap());
}
