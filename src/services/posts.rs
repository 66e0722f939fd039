use tracing::{debug, info, instrument, warn};

use super::Caller;
use crate::error::{AppError, AppResult};
use crate::models::{NewPost, Post, PostResponse, PostSummary, User};
use crate::repository::RepositoryState;

/// PostService
///
/// CRUD over posts with the ownership rule applied to every read, update and
/// delete of a single post:
///
/// `allowed = caller.is_admin || post.author == caller.username`
///
/// The rule is only evaluated once the post is known to exist, so a missing
/// id is always `NotFound`, whoever asks.
#[derive(Clone)]
pub struct PostService {
    repo: RepositoryState,
}

impl PostService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// All posts for an admin; otherwise only the caller's own, newest first.
    #[instrument(skip(self), fields(username = %caller.username, admin = caller.is_admin))]
    pub async fn list_summaries(&self, caller: &Caller) -> AppResult<Vec<PostSummary>> {
        let posts = if caller.is_admin {
            self.repo.find_all_posts().await?
        } else {
            let author = self.resolve_user(&caller.username).await?;
            self.repo.find_posts_by_author(author.id).await?
        };
        Ok(posts.iter().map(PostSummary::from).collect())
    }

    #[instrument(skip(self), fields(username = %caller.username))]
    pub async fn get_post(&self, id: i64, caller: &Caller) -> AppResult<PostResponse> {
        let post = self.load_authorized(id, caller).await?;
        Ok(post.into())
    }

    /// create_post
    ///
    /// The caller becomes the author. A caller whose user record no longer
    /// exists (deleted while still holding valid credentials) gets `NotFound`.
    #[instrument(skip(self, content))]
    pub async fn create_post(
        &self,
        title: String,
        content: String,
        caller_username: &str,
    ) -> AppResult<PostResponse> {
        let author = self.resolve_user(caller_username).await?;
        let post = self
            .repo
            .create_post(NewPost {
                title,
                content,
                author_id: author.id,
            })
            .await?;

        info!(post_id = post.id, author = %post.author, "post created");
        Ok(post.into())
    }

    /// update_post
    ///
    /// Overwrites title and content. Author and `created_at` are never touched;
    /// `updated_at` is refreshed by the store.
    #[instrument(skip(self, content), fields(username = %caller.username))]
    pub async fn update_post(
        &self,
        id: i64,
        title: String,
        content: String,
        caller: &Caller,
    ) -> AppResult<PostResponse> {
        self.load_authorized(id, caller).await?;

        let updated = self
            .repo
            .update_post(id, &title, &content)
            .await?
            // Deleted between the check and the write.
            .ok_or_else(|| post_not_found(id))?;

        info!(post_id = id, "post updated");
        Ok(updated.into())
    }

    #[instrument(skip(self), fields(username = %caller.username))]
    pub async fn delete_post(&self, id: i64, caller: &Caller) -> AppResult<()> {
        self.load_authorized(id, caller).await?;

        if !self.repo.delete_post(id).await? {
            return Err(post_not_found(id));
        }

        info!(post_id = id, "post deleted");
        Ok(())
    }

    async fn resolve_user(&self, username: &str) -> AppResult<User> {
        self.repo
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cannot find user with username {}", username)))
    }

    /// Existence first, then ownership.
    async fn load_authorized(&self, id: i64, caller: &Caller) -> AppResult<Post> {
        let post = self
            .repo
            .find_post(id)
            .await?
            .ok_or_else(|| post_not_found(id))?;

        if !can_access(&post, caller) {
            warn!(post_id = id, author = %post.author, "ownership check denied access");
            return Err(AppError::Forbidden(
                "This post does not belong to this author!".to_string(),
            ));
        }

        debug!(post_id = id, "ownership check passed");
        Ok(post)
    }
}

/// Admin bypass, otherwise the caller must be the author.
pub fn can_access(post: &Post, caller: &Caller) -> bool {
    caller.is_admin || post.author == caller.username
}

fn post_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Cannot find post with id: {}", id))
}
