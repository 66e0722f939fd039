use tracing::{info, instrument, warn};

use super::Caller;
use crate::error::{AppError, AppResult};
use crate::models::{Role, RoleAssignment, User, UserRole, UserSummary};
use crate::password;
use crate::repository::RepositoryState;

/// UserService
///
/// User lifecycle (registration, lookup, deletion) and role membership.
/// Access control for the admin-only operations lives in the HTTP layer;
/// this service trusts its callers except where a `Caller` is passed in.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
}

impl UserService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn get_user_by_id(&self, id: i64) -> AppResult<UserSummary> {
        let user = self.find_by_id(id).await?;
        Ok(UserSummary::from(&user))
    }

    pub async fn get_user_by_username(&self, username: &str) -> AppResult<UserSummary> {
        let user = self.find_by_username(username).await?;
        Ok(UserSummary::from(&user))
    }

    /// get_user
    ///
    /// Resolves a `/users/{key}` path segment. An all-digit key is tried as an
    /// id first and falls back to a username lookup, so numeric usernames stay
    /// reachable.
    pub async fn get_user(&self, key: &str) -> AppResult<UserSummary> {
        let user = self.resolve_key(key).await?;
        Ok(UserSummary::from(&user))
    }

    pub async fn list_users(&self) -> AppResult<Vec<UserSummary>> {
        let users = self.repo.list_users().await?;
        Ok(users.iter().map(UserSummary::from).collect())
    }

    /// create_user
    ///
    /// Registers a new account holding only the USER role.
    ///
    /// # Errors
    /// * `UserAlreadyExists` if the username is taken (checked up front and
    ///   again by the store's unique constraint).
    /// * `InternalConsistency` if the USER role was never seeded.
    #[instrument(skip(self, password))]
    pub async fn create_user(&self, username: &str, password: &str) -> AppResult<UserSummary> {
        if self.repo.username_exists(username).await? {
            return Err(AppError::UserAlreadyExists(username.to_string()));
        }

        let hash = password::hash_password(password)?;
        let role = self.repo.find_role(UserRole::User).await?.ok_or_else(|| {
            AppError::InternalConsistency("Default ROLE_USER not found in database!".to_string())
        })?;

        let user = self.repo.create_user(username, &hash, &role).await?;
        info!(user_id = user.id, "user registered");
        Ok(UserSummary::from(&user))
    }

    /// Grants `role`. Granting a role the user already holds changes nothing.
    #[instrument(skip(self))]
    pub async fn add_role_to_user(&self, username: &str, role: UserRole) -> AppResult<RoleAssignment> {
        let (user, role) = self.user_and_role(username, role).await?;
        self.repo.grant_role(user.id, &role).await?;

        info!(user_id = user.id, role = %role.name, "role granted");
        Ok(RoleAssignment {
            username: user.username,
            role: role.name,
        })
    }

    /// Revokes `role`. Revoking a role the user does not hold is not an error.
    #[instrument(skip(self))]
    pub async fn remove_role_from_user(&self, username: &str, role: UserRole) -> AppResult<()> {
        let (user, role) = self.user_and_role(username, role).await?;
        self.repo.revoke_role(user.id, &role).await?;

        info!(user_id = user.id, role = %role.name, "role revoked");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_user_by_id(&self, id: i64) -> AppResult<()> {
        if !self.repo.delete_user(id).await? {
            return Err(user_id_not_found(id));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_user_by_username(&self, username: &str) -> AppResult<()> {
        let user = self.find_by_username(username).await?;
        if !self.repo.delete_user(user.id).await? {
            return Err(username_not_found(username));
        }
        info!(user_id = user.id, "user deleted");
        Ok(())
    }

    /// delete_user_as
    ///
    /// `DELETE /users/{key}`: admins may delete any account, everyone else only
    /// their own. A missing target is `NotFound` before any ownership check.
    #[instrument(skip(self), fields(username = %caller.username))]
    pub async fn delete_user_as(&self, key: &str, caller: &Caller) -> AppResult<()> {
        let target = self.resolve_key(key).await?;
        if !caller.is_admin && target.username != caller.username {
            warn!(target_id = target.id, "non-admin tried to delete another account");
            return Err(AppError::Forbidden(
                "You can only delete your own account!".to_string(),
            ));
        }
        self.delete_user_by_id(target.id).await
    }

    /// authenticate
    ///
    /// Checks Basic credentials. Unknown usernames and wrong passwords both
    /// yield `Ok(None)`, and both pay for one argon2 verify so response
    /// timing does not reveal which usernames exist.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<Option<User>> {
        let Some(user) = self.repo.find_user_by_username(username).await? else {
            password::verify_against_dummy(password);
            return Ok(None);
        };
        if password::verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// ensure_bootstrap_admin
    ///
    /// Creates the configured admin account if missing and makes sure it holds
    /// ADMIN. Safe to run on every start.
    #[instrument(skip(self, password))]
    pub async fn ensure_bootstrap_admin(&self, username: &str, password: &str) -> AppResult<()> {
        match self.create_user(username, password).await {
            Ok(_) | Err(AppError::UserAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        self.add_role_to_user(username, UserRole::Admin).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> AppResult<User> {
        self.repo
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| user_id_not_found(id))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<User> {
        self.repo
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| username_not_found(username))
    }

    async fn resolve_key(&self, key: &str) -> AppResult<User> {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = key.parse::<i64>() {
                if let Some(user) = self.repo.find_user_by_id(id).await? {
                    return Ok(user);
                }
            }
        }
        self.find_by_username(key).await
    }

    async fn user_and_role(&self, username: &str, role: UserRole) -> AppResult<(User, Role)> {
        let user = self
            .repo
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))?;
        let role = self
            .repo
            .find_role(role)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role not found: {}", role)))?;
        Ok((user, role))
    }
}

fn user_id_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("User with id ({}) not found!", id))
}

fn username_not_found(username: &str) -> AppError {
    AppError::NotFound(format!("User with username ({}) not found!", username))
}
