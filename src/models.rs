use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use sqlx::FromRow;
use std::{collections::BTreeSet, fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

// --- Roles ---

/// UserRole
///
/// The closed role vocabulary. Stored as its upper-case name in `roles.name`
/// and parsed case-insensitively from path segments and JSON bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 2] = [UserRole::User, UserRole::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Accepts any casing, same as path segments.
impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(UserRole::User),
            "ADMIN" => Ok(UserRole::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Role
///
/// A row of the seeded `roles` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: UserRole,
}

// --- Core Entities (Mapped to Database) ---

/// User
///
/// A registered account together with the set of roles it holds. The password
/// is only ever kept as an argon2 PHC string and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub roles: BTreeSet<UserRole>,
}

/// Post
///
/// A row of the `posts` table joined with the author's username.
/// `author_id` is fixed at insert time; no statement ever rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    /// Username of the author, loaded via JOIN.
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the post store.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author_id: i64,
}

// --- Request Payloads (Input Schemas) ---

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// CreatePostRequest
///
/// Body of `POST /posts` and `PUT /posts/{id}`. Lengths are counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    #[validate(
        custom(function = "not_blank", message = "Title cannot be empty!"),
        length(min = 3, max = 255, message = "Title must be between 3 and 255 characters")
    )]
    #[schema(example = "Ownership in practice")]
    pub title: String,

    #[validate(
        custom(function = "not_blank", message = "Content cannot be empty!"),
        length(min = 3, message = "Content must be atleast 3 characters long!")
    )]
    pub content: String,
}

/// CreateUserRequest
///
/// Body of the public registration endpoint (`POST /users`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(
        custom(function = "not_blank", message = "Username cannot be empty."),
        length(min = 4, max = 255, message = "Username has to be between 4 and 255 characters long!")
    )]
    #[schema(example = "alice")]
    pub username: String,

    #[validate(
        custom(function = "not_blank", message = "Password cannot be empty."),
        length(min = 8, message = "Password has to be atleast 8 characters long!")
    )]
    pub password: String,
}

/// AddRoleRequest
///
/// Body of `PATCH /users`. Grants `role` to `username`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct AddRoleRequest {
    #[validate(custom(function = "not_blank", message = "Username cannot be empty."))]
    pub username: String,
    pub role: UserRole,
}

// --- Response Schemas (Output) ---

/// PostSummary
///
/// List projection of a post: everything but the content.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// PostResponse
///
/// Full representation of a post, returned by get, create and update.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

/// RoleAssignment
///
/// Echo of a successful `PATCH /users`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct RoleAssignment {
    pub username: String,
    pub role: UserRole,
}

// --- Mapping ---

impl From<&Post> for PostSummary {
    fn from(p: &Post) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            author: p.author.clone(),
            created_at: p.created_at,
        }
    }
}

impl From<Post> for PostResponse {
    fn from(p: Post) -> Self {
        Self {
            id: p.id,
            title: p.title,
            content: p.content,
            author: p.author,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
        }
    }
}
