use crate::{
    auth::AuthUser,
    error::{AppError, AppResult, ErrorDetails},
    extract::ValidatedJson,
    models::{
        AddRoleRequest, CreatePostRequest, CreateUserRequest, PostResponse, PostSummary,
        RoleAssignment, UserRole, UserSummary,
    },
    services::{PostService, UserService},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

// --- Post Handlers ---

/// get_posts
///
/// [Authenticated Route] Post summaries visible to the caller: every post for
/// an admin, the caller's own posts otherwise.
#[utoipa::path(
    get,
    path = "/posts",
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Summaries visible to the caller", body = [PostSummary]),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn get_posts(
    auth: AuthUser,
    State(posts): State<PostService>,
) -> AppResult<Json<Vec<PostSummary>>> {
    let summaries = posts.list_summaries(&auth.caller()).await?;
    Ok(Json(summaries))
}

/// get_post
///
/// [Authenticated Route] A single post. Owner or admin only.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    security(("basic_auth" = [])),
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostResponse),
        (status = 403, description = "Not the author", body = ErrorDetails),
        (status = 404, description = "Not Found", body = ErrorDetails)
    )
)]
pub async fn get_post(
    auth: AuthUser,
    State(posts): State<PostService>,
    Path(id): Path<i64>,
) -> AppResult<Json<PostResponse>> {
    let post = posts.get_post(id, &auth.caller()).await?;
    Ok(Json(post))
}

/// create_post
///
/// [Authenticated Route] Creates a post authored by the caller and answers
/// 201 with `Location: /posts/{id}`.
#[utoipa::path(
    post,
    path = "/posts",
    security(("basic_auth" = [])),
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = PostResponse),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn create_post(
    auth: AuthUser,
    State(posts): State<PostService>,
    ValidatedJson(payload): ValidatedJson<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let post = posts
        .create_post(payload.title, payload.content, &auth.username)
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/posts/{}", post.id))],
        Json(post),
    ))
}

/// update_post
///
/// [Authenticated Route] Replaces title and content. Owner or admin only.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    security(("basic_auth" = [])),
    params(("id" = i64, Path, description = "Post ID")),
    request_body = CreatePostRequest,
    responses(
        (status = 200, description = "Updated", body = PostResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the author", body = ErrorDetails),
        (status = 404, description = "Not Found", body = ErrorDetails)
    )
)]
pub async fn update_post(
    auth: AuthUser,
    State(posts): State<PostService>,
    Path(id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<CreatePostRequest>,
) -> AppResult<Json<PostResponse>> {
    let post = posts
        .update_post(id, payload.title, payload.content, &auth.caller())
        .await?;
    Ok(Json(post))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}",
    security(("basic_auth" = [])),
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author", body = ErrorDetails),
        (status = 404, description = "Not Found", body = ErrorDetails)
    )
)]
pub async fn delete_post(
    auth: AuthUser,
    State(posts): State<PostService>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    posts.delete_post(id, &auth.caller()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- User Handlers ---

/// get_user
///
/// [Authenticated Route] Looks a user up by id or username. All-digit keys are
/// tried as an id first.
#[utoipa::path(
    get,
    path = "/users/{key}",
    security(("basic_auth" = [])),
    params(("key" = String, Path, description = "User ID or username")),
    responses(
        (status = 200, description = "Found", body = UserSummary),
        (status = 404, description = "Not Found", body = ErrorDetails)
    )
)]
pub async fn get_user(
    _auth: AuthUser,
    State(users): State<UserService>,
    Path(key): Path<String>,
) -> AppResult<Json<UserSummary>> {
    let user = users.get_user(&key).await?;
    Ok(Json(user))
}

/// get_users
///
/// [Admin Route] Every registered user.
#[utoipa::path(
    get,
    path = "/users",
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "All users", body = [UserSummary]),
        (status = 403, description = "Caller is not an admin", body = ErrorDetails)
    )
)]
pub async fn get_users(
    auth: AuthUser,
    State(users): State<UserService>,
) -> AppResult<Json<Vec<UserSummary>>> {
    auth.require_admin()?;
    Ok(Json(users.list_users().await?))
}

/// register_user
///
/// [Public Route] Registers a new account with the USER role and answers 201
/// with `Location: /users/{id}`.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Registered", body = UserSummary),
        (status = 400, description = "Validation failed"),
        (status = 422, description = "Username already taken", body = ErrorDetails)
    )
)]
pub async fn register_user(
    State(users): State<UserService>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let user = users
        .create_user(&payload.username, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/users/{}", user.id))],
        Json(user),
    ))
}

/// add_role_to_user
///
/// [Admin Route] Grants a role. Granting a role already held is a no-op.
#[utoipa::path(
    patch,
    path = "/users",
    security(("basic_auth" = [])),
    request_body = AddRoleRequest,
    responses(
        (status = 200, description = "Role granted", body = RoleAssignment),
        (status = 403, description = "Caller is not an admin", body = ErrorDetails),
        (status = 404, description = "User or role not found", body = ErrorDetails)
    )
)]
pub async fn add_role_to_user(
    auth: AuthUser,
    State(users): State<UserService>,
    ValidatedJson(payload): ValidatedJson<AddRoleRequest>,
) -> AppResult<Json<RoleAssignment>> {
    auth.require_admin()?;
    let assignment = users
        .add_role_to_user(&payload.username, payload.role)
        .await?;
    Ok(Json(assignment))
}

/// remove_role_from_user
///
/// [Admin Route] Revokes a role. Revoking a role not held is a no-op.
#[utoipa::path(
    delete,
    path = "/users/{username}/role/{role}",
    security(("basic_auth" = [])),
    params(
        ("username" = String, Path, description = "Username"),
        ("role" = String, Path, description = "USER or ADMIN, case-insensitive")
    ),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Caller is not an admin", body = ErrorDetails),
        (status = 404, description = "User not found", body = ErrorDetails)
    )
)]
pub async fn remove_role_from_user(
    auth: AuthUser,
    State(users): State<UserService>,
    Path((username, role)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    let role: UserRole = role
        .parse()
        .map_err(|_| AppError::validation("role", "The role provided is not a valid role!"))?;

    users.remove_role_from_user(&username, role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// delete_user
///
/// [Authenticated Route] Deletes an account by id or username. Admins may
/// delete anyone; other callers only themselves.
#[utoipa::path(
    delete,
    path = "/users/{key}",
    security(("basic_auth" = [])),
    params(("key" = String, Path, description = "User ID or username")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not your account", body = ErrorDetails),
        (status = 404, description = "Not Found", body = ErrorDetails)
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    State(users): State<UserService>,
    Path(key): Path<String>,
) -> AppResult<StatusCode> {
    users.delete_user_as(&key, &auth.caller()).await?;
    Ok(StatusCode::NO_CONTENT)
}
