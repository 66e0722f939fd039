use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Authenticated Router Module
///
/// Everything a signed-in user can do. Handlers receive the resolved
/// `AuthUser`; post ownership is enforced in `PostService`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/POST /posts
        // Admins see every post, other users their own.
        .route(
            "/posts",
            get(handlers::get_posts).post(handlers::create_post),
        )
        // GET/PUT/DELETE /posts/{id}
        // Owner or admin only; a missing post is 404 before any ownership check.
        .route(
            "/posts/{id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        // GET/DELETE /users/{key}
        // `key` is a numeric id or a username. Non-admins may only delete themselves.
        .route(
            "/users/{key}",
            get(handlers::get_user).delete(handlers::delete_user),
        )
}
