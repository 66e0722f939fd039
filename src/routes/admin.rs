use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Admin Router Module
///
/// User administration. This router sits behind the same authentication layer
/// as the authenticated routes; every handler here calls
/// `AuthUser::require_admin` before touching the store.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users lists every account, PATCH /users grants a role.
        .route(
            "/users",
            get(handlers::get_users).patch(handlers::add_role_to_user),
        )
        // DELETE /users/{username}/role/{role}
        .route(
            "/users/{username}/role/{role}",
            delete(handlers::remove_role_from_user),
        )
}
