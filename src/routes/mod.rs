/// Router Module Index
///
/// Routes grouped by who may call them. `create_router` wraps the
/// authenticated and admin groups in the same Basic-auth route layer.

/// Routes open to anonymous clients.
pub mod public;

/// Routes for any authenticated user.
pub mod authenticated;

/// Routes whose handlers additionally require the ADMIN role.
pub mod admin;
