use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use std::collections::BTreeSet;

use crate::{
    error::AppError,
    models::UserRole,
    services::{Caller, UserService},
};

/// Realm advertised in the `WWW-Authenticate` challenge.
pub const REALM: &str = "blog-post-manager";

/// AuthUser
///
/// The resolved identity of an authenticated request: the user record the
/// Basic credentials matched, with the roles it held at that moment.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub roles: BTreeSet<UserRole>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&UserRole::Admin)
    }

    /// The identity handed to the service layer.
    pub fn caller(&self) -> Caller {
        Caller {
            username: self.username.clone(),
            is_admin: self.is_admin(),
        }
    }

    /// Admin-only routes call this before doing anything else.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access Denied".to_string()))
        }
    }
}

/// 401 with a Basic challenge, so browsers and curl know to retry with credentials.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", REALM))],
    )
        .into_response()
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse: if `require_auth` already authenticated this request, take the
///    identity from the request extensions (no second password hash check).
/// 2. Header: decode `Authorization: Basic <base64(user:pass)>`.
/// 3. Lookup: load the user and verify the password against its argon2 hash.
///
/// Rejection: 401 with `WWW-Authenticate` on bad or missing credentials;
/// 500 if the store fails.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    UserService: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let TypedHeader(Authorization(basic)) =
            TypedHeader::<Authorization<Basic>>::from_request_parts(parts, state)
                .await
                .map_err(|_| unauthorized())?;

        let users = UserService::from_ref(state);
        match users.authenticate(basic.username(), basic.password()).await {
            Ok(Some(user)) => {
                let auth_user = AuthUser {
                    id: user.id,
                    username: user.username,
                    roles: user.roles,
                };
                parts.extensions.insert(auth_user.clone());
                Ok(auth_user)
            }
            Ok(None) => {
                tracing::debug!(username = basic.username(), "rejected basic credentials");
                Err(unauthorized())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

/// require_auth
///
/// Route layer for every non-public route. Rejects unauthenticated requests
/// before the handler runs and leaves the resolved `AuthUser` in the request
/// extensions for the handler's own extractor.
pub async fn require_auth(
    State(users): State<UserService>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    match AuthUser::from_request_parts(&mut parts, &users).await {
        Ok(_) => next.run(Request::from_parts(parts, body)).await,
        Err(rejection) => rejection,
    }
}
