//! Service layer: the only place where authorization and entity lifecycle
//! decisions are made. Handlers translate HTTP into these calls; the
//! repository only stores what it is told to.

pub mod posts;
pub mod users;

pub use posts::PostService;
pub use users::UserService;

/// Caller
///
/// The identity a service call is made on behalf of, as established by the
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: false,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: true,
        }
    }
}
