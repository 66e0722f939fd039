use std::env;

/// AppConfig
///
/// Holds the application's entire configuration. Loaded once at startup,
/// immutable afterwards, and pulled into handlers and extractors via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects the log format.
    pub env: Env,
    // Database connection string (Postgres).
    pub db_url: String,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    pub max_db_connections: u32,
    // Account created (and granted ADMIN) at startup, if configured.
    pub bootstrap_admin: Option<AdminCredentials>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Clone, PartialEq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every setting from the environment.
    ///
    /// # Panics
    /// Panics with a `FATAL:` message when `DATABASE_URL` is missing, when
    /// `DB_MAX_CONNECTIONS` is not a positive integer, when only one of
    /// `ADMIN_USERNAME`/`ADMIN_PASSWORD` is set, or, in production, when the
    /// bootstrap admin password is shorter than 8 characters.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = env::var("DATABASE_URL").expect("FATAL: DATABASE_URL must be set.");

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let max_db_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => panic!("FATAL: DB_MAX_CONNECTIONS must be a positive integer, got {raw:?}."),
            },
            Err(_) => 5,
        };

        let bootstrap_admin = match (env::var("ADMIN_USERNAME"), env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(AdminCredentials { username, password }),
            (Err(_), Err(_)) => None,
            _ => panic!("FATAL: ADMIN_USERNAME and ADMIN_PASSWORD must be set together."),
        };

        if env == Env::Production {
            if let Some(admin) = &bootstrap_admin {
                if admin.password.chars().count() < 8 {
                    panic!("FATAL: ADMIN_PASSWORD must be at least 8 characters in production.");
                }
            }
        }

        Self {
            env,
            db_url,
            bind_addr,
            max_db_connections,
            bootstrap_admin,
        }
    }
}
