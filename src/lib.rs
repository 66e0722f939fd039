use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod services;

// Routing split by access level (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use services::{PostService, UserService};

/// ApiDoc
///
/// OpenAPI document for every route and wire schema, served at
/// `/api-docs/openapi.json` and browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_posts, handlers::get_post, handlers::create_post,
        handlers::update_post, handlers::delete_post,
        handlers::get_user, handlers::get_users, handlers::register_user,
        handlers::add_role_to_user, handlers::remove_role_from_user, handlers::delete_user
    ),
    components(
        schemas(
            models::UserRole, models::PostSummary, models::PostResponse,
            models::UserSummary, models::RoleAssignment, models::CreatePostRequest,
            models::CreateUserRequest, models::AddRoleRequest, error::ErrorDetails,
        )
    ),
    modifiers(&BasicAuthScheme),
    tags(
        (name = "blog-post-manager", description = "Blog Post Manager API")
    )
)]
pub struct ApiDoc;

/// Registers the `basic_auth` scheme the handlers' `security(...)` entries refer to.
struct BasicAuthScheme;

impl Modify for BasicAuthScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "basic_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Basic)),
            );
        }
    }
}

/// AppState
///
/// The single shared container handed to the router. Cloned per request, so
/// every field is a cheap handle onto shared data.
///
/// Handlers never take the whole state. Each one pulls the service it needs
/// through the `FromRef` impls below (`State<PostService>` or
/// `State<UserService>`).
#[derive(Clone)]
pub struct AppState {
    /// Post Service: post CRUD and the ownership rule. Backed by the same
    /// repository handle as `users`.
    pub posts: PostService,
    /// User Management Service: registration, lookups, role membership,
    /// account deletion and Basic credential checks. Also pulled by the
    /// `AuthUser` extractor and the `require_auth` route layer.
    pub users: UserService,
}

impl AppState {
    /// Builds both services over one shared repository.
    pub fn new(repo: RepositoryState) -> Self {
        Self {
            posts: PostService::new(repo.clone()),
            users: UserService::new(repo),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Post handlers extract `State<PostService>`.
impl FromRef<AppState> for PostService {
    fn from_ref(app_state: &AppState) -> PostService {
        app_state.posts.clone()
    }
}

// User handlers and the `AuthUser` extractor extract `State<UserService>`.
impl FromRef<AppState> for UserService {
    fn from_ref(app_state: &AppState) -> UserService {
        app_state.users.clone()
    }
}

/// create_router
///
/// Assembles the application's entire routing structure, applies the scoped
/// authentication layer and the global observability layers, and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    // The API is consumed by browser clients on other origins; nothing is
    // restricted at this layer.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name used for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected Routes
    // Authenticated and admin routes share one `require_auth` route layer:
    // a request without valid Basic credentials is answered 401 before any
    // handler runs. Admin handlers additionally check the ADMIN role
    // themselves and answer 403.
    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.users.clone(),
            auth::require_auth,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // 3a. Documentation: Swagger UI plus the raw OpenAPI document.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // 3b. Public Routes: health check and self-registration, no auth layer.
        .merge(public::public_routes())
        // 3c. Protected Routes (see step 2).
        .merge(protected)
        .with_state(state)
        // 3d. Error Details: stamps `uri=<path>` into every error envelope.
        // Applied after `with_state` so it also sees extractor rejections.
        .layer(middleware::from_fn(error::attach_request_details));

    // 4. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a fresh UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one `http_request` span per request,
                // tagged with the generated id by `trace_span_logger`.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echoes `x-request-id` back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer (applied last)
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with its `x-request-id` so every log line
/// of the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
