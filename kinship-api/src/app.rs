/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use kinship_api::{app::{build_router, AppState}, config::Config};
/// use kinship_shared::store::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(Arc::new(MemoryStore::new()), config);
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Router,
};
use kinship_shared::{
    addresses::AddressBook,
    auth::middleware::authenticate,
    events::EventBoard,
    membership::MembershipWorkflow,
    notifications::NotificationCenter,
    store::Store,
    tasks::TaskBoard,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend (Postgres or in-memory)
    pub store: Arc<dyn Store>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn membership(&self) -> MembershipWorkflow {
        MembershipWorkflow::new(self.store.clone())
    }

    pub fn notifications(&self) -> NotificationCenter {
        NotificationCenter::new(self.store.clone())
    }

    pub fn tasks(&self) -> TaskBoard {
        TaskBoard::new(self.store.clone())
    }

    pub fn events(&self) -> EventBoard {
        EventBoard::new(self.store.clone())
    }

    pub fn addresses(&self) -> AddressBook {
        AddressBook::new(self.store.clone())
    }
}

/// Builds the complete router with all routes and middleware
///
/// ```text
/// /
/// ├── GET /health
/// └── /v1/
///     ├── /auth/            register, login (public); me (authenticated)
///     ├── /families/        create, search, get, members, join requests
///     ├── /notifications/   list, get, mark read, fan-out
///     ├── /tasks/           list, create, update, delete, advance
///     ├── /events/          list, create, get, update, delete
///     └── /address          get, set (owner)
/// ```
///
/// Everything under `/v1` except register and login passes through
/// [`jwt_auth_layer`].
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login));

    let family_routes = Router::new()
        .route("/", post(routes::families::create_family))
        .route("/search", get(routes::families::search_families))
        .route("/:id", get(routes::families::get_family))
        .route("/:id/members", get(routes::families::list_members))
        .route(
            "/:id/join-request",
            post(routes::join_requests::create_join_request),
        )
        .route(
            "/:id/join-requests",
            get(routes::join_requests::list_pending_requests),
        )
        .route(
            "/:id/join-requests/:request_id/approve",
            put(routes::join_requests::approve_request),
        )
        .route(
            "/:id/join-requests/:request_id/reject",
            put(routes::join_requests::reject_request),
        );

    let notification_routes = Router::new()
        .route(
            "/",
            get(routes::notifications::list_notifications)
                .post(routes::notifications::create_notifications),
        )
        .route("/:id", get(routes::notifications::get_notification))
        .route("/:id/read", put(routes::notifications::mark_read));

    let task_routes = Router::new()
        .route(
            "/",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/:id/advance", post(routes::tasks::advance_task));

    let event_routes = Router::new()
        .route(
            "/",
            get(routes::events::list_events).post(routes::events::create_event),
        )
        .route(
            "/:id",
            get(routes::events::get_event)
                .put(routes::events::update_event)
                .delete(routes::events::delete_event),
        );

    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .nest("/families", family_routes)
        .nest("/notifications", notification_routes)
        .nest("/tasks", task_routes)
        .nest("/events", event_routes)
        .route(
            "/address",
            get(routes::address::get_address).post(routes::address::set_address),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/auth", public_auth_routes)
        .merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Resolves the bearer token into an [`AuthContext`](kinship_shared::auth::middleware::AuthContext)
/// and stores it in the request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(req.headers(), state.jwt_secret())?;

    tracing::debug!(user_id = %auth.user_id, "Request authenticated");
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
