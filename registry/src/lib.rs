//! Doorward Registry Service
//!
//! HTTP front end for the access engine: the door-controller access check,
//! admin login, and admin CRUD over users, rooms, schedules and the audit log.

pub mod auth;
pub mod clock;
pub mod password;
pub mod patch;
pub mod routes;
pub mod store;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use config_loader::ServiceConfig;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use wards::{
    AccessEngine, AccessError, AuditEventType, AuditLogger, AuditSink, EngineConfig, ErrorClass,
    RecordId, ScheduleBook, StoreError, UserDirectory,
};

use auth::JwtConfig;
use clock::Clock;
use store::{KvStore, MemoryStore, RecordStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub engine: Arc<AccessEngine>,
    pub jwt_config: JwtConfig,
    pub clock: Clock,
    pub cors_origins: Vec<String>,
    pub cors_allow_any: bool,
}

impl AppState {
    pub fn new<S: RecordStore + 'static>(
        store: Arc<S>,
        engine_config: EngineConfig,
        jwt_config: JwtConfig,
    ) -> Self {
        let users: Arc<dyn UserDirectory> = store.clone();
        let schedules: Arc<dyn ScheduleBook> = store.clone();
        let sink: Arc<dyn AuditSink> = store.clone();
        let audit = AuditLogger::new(sink, engine_config.io_timeout);
        let engine = AccessEngine::new(users, schedules, audit, engine_config);

        Self {
            store,
            engine: Arc::new(engine),
            jwt_config,
            clock: Clock::System,
            cors_origins: Vec::new(),
            cors_allow_any: false,
        }
    }

    /// State over an empty [`MemoryStore`].
    pub fn in_memory(engine_config: EngineConfig, jwt_config: JwtConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), engine_config, jwt_config)
    }

    /// Connect to JetStream KV and assemble the state from service config.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let engine_config = EngineConfig::new(
            &config.timezone,
            Duration::from_millis(config.io_timeout_ms),
        )?;
        let jwt_config = JwtConfig::from_service_config(config)?;
        let store = KvStore::connect(
            &config.nats_url,
            &config.kv_bucket,
            config.nats_creds_path.as_deref(),
        )
        .await?;

        info!(
            timezone = %engine_config.timezone,
            io_timeout_ms = config.io_timeout_ms,
            "Successfully initialized Doorward application state"
        );
        Ok(Self::new(Arc::new(store), engine_config, jwt_config)
            .with_cors(config.cors_origins.clone(), config.debug))
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cors(mut self, origins: Vec<String>, allow_any: bool) -> Self {
        self.cors_origins = origins;
        self.cors_allow_any = allow_any;
        self
    }

    /// Run a store call under the configured I/O timeout.
    pub async fn io<T, F>(&self, operation: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        wards::store::bounded(operation, self.engine.config().io_timeout, call)
            .await
            .map_err(AppError::from)
    }

    /// Best-effort audit entry; failures are logged by the audit logger.
    pub async fn audit(&self, event_type: AuditEventType, message: String, user_id: Option<RecordId>) {
        self.engine
            .audit()
            .log_event(event_type, message, user_id)
            .await;
    }
}

/// JSON error body `{"code", "message"}` with an HTTP status.
#[derive(Debug)]
pub struct AppError {
    pub status_code: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status_code: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let (status, code) = match &err {
            StoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            StoreError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "store_timeout"),
            StoreError::Corrupt { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_data"),
        };
        AppError::new(status, code, err.to_string())
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match (err.class(), err) {
            (_, AccessError::Store(e)) => e.into(),
            (ErrorClass::Client, e) => AppError::bad_request(e.to_string()),
            (ErrorClass::NotFound, e) => {
                AppError::new(StatusCode::NOT_FOUND, "user_not_found", e.to_string())
            }
            (ErrorClass::Internal, e) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_data", e.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(format!("Internal server error: {}", err))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            error!(code = self.code, status = %self.status_code, "{}", self.message);
        }
        let body = Json(json!({ "code": self.code, "message": self.message }));
        (self.status_code, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Health check endpoint
async fn healthz() -> impl IntoResponse {
    "OK"
}

fn cors_layer(state: &AppState) -> CorsLayer {
    if state.cors_allow_any {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = state
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Create the Axum application router
pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route(
            "/users/:id",
            put(routes::users::update_user).delete(routes::users::delete_user),
        )
        .route(
            "/rooms",
            get(routes::rooms::list_rooms).post(routes::rooms::create_rooms),
        )
        .route(
            "/schedule",
            get(routes::schedule::list_schedule).post(routes::schedule::create_entry),
        )
        .route(
            "/schedule/:id",
            put(routes::schedule::update_entry).delete(routes::schedule::delete_entry),
        )
        .route(
            "/logs",
            get(routes::logs::list_logs).post(routes::logs::create_log),
        )
        .route("/admin/dashboard", get(routes::dashboard::dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/access/:user_id/room/:room_number",
            get(routes::access::check_access),
        )
        .route("/login", post(routes::login::login))
        .merge(admin)
        .layer(cors_layer(&state))
        // Avoid logging request headers so Authorization tokens never reach logs.
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
