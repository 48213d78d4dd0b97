pub mod auth;
pub mod health;
pub mod notify;

use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::{auth::require_session, rate_limit};
use crate::AppState;

/// All application routes. Transport layers (CORS, tracing) are added by the
/// binary, which must serve with `ConnectInfo<SocketAddr>` for the login
/// rate limiter.
pub fn router(state: AppState, auth_rps: u32, trust_forwarded_for: bool) -> Router {
    let login = Router::new()
        .route("/auth/telegram", post(auth::telegram_login))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::new(auth_rps, trust_forwarded_for),
            rate_limit::rps_middleware,
        ));

    let session_api = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/notify/telegram", post(notify::notify_telegram))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(login)
        .merge(session_api)
        .with_state(state)
}
