use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

#[derive(Debug)]
struct Windows {
    by_client: HashMap<IpAddr, WindowState>,
    last_prune: Instant,
}

/// Fixed one-second window per client address.
///
/// The client is the TCP peer. `X-Forwarded-For` is read only when
/// `trust_forwarded_for` is set, i.e. behind a proxy that overwrites it.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    trust_forwarded_for: bool,
    windows: Arc<Mutex<Windows>>,
}

impl RateLimiter {
    pub fn new(rps: u32, trust_forwarded_for: bool) -> Self {
        Self {
            rps: rps.max(1),
            trust_forwarded_for,
            windows: Arc::new(Mutex::new(Windows {
                by_client: HashMap::new(),
                last_prune: Instant::now(),
            })),
        }
    }

    fn allow(&self, client: IpAddr, now: Instant) -> bool {
        let mut guard = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // expired windows carry no state, drop them once per window
        if now.duration_since(guard.last_prune) >= WINDOW {
            guard
                .by_client
                .retain(|_, w| now.duration_since(w.start) < WINDOW);
            guard.last_prune = now;
        }

        let window = guard.by_client.entry(client).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.by_client.len(),
            Err(poisoned) => poisoned.into_inner().by_client.len(),
        }
    }

    fn client_of(&self, req: &Request<Body>) -> Option<IpAddr> {
        if self.trust_forwarded_for {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(client) = state.client_of(&req) else {
        tracing::error!("Rate limiter has no peer address; serve with connect info");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": "missing_peer_address"})),
        )
            .into_response();
    };

    if !state.allow(client, Instant::now()) {
        tracing::warn!(client = %client, "Auth rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"ok": false, "error": "rate_limit_exceeded"})),
        )
            .into_response();
    }
    next.run(req).await
}
