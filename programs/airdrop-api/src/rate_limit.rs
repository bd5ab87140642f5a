use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::errors::AirdropError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Admission control keyed by client identity. Implementations may be
/// process-local or backed by a shared store.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str) -> RateDecision;

    /// Drops bookkeeping for clients idle longer than the window.
    fn prune(&self) {}
}

/// Sliding-log limiter: at most `max_requests` within any `window`.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let log = hits.entry(key.to_owned()).or_default();
        while let Some(&oldest) = log.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.max_requests as usize {
            let retry_after = log
                .front()
                .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            return RateDecision::Limited { retry_after };
        }

        log.push_back(now);
        RateDecision::Allowed {
            remaining: self.max_requests - log.len() as u32,
        }
    }

    pub fn prune_at(&self, now: Instant) {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.retain(|_, log| {
            log.back()
                .is_some_and(|&latest| now.saturating_duration_since(latest) < self.window)
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn prune(&self) {
        self.prune_at(Instant::now())
    }
}

/// Middleware for mutating routes.
pub async fn enforce(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    match app.limiter.check(&key) {
        RateDecision::Allowed { .. } => next.run(req).await,
        RateDecision::Limited { retry_after } => {
            warn!(client = %key, path = %req.uri().path(), "rate limit exceeded");
            AirdropError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            }
            .into_response()
        }
    }
}

/// First `X-Forwarded-For` hop, else the peer address.
pub fn client_key(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}
