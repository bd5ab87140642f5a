//! $REGRET airdrop backend: registration, daily prize wheel, referrals and
//! aggregate stats over a transactional store.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Returns early with `$err` when `$cond` does not hold.
macro_rules! require {
    ($cond:expr, $err:expr $(,)?) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

pub mod clock;
pub mod config;
pub mod constants;
pub mod contexts;
pub mod errors;
pub mod instructions;
pub mod prize_wheel;
pub mod rate_limit;
pub mod state;
pub mod store;

use clock::{Clock, SystemClock};
use config::Config;
use prize_wheel::PrizeWheel;
use rate_limit::{RateLimiter, SlidingWindowLimiter};
use store::AirdropStore;

/// Shared handler state. Every collaborator is behind a trait object so tests
/// can swap the store, the clock and the limiter.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AirdropStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    pub limiter: Arc<dyn RateLimiter>,
    pub wheel: PrizeWheel,
}

impl AppState {
    pub fn new(store: Arc<dyn AirdropStore>, config: Config) -> Self {
        let limiter = SlidingWindowLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window,
        );
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            wheel: PrizeWheel::standard(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_wheel(mut self, wheel: PrizeWheel) -> Self {
        self.wheel = wheel;
        self
    }
}

fn api_routes(state: &AppState) -> Router<AppState> {
    let mutating = Router::new()
        .route("/register", post(instructions::register::handler))
        .route("/spin", post(instructions::spin::handler))
        .route("/referrals/add", post(instructions::add_referral::handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/stats", get(instructions::stats::handler))
        .route(
            "/referrals/wallet",
            get(instructions::referrals_for_wallet::handler),
        )
        .route(
            "/referrals/lookup",
            get(instructions::lookup_referral_code::handler),
        )
        .route("/health", get(instructions::health::handler))
        .route("/admin/operations", post(instructions::admin::handler))
        .route(
            "/admin/dashboard",
            get(instructions::admin_dashboard::handler),
        )
        .merge(mutating)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!(origin, "CORS_ORIGIN is not a valid header value; allowing any origin");
                AllowOrigin::any()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-admin-token")])
}

/// Every endpoint is served at the root and again under `/api`.
pub fn router(state: AppState) -> Router {
    let api = api_routes(&state);
    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(cors_layer(&state.config.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
