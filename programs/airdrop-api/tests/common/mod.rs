#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use airdrop_api::clock::ManualClock;
use airdrop_api::config::Config;
use airdrop_api::constants::BASE58_ALPHABET;
use airdrop_api::contexts::{AddReferralRequest, RegisterRequest, SpinRequest};
use airdrop_api::rate_limit::SlidingWindowLimiter;
use airdrop_api::store::MemoryStore;
use airdrop_api::AppState;

pub const ALICE: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const BOB: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const CAROL: &str = "HN7cABqLq46Es1jh92dQQisAq662SmxELLLsHHe4YWrH";
pub const DAVE: &str = "DRpbCBMxVnDK7maPM5tGv6MvB3v1sRMC86PZ8okm21hy";

pub struct Harness {
    pub app: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let app = AppState::new(store.clone(), config)
        .with_clock(clock.clone())
        .with_limiter(Arc::new(SlidingWindowLimiter::new(
            10_000,
            Duration::from_secs(60),
        )));
    Harness { app, store, clock }
}

/// Deterministic, distinct, well-formed wallet for index `n`.
pub fn wallet(n: usize) -> String {
    let alphabet = BASE58_ALPHABET.as_bytes();
    let hi = char::from(alphabet[(n / alphabet.len()) % alphabet.len()]);
    let lo = char::from(alphabet[n % alphabet.len()]);
    format!("{}{hi}{lo}", "W".repeat(42))
}

pub fn register_req(wallet: &str) -> RegisterRequest {
    RegisterRequest {
        wallet: Some(wallet.to_owned()),
        wallet_type: Some("phantom".to_owned()),
        ..RegisterRequest::default()
    }
}

pub fn spin_req(wallet: &str) -> SpinRequest {
    SpinRequest {
        wallet: Some(wallet.to_owned()),
    }
}

pub fn referral_req(referrer: &str, referred: &str, code: &str) -> AddReferralRequest {
    AddReferralRequest {
        referrer_wallet: Some(referrer.to_owned()),
        referred_wallet: Some(referred.to_owned()),
        referral_code: Some(code.to_owned()),
    }
}
