use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::constants::{
    BASE58_ALPHABET, REFERRAL_CODE_FRAGMENT_LEN, REFERRAL_CODE_MAX_LEN, REFERRAL_CODE_MIN_LEN,
    REFERRAL_CODE_PREFIX, REFERRAL_CODE_SUFFIX_CHARSET, WALLET_ADDRESS_LEN, WALLET_TYPES,
};
use crate::errors::AirdropError;
use crate::state::NewAnalyticsEvent;
use crate::store::AirdropStore;

/// Format gate only: exact length and base58 alphabet. Ownership is never
/// verified.
pub fn is_valid_wallet_address(wallet: &str) -> bool {
    wallet.len() == WALLET_ADDRESS_LEN && wallet.chars().all(|c| BASE58_ALPHABET.contains(c))
}

pub fn verify_wallet_address(wallet: &str, err: AirdropError) -> Result<(), AirdropError> {
    require!(is_valid_wallet_address(wallet), err);
    Ok(())
}

/// Canonical (lower-cased) wallet type, if supported.
pub fn normalize_wallet_type(wallet_type: &str) -> Option<&'static str> {
    WALLET_TYPES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(wallet_type.trim()))
}

pub fn is_valid_referral_code(code: &str) -> bool {
    (REFERRAL_CODE_MIN_LEN..=REFERRAL_CODE_MAX_LEN).contains(&code.chars().count())
}

/// `REGRET-` followed by the first hex characters of SHA-256(wallet).
pub fn derive_referral_code(wallet: &str) -> String {
    let digest = hex::encode_upper(Sha256::digest(wallet.as_bytes()));
    format!(
        "{REFERRAL_CODE_PREFIX}-{}",
        &digest[..REFERRAL_CODE_FRAGMENT_LEN]
    )
}

/// Collision fallback: random suffix from `[A-Z0-9]`.
pub fn random_referral_code<R: Rng>(rng: &mut R) -> String {
    let suffix: String = (0..REFERRAL_CODE_FRAGMENT_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..REFERRAL_CODE_SUFFIX_CHARSET.len());
            char::from(REFERRAL_CODE_SUFFIX_CHARSET[idx])
        })
        .collect();
    format!("{REFERRAL_CODE_PREFIX}-{suffix}")
}

/// Trimmed, non-empty value of a required field.
pub fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Trims free-text metadata and truncates it to `max_chars`. Blank input
/// becomes `None`.
pub fn sanitize(value: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

/// Wallet prefix for log lines.
pub fn short_wallet(wallet: &str) -> String {
    let prefix: String = wallet.chars().take(8).collect();
    format!("{prefix}...")
}

/// Head and tail of a wallet for admin listings: `7xKXtg2C...uJosgAsU`.
pub fn mask_wallet(wallet: &str) -> String {
    let len = wallet.chars().count();
    if len <= 16 {
        return short_wallet(wallet);
    }
    let head: String = wallet.chars().take(8).collect();
    let tail: String = wallet.chars().skip(len - 8).collect();
    format!("{head}...{tail}")
}

/// Whole days from `now` until midnight UTC of the launch date, rounded up and
/// never negative.
pub fn days_until(launch: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = (launch - now).num_seconds();
    if remaining <= 0 {
        return 0;
    }
    (remaining + 86_399) / 86_400
}

/// Analytics rows are best effort; a failure is logged and dropped.
pub async fn record_event(store: &dyn AirdropStore, event: NewAnalyticsEvent) {
    if let Err(err) = store.record_event(&event).await {
        warn!(event = event.event_name, error = %err, "failed to record analytics event");
    }
}
