use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use tracing::debug;

use crate::constants::{REFERRALS_DEFAULT_LIMIT, REFERRALS_MAX_LIMIT};
use crate::contexts::{
    ApiResponse, Pagination, ReferralEntry, ReferralStats, ReferralsQuery, WalletReferralsData,
};
use crate::errors::AirdropError;
use crate::instructions::utils::{required, short_wallet, verify_wallet_address};
use crate::AppState;

/// Parses `limit`; zero or garbage means the default, then clamps to the
/// allowed range.
pub fn parse_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|&v| v != 0)
        .unwrap_or(REFERRALS_DEFAULT_LIMIT)
        .clamp(1, REFERRALS_MAX_LIMIT)
}

pub fn parse_offset(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0)
        .max(0)
}

/// Paginated list of a wallet's successful referrals with its own referral
/// totals.
pub async fn process(
    app: &AppState,
    query: ReferralsQuery,
) -> Result<WalletReferralsData, AirdropError> {
    let wallet = required(query.wallet.as_deref())
        .ok_or(AirdropError::MissingWallet)?
        .to_owned();
    verify_wallet_address(&wallet, AirdropError::InvalidAddress)?;
    let limit = parse_limit(query.limit.as_deref());
    let offset = parse_offset(query.offset.as_deref());

    let participant = app
        .store
        .find_by_wallet(&wallet)
        .await?
        .ok_or(AirdropError::WalletNotFound)?;
    let rows = app
        .store
        .referrals_by_referrer(&wallet, limit, offset)
        .await?;
    let total = app.store.count_referrals_by_referrer(&wallet).await?;

    let average = if total > 0 {
        (participant.referral_earned as f64 / total as f64).round() as i64
    } else {
        0
    };

    debug!(wallet = %short_wallet(&wallet), total, limit, offset, "listed referrals");

    Ok(WalletReferralsData {
        wallet,
        referral_code: participant.referral_code,
        referral_stats: ReferralStats {
            total_referrals: participant.referral_count,
            successful_referrals: total,
            total_earned: participant.referral_earned,
            current_tokens: participant.tokens,
            average_earnings_per_referral: average,
        },
        referrals: rows.into_iter().map(ReferralEntry::from).collect(),
        pagination: Pagination::new(limit, offset, total),
        registered_at: participant.registered_at,
        last_active: participant.last_active,
        timestamp: app.clock.now(),
    })
}

pub async fn handler(
    State(app): State<AppState>,
    query: Result<Query<ReferralsQuery>, QueryRejection>,
) -> Result<ApiResponse<WalletReferralsData>, AirdropError> {
    let Query(query) = query?;
    process(&app, query).await.map(ApiResponse::ok)
}
