use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::ReferredParticipant;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReferralRequest {
    pub referrer_wallet: Option<String>,
    pub referred_wallet: Option<String>,
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReferralData {
    pub awarded_tokens: i64,
    pub referrer_new_tokens: i64,
}

/// Query of `GET /referrals/wallet`. Paging values are kept as raw strings
/// and parsed leniently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferralsQuery {
    pub wallet: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEntry {
    pub referred_wallet: String,
    pub tokens_awarded: i64,
    pub referred_at: DateTime<Utc>,
    pub referred_wallet_type: String,
    pub referred_current_tokens: i64,
    pub referred_total_spins: i64,
}

impl From<ReferredParticipant> for ReferralEntry {
    fn from(row: ReferredParticipant) -> Self {
        Self {
            referred_wallet: row.referred_wallet,
            tokens_awarded: row.tokens_awarded,
            referred_at: row.referred_at,
            referred_wallet_type: row.wallet_type,
            referred_current_tokens: row.referred_tokens,
            referred_total_spins: row.referred_total_spins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total_referrals: i64,
    pub successful_referrals: i64,
    pub total_earned: i64,
    pub current_tokens: i64,
    /// Rounded to whole tokens; zero with no referrals.
    pub average_earnings_per_referral: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
    pub has_more: bool,
    pub pages: i64,
    pub current_page: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64, total: i64) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            offset,
            total,
            has_more: offset.saturating_add(limit) < total,
            pages: total.max(0).saturating_add(limit - 1) / limit,
            current_page: (offset / limit).saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReferralsData {
    pub wallet: String,
    pub referral_code: String,
    pub referral_stats: ReferralStats,
    pub referrals: Vec<ReferralEntry>,
    pub pagination: Pagination,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupQuery {
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupData {
    pub referrer_wallet: String,
    pub referral_code: String,
}
