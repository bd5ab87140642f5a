use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AirdropError;

/// Query of `GET /admin/dashboard`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    pub period: Option<String>,
    #[serde(alias = "admin_token")]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardPeriod {
    Day,
    Week,
    Month,
}

impl DashboardPeriod {
    /// Case-insensitive; a missing or blank value means `day`.
    pub fn parse(raw: Option<&str>) -> Result<Self, AirdropError> {
        match raw.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(DashboardPeriod::Day),
            Some(v) if v.eq_ignore_ascii_case("day") => Ok(DashboardPeriod::Day),
            Some(v) if v.eq_ignore_ascii_case("week") => Ok(DashboardPeriod::Week),
            Some(v) if v.eq_ignore_ascii_case("month") => Ok(DashboardPeriod::Month),
            Some(_) => Err(AirdropError::InvalidPeriod),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DashboardPeriod::Day => "day",
            DashboardPeriod::Week => "week",
            DashboardPeriod::Month => "month",
        }
    }

    pub fn lookback(self) -> Duration {
        match self {
            DashboardPeriod::Day => Duration::hours(24),
            DashboardPeriod::Week => Duration::days(7),
            DashboardPeriod::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_participants: i64,
    pub tokens_reserved: i64,
    pub participants_today: i64,
    pub total_spins: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub total: i64,
    pub period_new: i64,
    pub period_active: i64,
    /// Period-active share of all participants, percent with two decimals.
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinMetrics {
    pub total_spins: i64,
    pub period_spins: i64,
    pub average_prize: i64,
    pub median_prize: i64,
    pub min_prize: i64,
    pub max_prize: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralMetrics {
    pub total_referrals: i64,
    pub period_referrals: i64,
    pub total_tokens_awarded: i64,
    pub average_per_referral: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopReferrer {
    pub wallet: String,
    pub referrals: i64,
    pub earned: i64,
    pub total_tokens: i64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletShare {
    #[serde(rename = "type")]
    pub wallet_type: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRegistration {
    pub wallet: String,
    pub wallet_type: String,
    pub registered_at: DateTime<Utc>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessions {
    pub active_sessions: i64,
    pub unique_users: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub timestamp: DateTime<Utc>,
    pub period: DashboardPeriod,
    pub overview: DashboardOverview,
    pub user_metrics: UserMetrics,
    pub spin_metrics: SpinMetrics,
    pub referral_metrics: ReferralMetrics,
    pub top_referrers: Vec<TopReferrer>,
    pub wallet_distribution: Vec<WalletShare>,
    pub recent_registrations: Vec<RecentRegistration>,
    pub active_sessions: ActiveSessions,
}
