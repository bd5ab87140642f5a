use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use crate::constants::{REFERRAL_REWARD, SIGNUP_BONUS};

/// One registered wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Participant {
    pub id: i64,
    pub wallet_address: String,
    pub wallet_type: String,
    pub referral_code: String,
    pub tokens: i64,
    pub total_spins: i64,
    /// Calendar day of the most recent spin.
    pub last_spin: Option<NaiveDate>,
    pub referral_count: i64,
    pub referral_earned: i64,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub wallet_address: String,
    pub wallet_type: String,
    pub referral_code: String,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl NewParticipant {
    pub const INITIAL_TOKENS: i64 = SIGNUP_BONUS;
}

/// Referrer -> referred edge. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Referral {
    pub id: i64,
    pub referrer_wallet: String,
    pub referred_wallet: String,
    pub referral_code: String,
    pub tokens_awarded: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_wallet: String,
    pub referred_wallet: String,
    pub referral_code: String,
    pub created_at: DateTime<Utc>,
}

impl NewReferral {
    pub const TOKENS_AWARDED: i64 = REFERRAL_REWARD;
}

/// A referral joined with the referred participant, for listings.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReferredParticipant {
    pub referred_wallet: String,
    pub tokens_awarded: i64,
    pub referred_at: DateTime<Utc>,
    pub wallet_type: String,
    pub referred_tokens: i64,
    pub referred_total_spins: i64,
}

/// One prize draw; at most one per (wallet, spin_date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct WheelSpin {
    pub id: i64,
    pub wallet_address: String,
    pub prize_amount: i64,
    pub spin_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWheelSpin {
    pub wallet_address: String,
    pub prize_amount: i64,
    pub spin_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Singleton rollup row (id = 1), maintained incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct GlobalStats {
    pub id: i32,
    pub total_participants: i64,
    pub tokens_reserved: i64,
    pub participants_today: i64,
    pub total_spins: i64,
    pub updated_at: DateTime<Utc>,
}

impl GlobalStats {
    pub fn empty(id: i32, at: DateTime<Utc>) -> Self {
        Self {
            id,
            total_participants: 0,
            tokens_reserved: 0,
            participants_today: 0,
            total_spins: 0,
            updated_at: at,
        }
    }

    pub fn apply(&mut self, delta: &StatsDelta, at: DateTime<Utc>) {
        self.total_participants += delta.participants;
        self.tokens_reserved += delta.tokens_reserved;
        self.participants_today += delta.participants_today;
        self.total_spins += delta.spins;
        self.updated_at = at;
    }
}

/// Increment applied to `GlobalStats` in the same transaction as the event
/// that caused it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub participants: i64,
    pub tokens_reserved: i64,
    pub participants_today: i64,
    pub spins: i64,
}

impl StatsDelta {
    pub fn registration() -> Self {
        Self {
            participants: 1,
            tokens_reserved: SIGNUP_BONUS,
            participants_today: 1,
            spins: 0,
        }
    }

    pub fn referral() -> Self {
        Self {
            tokens_reserved: REFERRAL_REWARD,
            ..Self::default()
        }
    }

    pub fn spin(prize: i64) -> Self {
        Self {
            tokens_reserved: prize,
            spins: 1,
            ..Self::default()
        }
    }
}

/// Balance credit; each kind also bumps its own counters in the same
/// statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    Referral { amount: i64 },
    Spin { amount: i64, day: NaiveDate },
}

impl Credit {
    pub fn amount(&self) -> i64 {
        match self {
            Credit::Referral { amount } | Credit::Spin { amount, .. } => *amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub event_name: String,
    pub session_id: Option<String>,
    pub wallet_address: Option<String>,
    pub event_data: Option<Value>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnalyticsEvent {
    pub event_name: &'static str,
    pub session_id: Option<String>,
    pub wallet_address: Option<String>,
    pub event_data: Value,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row counts per table, for the admin health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCounts {
    pub participants: i64,
    pub referrals: i64,
    pub wheel_spins: i64,
    pub analytics_events: i64,
    pub global_stats: i64,
}

/// Deletions performed by a retention purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub deleted_analytics_events: u64,
    pub deleted_wheel_spins: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub server_time: DateTime<Utc>,
    pub version: String,
}

/// Participant counts for an admin dashboard period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct UserGrowth {
    pub total: i64,
    /// Registered since the period start.
    pub period_new: i64,
    /// Active since the period start.
    pub period_active: i64,
}

/// Spin aggregates over every stored spin; `period_spins` counts spins dated
/// on or after the period's first day. Prize figures are `None` with no spins.
#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow)]
pub struct SpinSummary {
    pub total_spins: i64,
    pub period_spins: i64,
    pub average_prize: Option<f64>,
    pub median_prize: Option<f64>,
    pub min_prize: Option<i64>,
    pub max_prize: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow)]
pub struct ReferralSummary {
    pub total_referrals: i64,
    pub period_referrals: i64,
    pub total_tokens_awarded: i64,
    pub average_per_referral: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct WalletTypeCount {
    pub wallet_type: String,
    pub count: i64,
}

/// Activity inside the recent-session window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct SessionActivity {
    pub active_sessions: i64,
    pub unique_users: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Everything the admin dashboard reads, gathered in one store call.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub stats: Option<GlobalStats>,
    pub users: UserGrowth,
    pub spins: SpinSummary,
    pub referrals: ReferralSummary,
    /// Wallets with at least one referral, best earners first.
    pub top_referrers: Vec<Participant>,
    /// Most common type first.
    pub wallet_types: Vec<WalletTypeCount>,
    /// Newest first.
    pub recent_registrations: Vec<Participant>,
    pub sessions: SessionActivity,
}
