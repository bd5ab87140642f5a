//! Storage seam. Reads and best-effort writes live on [`AirdropStore`];
//! every mutation that must be atomic goes through a [`StoreTx`] obtained
//! from [`AirdropStore::begin`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::clock::DayWindow;
use crate::errors::{StoreError, StoreResult};
use crate::state::{
    Credit, DashboardSnapshot, DatabaseInfo, GlobalStats, NewAnalyticsEvent, NewParticipant,
    NewReferral, NewWheelSpin, Participant, PurgeReport, Referral, ReferredParticipant, StatsDelta,
    TableCounts, WheelSpin,
};

pub mod memory;
pub mod postgres;
mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Constraint names shared by both backends.
pub mod constraints {
    pub const PARTICIPANT_WALLET: &str = "participants_wallet_address_key";
    pub const PARTICIPANT_REFERRAL_CODE: &str = "participants_referral_code_key";
    pub const REFERRAL_REFERRED_WALLET: &str = "referrals_referred_wallet_key";
    pub const REFERRAL_REFERRER_FK: &str = "referrals_referrer_wallet_fkey";
    pub const REFERRAL_REFERRED_FK: &str = "referrals_referred_wallet_fkey";
    pub const WHEEL_SPIN_WALLET_DAY: &str = "wheel_spins_wallet_day_key";
    pub const WHEEL_SPIN_WALLET_FK: &str = "wheel_spins_wallet_address_fkey";
}

/// Retention cutoff for an admin purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeCutoff {
    /// Analytics events created before this instant are deleted.
    pub before: DateTime<Utc>,
    /// Wheel spins dated before this day are deleted, unless the wallet is a
    /// referrer.
    pub before_day: NaiveDate,
}

/// Time bounds and list sizes for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardWindow {
    /// Registrations, activity and referrals at or after this instant count
    /// toward the period.
    pub since: DateTime<Utc>,
    /// Spins dated on or after this day count toward the period.
    pub since_day: NaiveDate,
    /// Start of the recent-session window.
    pub active_since: DateTime<Utc>,
    pub top_referrers: i64,
    pub recent_registrations: i64,
}

#[async_trait]
pub trait AirdropStore: Send + Sync {
    async fn find_by_wallet(&self, wallet: &str) -> StoreResult<Option<Participant>>;

    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<Participant>>;

    /// Updates last-active and session id. Callers treat failure as non-fatal.
    async fn touch_activity(
        &self,
        wallet: &str,
        session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn find_referral_of(&self, referred_wallet: &str) -> StoreResult<Option<Referral>>;

    async fn find_spin_on(&self, wallet: &str, day: NaiveDate) -> StoreResult<Option<WheelSpin>>;

    /// Newest first.
    async fn referrals_by_referrer(
        &self,
        referrer_wallet: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ReferredParticipant>>;

    async fn count_referrals_by_referrer(&self, referrer_wallet: &str) -> StoreResult<i64>;

    async fn global_stats(&self) -> StoreResult<Option<GlobalStats>>;

    async fn count_registrations_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<i64>;

    async fn record_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()>;

    async fn table_counts(&self) -> StoreResult<TableCounts>;

    async fn dashboard(&self, window: DashboardWindow) -> StoreResult<DashboardSnapshot>;

    async fn ping(&self) -> StoreResult<DatabaseInfo>;

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One open transaction. Dropping it without [`StoreTx::commit`] discards
/// every write made through it.
#[async_trait]
pub trait StoreTx: Send {
    async fn referral_code_taken(&mut self, code: &str) -> StoreResult<bool>;

    /// Inserts with the signup balance. A taken wallet or code surfaces as
    /// `UniqueViolation` on the matching constraint.
    async fn insert_participant(&mut self, new: &NewParticipant) -> StoreResult<Participant>;

    /// Adds to the balance and the counters tied to the credit kind in one
    /// statement. Returns the new balance, or `None` if the wallet is gone.
    async fn credit_tokens(
        &mut self,
        wallet: &str,
        credit: Credit,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<i64>>;

    async fn insert_referral(&mut self, new: &NewReferral) -> StoreResult<Referral>;

    async fn insert_wheel_spin(&mut self, new: &NewWheelSpin) -> StoreResult<WheelSpin>;

    async fn increment_stats(
        &mut self,
        delta: StatsDelta,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats>;

    /// Recomputes the stats row from the source tables.
    async fn rebuild_stats(
        &mut self,
        today: DayWindow,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats>;

    async fn purge_before(&mut self, cutoff: PurgeCutoff) -> StoreResult<PurgeReport>;

    /// Empties every table and zeroes the stats row.
    async fn reset_all(&mut self, at: DateTime<Utc>) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

/// Commits on `Ok`, rolls back on `Err`. A failed rollback is logged and the
/// caller's error is returned unchanged.
pub async fn settle<T, E>(mut tx: Box<dyn StoreTx>, outcome: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError>,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
