//! Process-local store with the same constraints and transaction semantics
//! as the Postgres schema. Used when no database URL is configured and by
//! the test suite.
//!
//! A transaction holds the state lock from `begin` until commit, rollback or
//! drop, so transactions are fully serialized. Calling a non-transactional
//! method while holding an open transaction on the same store deadlocks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{constraints, AirdropStore, DashboardWindow, PurgeCutoff, StoreTx};
use crate::clock::DayWindow;
use crate::constants::GLOBAL_STATS_ID;
use crate::errors::{StoreError, StoreResult};
use crate::state::{
    AnalyticsEvent, Credit, DashboardSnapshot, DatabaseInfo, GlobalStats, NewAnalyticsEvent,
    NewParticipant, NewReferral, NewWheelSpin, Participant, PurgeReport, Referral,
    ReferralSummary, ReferredParticipant, SessionActivity, SpinSummary, StatsDelta, TableCounts,
    UserGrowth, WalletTypeCount, WheelSpin,
};

#[derive(Debug, Clone, Default)]
struct Sequences {
    participant: i64,
    referral: i64,
    wheel_spin: i64,
    analytics_event: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    participants: Vec<Participant>,
    referrals: Vec<Referral>,
    wheel_spins: Vec<WheelSpin>,
    analytics_events: Vec<AnalyticsEvent>,
    global_stats: Option<GlobalStats>,
    seq: Sequences,
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Interpolated median of sorted values, as `PERCENTILE_CONT(0.5)`.
fn median(sorted: &[i64]) -> Option<f64> {
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[mid] as f64),
        _ => Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0),
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_owned(),
    }
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation {
        constraint: constraint.to_owned(),
    }
}

impl MemoryState {
    fn participant(&self, wallet: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.wallet_address == wallet)
    }

    fn participant_mut(&mut self, wallet: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.wallet_address == wallet)
    }

    fn insert_participant(&mut self, new: &NewParticipant) -> StoreResult<Participant> {
        if self.participant(&new.wallet_address).is_some() {
            return Err(unique(constraints::PARTICIPANT_WALLET));
        }
        if self
            .participants
            .iter()
            .any(|p| p.referral_code == new.referral_code)
        {
            return Err(unique(constraints::PARTICIPANT_REFERRAL_CODE));
        }
        let row = Participant {
            id: next(&mut self.seq.participant),
            wallet_address: new.wallet_address.clone(),
            wallet_type: new.wallet_type.clone(),
            referral_code: new.referral_code.clone(),
            tokens: NewParticipant::INITIAL_TOKENS,
            total_spins: 0,
            last_spin: None,
            referral_count: 0,
            referral_earned: 0,
            session_id: new.session_id.clone(),
            user_agent: new.user_agent.clone(),
            referrer: new.referrer.clone(),
            utm_source: new.utm_source.clone(),
            utm_medium: new.utm_medium.clone(),
            utm_campaign: new.utm_campaign.clone(),
            registered_at: new.registered_at,
            last_active: new.registered_at,
        };
        self.participants.push(row.clone());
        Ok(row)
    }

    fn credit(&mut self, wallet: &str, credit: Credit, at: DateTime<Utc>) -> Option<i64> {
        let p = self.participant_mut(wallet)?;
        p.tokens += credit.amount();
        match credit {
            Credit::Referral { amount } => {
                p.referral_count += 1;
                p.referral_earned += amount;
            }
            Credit::Spin { day, .. } => {
                p.total_spins += 1;
                p.last_spin = Some(day);
                p.last_active = at;
            }
        }
        Some(p.tokens)
    }

    fn insert_referral(&mut self, new: &NewReferral) -> StoreResult<Referral> {
        if self.participant(&new.referrer_wallet).is_none() {
            return Err(foreign_key(constraints::REFERRAL_REFERRER_FK));
        }
        if self.participant(&new.referred_wallet).is_none() {
            return Err(foreign_key(constraints::REFERRAL_REFERRED_FK));
        }
        if self
            .referrals
            .iter()
            .any(|r| r.referred_wallet == new.referred_wallet)
        {
            return Err(unique(constraints::REFERRAL_REFERRED_WALLET));
        }
        let row = Referral {
            id: next(&mut self.seq.referral),
            referrer_wallet: new.referrer_wallet.clone(),
            referred_wallet: new.referred_wallet.clone(),
            referral_code: new.referral_code.clone(),
            tokens_awarded: NewReferral::TOKENS_AWARDED,
            created_at: new.created_at,
        };
        self.referrals.push(row.clone());
        Ok(row)
    }

    fn insert_wheel_spin(&mut self, new: &NewWheelSpin) -> StoreResult<WheelSpin> {
        if self.participant(&new.wallet_address).is_none() {
            return Err(foreign_key(constraints::WHEEL_SPIN_WALLET_FK));
        }
        if self
            .wheel_spins
            .iter()
            .any(|s| s.wallet_address == new.wallet_address && s.spin_date == new.spin_date)
        {
            return Err(unique(constraints::WHEEL_SPIN_WALLET_DAY));
        }
        let row = WheelSpin {
            id: next(&mut self.seq.wheel_spin),
            wallet_address: new.wallet_address.clone(),
            prize_amount: new.prize_amount,
            spin_date: new.spin_date,
            created_at: new.created_at,
        };
        self.wheel_spins.push(row.clone());
        Ok(row)
    }

    fn stats_mut(&mut self, at: DateTime<Utc>) -> &mut GlobalStats {
        self.global_stats
            .get_or_insert_with(|| GlobalStats::empty(GLOBAL_STATS_ID, at))
    }

    fn rebuild_stats(&mut self, today: DayWindow, at: DateTime<Utc>) -> GlobalStats {
        let rebuilt = GlobalStats {
            id: GLOBAL_STATS_ID,
            total_participants: self.participants.len() as i64,
            tokens_reserved: self.participants.iter().map(|p| p.tokens).sum(),
            participants_today: self
                .participants
                .iter()
                .filter(|p| p.registered_at >= today.start && p.registered_at < today.end)
                .count() as i64,
            total_spins: self.participants.iter().map(|p| p.total_spins).sum(),
            updated_at: at,
        };
        self.global_stats = Some(rebuilt.clone());
        rebuilt
    }

    fn purge_before(&mut self, cutoff: PurgeCutoff) -> PurgeReport {
        let events_before = self.analytics_events.len();
        self.analytics_events.retain(|e| e.created_at >= cutoff.before);

        let referrers: Vec<String> = self
            .referrals
            .iter()
            .map(|r| r.referrer_wallet.clone())
            .collect();
        let spins_before = self.wheel_spins.len();
        self.wheel_spins
            .retain(|s| s.spin_date >= cutoff.before_day || referrers.contains(&s.wallet_address));

        PurgeReport {
            deleted_analytics_events: (events_before - self.analytics_events.len()) as u64,
            deleted_wheel_spins: (spins_before - self.wheel_spins.len()) as u64,
        }
    }

    fn dashboard(&self, window: DashboardWindow) -> DashboardSnapshot {
        let users = UserGrowth {
            total: self.participants.len() as i64,
            period_new: self
                .participants
                .iter()
                .filter(|p| p.registered_at >= window.since)
                .count() as i64,
            period_active: self
                .participants
                .iter()
                .filter(|p| p.last_active >= window.since)
                .count() as i64,
        };

        let mut prizes: Vec<i64> = self.wheel_spins.iter().map(|s| s.prize_amount).collect();
        prizes.sort_unstable();
        let spins = SpinSummary {
            total_spins: prizes.len() as i64,
            period_spins: self
                .wheel_spins
                .iter()
                .filter(|s| s.spin_date >= window.since_day)
                .count() as i64,
            average_prize: mean(&prizes),
            median_prize: median(&prizes),
            min_prize: prizes.first().copied(),
            max_prize: prizes.last().copied(),
        };

        let awarded: Vec<i64> = self.referrals.iter().map(|r| r.tokens_awarded).collect();
        let referrals = ReferralSummary {
            total_referrals: awarded.len() as i64,
            period_referrals: self
                .referrals
                .iter()
                .filter(|r| r.created_at >= window.since)
                .count() as i64,
            total_tokens_awarded: awarded.iter().sum(),
            average_per_referral: mean(&awarded),
        };

        let mut top_referrers: Vec<Participant> = self
            .participants
            .iter()
            .filter(|p| p.referral_count > 0)
            .cloned()
            .collect();
        top_referrers.sort_by(|a, b| {
            b.referral_earned
                .cmp(&a.referral_earned)
                .then(a.id.cmp(&b.id))
        });
        top_referrers.truncate(usize::try_from(window.top_referrers).unwrap_or(0));

        let mut wallet_types: Vec<WalletTypeCount> = Vec::new();
        for p in &self.participants {
            match wallet_types
                .iter_mut()
                .find(|w| w.wallet_type == p.wallet_type)
            {
                Some(entry) => entry.count += 1,
                None => wallet_types.push(WalletTypeCount {
                    wallet_type: p.wallet_type.clone(),
                    count: 1,
                }),
            }
        }
        wallet_types.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.wallet_type.cmp(&b.wallet_type))
        });

        let mut recent_registrations = self.participants.clone();
        recent_registrations.sort_by(|a, b| {
            b.registered_at
                .cmp(&a.registered_at)
                .then(b.id.cmp(&a.id))
        });
        recent_registrations.truncate(usize::try_from(window.recent_registrations).unwrap_or(0));

        let active: Vec<&Participant> = self
            .participants
            .iter()
            .filter(|p| p.last_active >= window.active_since)
            .collect();
        let sessions = SessionActivity {
            active_sessions: active
                .iter()
                .filter_map(|p| p.session_id.as_deref())
                .collect::<HashSet<_>>()
                .len() as i64,
            unique_users: active.len() as i64,
            last_activity: active.iter().map(|p| p.last_active).max(),
        };

        DashboardSnapshot {
            stats: self.global_stats.clone(),
            users,
            spins,
            referrals,
            top_referrers,
            wallet_types,
            recent_registrations,
            sessions,
        }
    }

    fn reset(&mut self, at: DateTime<Utc>) {
        *self = MemoryState {
            global_stats: Some(GlobalStats::empty(GLOBAL_STATS_ID, at)),
            ..MemoryState::default()
        };
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with a zeroed stats row.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.reset(Utc::now());
        Self {
            state: Arc::new(Mutex::new(state)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// While unavailable every operation fails as if the pool timed out.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::PoolTimeout)
        }
    }

    async fn read(&self) -> StoreResult<tokio::sync::MutexGuard<'_, MemoryState>> {
        self.check_available()?;
        Ok(self.state.lock().await)
    }
}

#[async_trait]
impl AirdropStore for MemoryStore {
    async fn find_by_wallet(&self, wallet: &str) -> StoreResult<Option<Participant>> {
        Ok(self.read().await?.participant(wallet).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<Participant>> {
        let state = self.read().await?;
        Ok(state
            .participants
            .iter()
            .find(|p| p.referral_code == code)
            .cloned())
    }

    async fn touch_activity(
        &self,
        wallet: &str,
        session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.read().await?;
        if let Some(p) = state.participant_mut(wallet) {
            p.last_active = at;
            if let Some(session_id) = session_id {
                p.session_id = Some(session_id.to_owned());
            }
        }
        Ok(())
    }

    async fn find_referral_of(&self, referred_wallet: &str) -> StoreResult<Option<Referral>> {
        let state = self.read().await?;
        Ok(state
            .referrals
            .iter()
            .find(|r| r.referred_wallet == referred_wallet)
            .cloned())
    }

    async fn find_spin_on(&self, wallet: &str, day: NaiveDate) -> StoreResult<Option<WheelSpin>> {
        let state = self.read().await?;
        Ok(state
            .wheel_spins
            .iter()
            .find(|s| s.wallet_address == wallet && s.spin_date == day)
            .cloned())
    }

    async fn referrals_by_referrer(
        &self,
        referrer_wallet: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ReferredParticipant>> {
        let state = self.read().await?;
        let mut edges: Vec<&Referral> = state
            .referrals
            .iter()
            .filter(|r| r.referrer_wallet == referrer_wallet)
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let rows = edges
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|r| {
                let referred = state.participant(&r.referred_wallet)?;
                Some(ReferredParticipant {
                    referred_wallet: r.referred_wallet.clone(),
                    tokens_awarded: r.tokens_awarded,
                    referred_at: r.created_at,
                    wallet_type: referred.wallet_type.clone(),
                    referred_tokens: referred.tokens,
                    referred_total_spins: referred.total_spins,
                })
            })
            .collect();
        Ok(rows)
    }

    async fn count_referrals_by_referrer(&self, referrer_wallet: &str) -> StoreResult<i64> {
        let state = self.read().await?;
        Ok(state
            .referrals
            .iter()
            .filter(|r| r.referrer_wallet == referrer_wallet)
            .count() as i64)
    }

    async fn global_stats(&self) -> StoreResult<Option<GlobalStats>> {
        Ok(self.read().await?.global_stats.clone())
    }

    async fn count_registrations_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let state = self.read().await?;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.registered_at >= from && p.registered_at < to)
            .count() as i64)
    }

    async fn record_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()> {
        let mut state = self.read().await?;
        let id = next(&mut state.seq.analytics_event);
        state.analytics_events.push(AnalyticsEvent {
            id,
            event_name: event.event_name.to_owned(),
            session_id: event.session_id.clone(),
            wallet_address: event.wallet_address.clone(),
            event_data: Some(event.event_data.clone()),
            user_agent: event.user_agent.clone(),
            referrer: event.referrer.clone(),
            created_at: event.created_at,
        });
        Ok(())
    }

    async fn table_counts(&self) -> StoreResult<TableCounts> {
        let state = self.read().await?;
        Ok(TableCounts {
            participants: state.participants.len() as i64,
            referrals: state.referrals.len() as i64,
            wheel_spins: state.wheel_spins.len() as i64,
            analytics_events: state.analytics_events.len() as i64,
            global_stats: i64::from(state.global_stats.is_some()),
        })
    }

    async fn dashboard(&self, window: DashboardWindow) -> StoreResult<DashboardSnapshot> {
        Ok(self.read().await?.dashboard(window))
    }

    async fn ping(&self) -> StoreResult<DatabaseInfo> {
        self.check_available()?;
        Ok(DatabaseInfo {
            server_time: Utc::now(),
            version: format!("in-memory {}", env!("CARGO_PKG_VERSION")),
        })
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        self.check_available()?;
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            work,
        }))
    }
}

/// Writes go to `work`; commit copies it back under the held lock.
pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    work: MemoryState,
}

impl MemoryTx {
    fn state(&mut self) -> StoreResult<&mut MemoryState> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.work)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn referral_code_taken(&mut self, code: &str) -> StoreResult<bool> {
        Ok(self
            .state()?
            .participants
            .iter()
            .any(|p| p.referral_code == code))
    }

    async fn insert_participant(&mut self, new: &NewParticipant) -> StoreResult<Participant> {
        self.state()?.insert_participant(new)
    }

    async fn credit_tokens(
        &mut self,
        wallet: &str,
        credit: Credit,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        Ok(self.state()?.credit(wallet, credit, at))
    }

    async fn insert_referral(&mut self, new: &NewReferral) -> StoreResult<Referral> {
        self.state()?.insert_referral(new)
    }

    async fn insert_wheel_spin(&mut self, new: &NewWheelSpin) -> StoreResult<WheelSpin> {
        self.state()?.insert_wheel_spin(new)
    }

    async fn increment_stats(
        &mut self,
        delta: StatsDelta,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats> {
        let stats = self.state()?.stats_mut(at);
        stats.apply(&delta, at);
        Ok(stats.clone())
    }

    async fn rebuild_stats(
        &mut self,
        today: DayWindow,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats> {
        Ok(self.state()?.rebuild_stats(today, at))
    }

    async fn purge_before(&mut self, cutoff: PurgeCutoff) -> StoreResult<PurgeReport> {
        Ok(self.state()?.purge_before(cutoff))
    }

    async fn reset_all(&mut self, at: DateTime<Utc>) -> StoreResult<()> {
        self.state()?.reset(at);
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.guard.take().ok_or(StoreError::TransactionClosed)?;
        self.work = MemoryState::default();
        Ok(())
    }
}
