use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use super::{schema, AirdropStore, DashboardWindow, PurgeCutoff, StoreTx};
use crate::clock::DayWindow;
use crate::config::Config;
use crate::constants::GLOBAL_STATS_ID;
use crate::errors::{StoreError, StoreResult};
use crate::state::{
    Credit, DashboardSnapshot, DatabaseInfo, GlobalStats, NewAnalyticsEvent, NewParticipant,
    NewReferral, NewWheelSpin, Participant, PurgeReport, Referral, ReferralSummary,
    ReferredParticipant, SessionActivity, SpinSummary, StatsDelta, TableCounts, UserGrowth,
    WalletTypeCount, WheelSpin,
};

const PARTICIPANT_COLUMNS: &str = "id, wallet_address, wallet_type, referral_code, tokens, \
     total_spins, last_spin, referral_count, referral_earned, session_id, user_agent, referrer, \
     utm_source, utm_medium, utm_campaign, registered_at, last_active";

const STATS_COLUMNS: &str =
    "id, total_participants, tokens_reserved, participants_today, total_spins, updated_at";

/// Postgres-backed store over a bounded connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, config: &Config) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.db_acquire_timeout)
            .idle_timeout(config.db_idle_timeout)
            .connect(url)
            .await?;
        info!(
            max_connections = config.db_max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    /// Creates tables, indexes and the stats row if they are missing.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = schema::STATEMENTS.len(), "schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl AirdropStore for PgStore {
    async fn find_by_wallet(&self, wallet: &str) -> StoreResult<Option<Participant>> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE wallet_address = $1");
        let row = sqlx::query_as::<_, Participant>(&sql)
            .bind(wallet)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<Participant>> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE referral_code = $1");
        let row = sqlx::query_as::<_, Participant>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_activity(
        &self,
        wallet: &str,
        session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE participants SET last_active = $2, session_id = COALESCE($3, session_id) \
             WHERE wallet_address = $1",
        )
        .bind(wallet)
        .bind(at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_referral_of(&self, referred_wallet: &str) -> StoreResult<Option<Referral>> {
        let row = sqlx::query_as::<_, Referral>(
            "SELECT id, referrer_wallet, referred_wallet, referral_code, tokens_awarded, created_at \
             FROM referrals WHERE referred_wallet = $1",
        )
        .bind(referred_wallet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_spin_on(&self, wallet: &str, day: NaiveDate) -> StoreResult<Option<WheelSpin>> {
        let row = sqlx::query_as::<_, WheelSpin>(
            "SELECT id, wallet_address, prize_amount, spin_date, created_at \
             FROM wheel_spins WHERE wallet_address = $1 AND spin_date = $2",
        )
        .bind(wallet)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn referrals_by_referrer(
        &self,
        referrer_wallet: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ReferredParticipant>> {
        let rows = sqlx::query_as::<_, ReferredParticipant>(
            "SELECT r.referred_wallet, r.tokens_awarded, r.created_at AS referred_at, \
                    p.wallet_type, p.tokens AS referred_tokens, \
                    p.total_spins AS referred_total_spins \
             FROM referrals r \
             JOIN participants p ON p.wallet_address = r.referred_wallet \
             WHERE r.referrer_wallet = $1 \
             ORDER BY r.created_at DESC, r.id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(referrer_wallet)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_referrals_by_referrer(&self, referrer_wallet: &str) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_wallet = $1")
                .bind(referrer_wallet)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn global_stats(&self) -> StoreResult<Option<GlobalStats>> {
        let sql = format!("SELECT {STATS_COLUMNS} FROM global_stats WHERE id = $1");
        let row = sqlx::query_as::<_, GlobalStats>(&sql)
            .bind(GLOBAL_STATS_ID)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_registrations_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM participants WHERE registered_at >= $1 AND registered_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn record_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO analytics_events \
                (event_name, session_id, wallet_address, event_data, user_agent, referrer, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.event_name)
        .bind(event.session_id.as_deref())
        .bind(event.wallet_address.as_deref())
        .bind(sqlx::types::Json(&event.event_data))
        .bind(event.user_agent.as_deref())
        .bind(event.referrer.as_deref())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn table_counts(&self) -> StoreResult<TableCounts> {
        let (participants, referrals, wheel_spins, analytics_events, global_stats): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM participants), \
                    (SELECT COUNT(*) FROM referrals), \
                    (SELECT COUNT(*) FROM wheel_spins), \
                    (SELECT COUNT(*) FROM analytics_events), \
                    (SELECT COUNT(*) FROM global_stats)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(TableCounts {
            participants,
            referrals,
            wheel_spins,
            analytics_events,
            global_stats,
        })
    }

    async fn dashboard(&self, window: DashboardWindow) -> StoreResult<DashboardSnapshot> {
        let stats = self.global_stats().await?;

        let users = sqlx::query_as::<_, UserGrowth>(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE registered_at >= $1) AS period_new, \
                    COUNT(*) FILTER (WHERE last_active >= $1) AS period_active \
             FROM participants",
        )
        .bind(window.since)
        .fetch_one(&self.pool)
        .await?;

        let spins = sqlx::query_as::<_, SpinSummary>(
            "SELECT COUNT(*) AS total_spins, \
                    COUNT(*) FILTER (WHERE spin_date >= $1) AS period_spins, \
                    AVG(prize_amount)::FLOAT8 AS average_prize, \
                    PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY prize_amount) AS median_prize, \
                    MIN(prize_amount) AS min_prize, \
                    MAX(prize_amount) AS max_prize \
             FROM wheel_spins",
        )
        .bind(window.since_day)
        .fetch_one(&self.pool)
        .await?;

        let referrals = sqlx::query_as::<_, ReferralSummary>(
            "SELECT COUNT(*) AS total_referrals, \
                    COUNT(*) FILTER (WHERE created_at >= $1) AS period_referrals, \
                    COALESCE(SUM(tokens_awarded), 0)::BIGINT AS total_tokens_awarded, \
                    AVG(tokens_awarded)::FLOAT8 AS average_per_referral \
             FROM referrals",
        )
        .bind(window.since)
        .fetch_one(&self.pool)
        .await?;

        let top_sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE referral_count > 0 \
             ORDER BY referral_earned DESC, id ASC LIMIT $1"
        );
        let top_referrers = sqlx::query_as::<_, Participant>(&top_sql)
            .bind(window.top_referrers)
            .fetch_all(&self.pool)
            .await?;

        let wallet_types = sqlx::query_as::<_, WalletTypeCount>(
            "SELECT wallet_type, COUNT(*) AS count FROM participants \
             GROUP BY wallet_type ORDER BY count DESC, wallet_type ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let recent_sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants \
             ORDER BY registered_at DESC, id DESC LIMIT $1"
        );
        let recent_registrations = sqlx::query_as::<_, Participant>(&recent_sql)
            .bind(window.recent_registrations)
            .fetch_all(&self.pool)
            .await?;

        let sessions = sqlx::query_as::<_, SessionActivity>(
            "SELECT COUNT(DISTINCT session_id) AS active_sessions, \
                    COUNT(DISTINCT wallet_address) AS unique_users, \
                    MAX(last_active) AS last_activity \
             FROM participants WHERE last_active >= $1",
        )
        .bind(window.active_since)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardSnapshot {
            stats,
            users,
            spins,
            referrals,
            top_referrers,
            wallet_types,
            recent_registrations,
            sessions,
        })
    }

    async fn ping(&self) -> StoreResult<DatabaseInfo> {
        let (server_time, version): (DateTime<Utc>, String) =
            sqlx::query_as("SELECT NOW(), version()")
                .fetch_one(&self.pool)
                .await?;
        Ok(DatabaseInfo {
            server_time,
            version,
        })
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

/// Open Postgres transaction. `None` once committed or rolled back.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn referral_code_taken(&mut self, code: &str) -> StoreResult<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM participants WHERE referral_code = $1)")
                .bind(code)
                .fetch_one(self.conn()?)
                .await?;
        Ok(taken)
    }

    async fn insert_participant(&mut self, new: &NewParticipant) -> StoreResult<Participant> {
        let sql = format!(
            "INSERT INTO participants \
                (wallet_address, wallet_type, referral_code, tokens, session_id, user_agent, \
                 referrer, utm_source, utm_medium, utm_campaign, registered_at, last_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING {PARTICIPANT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Participant>(&sql)
            .bind(&new.wallet_address)
            .bind(&new.wallet_type)
            .bind(&new.referral_code)
            .bind(NewParticipant::INITIAL_TOKENS)
            .bind(new.session_id.as_deref())
            .bind(new.user_agent.as_deref())
            .bind(new.referrer.as_deref())
            .bind(new.utm_source.as_deref())
            .bind(new.utm_medium.as_deref())
            .bind(new.utm_campaign.as_deref())
            .bind(new.registered_at)
            .fetch_one(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn credit_tokens(
        &mut self,
        wallet: &str,
        credit: Credit,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let query = match credit {
            Credit::Referral { amount } => sqlx::query_scalar::<Postgres, i64>(
                "UPDATE participants \
                 SET tokens = tokens + $2, referral_count = referral_count + 1, \
                     referral_earned = referral_earned + $2 \
                 WHERE wallet_address = $1 RETURNING tokens",
            )
            .bind(wallet)
            .bind(amount),
            Credit::Spin { amount, day } => sqlx::query_scalar::<Postgres, i64>(
                "UPDATE participants \
                 SET tokens = tokens + $2, total_spins = total_spins + 1, \
                     last_spin = $3, last_active = $4 \
                 WHERE wallet_address = $1 RETURNING tokens",
            )
            .bind(wallet)
            .bind(amount)
            .bind(day)
            .bind(at),
        };
        let balance = query.fetch_optional(self.conn()?).await?;
        Ok(balance)
    }

    async fn insert_referral(&mut self, new: &NewReferral) -> StoreResult<Referral> {
        let row = sqlx::query_as::<_, Referral>(
            "INSERT INTO referrals \
                (referrer_wallet, referred_wallet, referral_code, tokens_awarded, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, referrer_wallet, referred_wallet, referral_code, tokens_awarded, created_at",
        )
        .bind(&new.referrer_wallet)
        .bind(&new.referred_wallet)
        .bind(&new.referral_code)
        .bind(NewReferral::TOKENS_AWARDED)
        .bind(new.created_at)
        .fetch_one(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn insert_wheel_spin(&mut self, new: &NewWheelSpin) -> StoreResult<WheelSpin> {
        let row = sqlx::query_as::<_, WheelSpin>(
            "INSERT INTO wheel_spins (wallet_address, prize_amount, spin_date, created_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, wallet_address, prize_amount, spin_date, created_at",
        )
        .bind(&new.wallet_address)
        .bind(new.prize_amount)
        .bind(new.spin_date)
        .bind(new.created_at)
        .fetch_one(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn increment_stats(
        &mut self,
        delta: StatsDelta,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats> {
        let sql = format!(
            "INSERT INTO global_stats ({STATS_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                total_participants = global_stats.total_participants + EXCLUDED.total_participants, \
                tokens_reserved = global_stats.tokens_reserved + EXCLUDED.tokens_reserved, \
                participants_today = global_stats.participants_today + EXCLUDED.participants_today, \
                total_spins = global_stats.total_spins + EXCLUDED.total_spins, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {STATS_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GlobalStats>(&sql)
            .bind(GLOBAL_STATS_ID)
            .bind(delta.participants)
            .bind(delta.tokens_reserved)
            .bind(delta.participants_today)
            .bind(delta.spins)
            .bind(at)
            .fetch_one(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn rebuild_stats(
        &mut self,
        today: DayWindow,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats> {
        let sql = format!(
            "WITH totals AS ( \
                SELECT COUNT(*)::BIGINT AS participants, \
                       COALESCE(SUM(tokens), 0)::BIGINT AS reserved, \
                       (COUNT(*) FILTER (WHERE registered_at >= $2 AND registered_at < $3))::BIGINT AS today, \
                       COALESCE(SUM(total_spins), 0)::BIGINT AS spins \
                FROM participants \
             ) \
             INSERT INTO global_stats ({STATS_COLUMNS}) \
             SELECT $1, participants, reserved, today, spins, $4 FROM totals \
             ON CONFLICT (id) DO UPDATE SET \
                total_participants = EXCLUDED.total_participants, \
                tokens_reserved = EXCLUDED.tokens_reserved, \
                participants_today = EXCLUDED.participants_today, \
                total_spins = EXCLUDED.total_spins, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {STATS_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GlobalStats>(&sql)
            .bind(GLOBAL_STATS_ID)
            .bind(today.start)
            .bind(today.end)
            .bind(at)
            .fetch_one(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn purge_before(&mut self, cutoff: PurgeCutoff) -> StoreResult<PurgeReport> {
        let events = sqlx::query("DELETE FROM analytics_events WHERE created_at < $1")
            .bind(cutoff.before)
            .execute(self.conn()?)
            .await?;
        let spins = sqlx::query(
            "DELETE FROM wheel_spins WHERE spin_date < $1 \
             AND wallet_address NOT IN (SELECT referrer_wallet FROM referrals)",
        )
        .bind(cutoff.before_day)
        .execute(self.conn()?)
        .await?;
        Ok(PurgeReport {
            deleted_analytics_events: events.rows_affected(),
            deleted_wheel_spins: spins.rows_affected(),
        })
    }

    async fn reset_all(&mut self, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "TRUNCATE referrals, wheel_spins, analytics_events, participants RESTART IDENTITY CASCADE",
        )
        .execute(self.conn()?)
        .await?;
        sqlx::query(
            "INSERT INTO global_stats (id, updated_at) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET total_participants = 0, tokens_reserved = 0, \
                participants_today = 0, total_spins = 0, updated_at = EXCLUDED.updated_at",
        )
        .bind(GLOBAL_STATS_ID)
        .bind(at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
