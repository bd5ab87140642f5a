use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

use crate::constants::{
    ACTIVE_SESSION_WINDOW_MINUTES, DASHBOARD_RECENT_REGISTRATIONS, DASHBOARD_TOP_REFERRERS,
    GLOBAL_STATS_ID,
};
use crate::contexts::{
    ActiveSessions, ApiResponse, DashboardData, DashboardOverview, DashboardPeriod, DashboardQuery,
    RecentRegistration, ReferralMetrics, SpinMetrics, TopReferrer, UserMetrics, WalletShare,
};
use crate::errors::AirdropError;
use crate::instructions::admin::{verify_admin_token, ADMIN_TOKEN_HEADER};
use crate::instructions::utils::mask_wallet;
use crate::state::{DashboardSnapshot, GlobalStats};
use crate::store::DashboardWindow;
use crate::AppState;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        round2(part as f64 * 100.0 / whole as f64)
    } else {
        0.0
    }
}

fn whole(value: Option<f64>) -> i64 {
    value.map(f64::round).unwrap_or_default() as i64
}

pub fn dashboard_window(
    period: DashboardPeriod,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> DashboardWindow {
    let lookback = period.lookback();
    DashboardWindow {
        since: now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC),
        since_day: today.checked_sub_signed(lookback).unwrap_or(NaiveDate::MIN),
        active_since: now
            .checked_sub_signed(Duration::minutes(ACTIVE_SESSION_WINDOW_MINUTES))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        top_referrers: DASHBOARD_TOP_REFERRERS,
        recent_registrations: DASHBOARD_RECENT_REGISTRATIONS,
    }
}

/// Shapes a store snapshot into the dashboard payload.
pub fn build_dashboard(
    period: DashboardPeriod,
    snapshot: DashboardSnapshot,
    now: DateTime<Utc>,
) -> DashboardData {
    let stats = snapshot
        .stats
        .unwrap_or_else(|| GlobalStats::empty(GLOBAL_STATS_ID, now));
    let participants: i64 = snapshot.wallet_types.iter().map(|w| w.count).sum();

    DashboardData {
        timestamp: now,
        period,
        overview: DashboardOverview {
            total_participants: stats.total_participants,
            tokens_reserved: stats.tokens_reserved,
            participants_today: stats.participants_today,
            total_spins: stats.total_spins,
        },
        user_metrics: UserMetrics {
            total: snapshot.users.total,
            period_new: snapshot.users.period_new,
            period_active: snapshot.users.period_active,
            conversion_rate: percent(snapshot.users.period_active, stats.total_participants),
        },
        spin_metrics: SpinMetrics {
            total_spins: snapshot.spins.total_spins,
            period_spins: snapshot.spins.period_spins,
            average_prize: whole(snapshot.spins.average_prize),
            median_prize: whole(snapshot.spins.median_prize),
            min_prize: snapshot.spins.min_prize.unwrap_or_default(),
            max_prize: snapshot.spins.max_prize.unwrap_or_default(),
        },
        referral_metrics: ReferralMetrics {
            total_referrals: snapshot.referrals.total_referrals,
            period_referrals: snapshot.referrals.period_referrals,
            total_tokens_awarded: snapshot.referrals.total_tokens_awarded,
            average_per_referral: whole(snapshot.referrals.average_per_referral),
        },
        top_referrers: snapshot
            .top_referrers
            .into_iter()
            .map(|p| TopReferrer {
                wallet: mask_wallet(&p.wallet_address),
                referrals: p.referral_count,
                earned: p.referral_earned,
                total_tokens: p.tokens,
                registered_at: p.registered_at,
            })
            .collect(),
        wallet_distribution: snapshot
            .wallet_types
            .into_iter()
            .map(|w| WalletShare {
                percentage: percent(w.count, participants),
                wallet_type: w.wallet_type,
                count: w.count,
            })
            .collect(),
        recent_registrations: snapshot
            .recent_registrations
            .into_iter()
            .map(|p| RecentRegistration {
                wallet: mask_wallet(&p.wallet_address),
                wallet_type: p.wallet_type,
                registered_at: p.registered_at,
                utm_source: p.utm_source,
                utm_medium: p.utm_medium,
                utm_campaign: p.utm_campaign,
            })
            .collect(),
        active_sessions: ActiveSessions {
            active_sessions: snapshot.sessions.active_sessions,
            unique_users: snapshot.sessions.unique_users,
            last_activity: snapshot.sessions.last_activity,
        },
    }
}

/// Aggregated admin view over the chosen period.
pub async fn process(
    app: &AppState,
    period: DashboardPeriod,
) -> Result<DashboardData, AirdropError> {
    let now = app.clock.now();
    let window = dashboard_window(period, now, app.clock.today().day);
    let snapshot = app.store.dashboard(window).await?;
    info!(period = period.as_str(), "admin dashboard served");
    Ok(build_dashboard(period, snapshot, now))
}

pub async fn handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<ApiResponse<DashboardData>, AirdropError> {
    let Query(query) = query?;
    let header_token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_admin_token(&app.config, header_token, query.admin_token.as_deref())?;
    let period = DashboardPeriod::parse(query.period.as_deref())?;
    process(&app, period).await.map(ApiResponse::ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn percentages_round_to_two_decimals() {
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(2, 3), 66.67);
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(whole(Some(616.67)), 617);
        assert_eq!(whole(None), 0);
    }

    #[test]
    fn window_follows_the_period() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap();
        let today = now.date_naive();

        let day = dashboard_window(DashboardPeriod::Day, now, today);
        assert_eq!(day.since, now - Duration::hours(24));
        assert_eq!(day.since_day, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
        assert_eq!(day.active_since, now - Duration::hours(1));

        let week = dashboard_window(DashboardPeriod::Week, now, today);
        assert_eq!(week.since_day, NaiveDate::from_ymd_opt(2024, 12, 29).unwrap());
        assert_eq!(week.top_referrers, 10);
        assert_eq!(week.recent_registrations, 20);
    }
}
