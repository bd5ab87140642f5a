use axum::extract::State;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::constants::{fallback, GLOBAL_STATS_ID};
use crate::contexts::{ApiResponse, StatsData};
use crate::errors::AirdropError;
use crate::instructions::utils::days_until;
use crate::state::GlobalStats;
use crate::AppState;

const FALLBACK_WARNING: &str = "Using cached statistics due to database error";

fn launch_instant(app: &AppState) -> DateTime<Utc> {
    let midnight = app.config.launch_date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&midnight)
}

fn supply_figures(total_supply: i64, reserved: i64) -> (i64, i64) {
    let remaining = (total_supply - reserved).max(0);
    let percentage = if total_supply > 0 {
        (reserved as f64 * 100.0 / total_supply as f64).round() as i64
    } else {
        0
    };
    (remaining, percentage)
}

/// Live aggregate figures. `participantsToday` is counted over the current
/// calendar day rather than read from the rollup row.
pub async fn process(app: &AppState) -> Result<StatsData, AirdropError> {
    let now = app.clock.now();
    let today = app.clock.today();

    let stored = app.store.global_stats().await?;
    let participants_today = app
        .store
        .count_registrations_between(today.start, today.end)
        .await?;
    let last_updated = stored.as_ref().map(|s| s.updated_at);
    let stats = stored.unwrap_or_else(|| GlobalStats::empty(GLOBAL_STATS_ID, now));

    let (tokens_remaining, tokens_percentage) =
        supply_figures(app.config.total_supply, stats.tokens_reserved);

    debug!(
        participants = stats.total_participants,
        reserved = stats.tokens_reserved,
        "stats read"
    );

    Ok(StatsData {
        total_participants: stats.total_participants,
        tokens_reserved: stats.tokens_reserved,
        tokens_remaining,
        tokens_percentage,
        participants_today,
        total_spins: stats.total_spins,
        days_to_launch: days_until(launch_instant(app), now),
        launch_date: app.config.launch_date,
        timestamp: now,
        last_updated,
    })
}

/// Figures served while the store is unreachable.
pub fn fallback_stats(app: &AppState) -> StatsData {
    let (tokens_remaining, tokens_percentage) =
        supply_figures(app.config.total_supply, fallback::TOKENS_RESERVED);
    StatsData {
        total_participants: fallback::TOTAL_PARTICIPANTS,
        tokens_reserved: fallback::TOKENS_RESERVED,
        tokens_remaining,
        tokens_percentage,
        participants_today: fallback::PARTICIPANTS_TODAY,
        total_spins: fallback::TOTAL_SPINS,
        days_to_launch: fallback::DAYS_TO_LAUNCH,
        launch_date: app.config.launch_date,
        timestamp: app.clock.now(),
        last_updated: None,
    }
}

/// Never fails; a store error degrades to the fallback figures.
pub async fn handler(State(app): State<AppState>) -> ApiResponse<StatsData> {
    match process(&app).await {
        Ok(data) => ApiResponse::ok(data),
        Err(err) => {
            warn!(code = err.code(), error = %err.detail(), "stats unavailable, serving fallback");
            let detail = app
                .config
                .environment
                .is_development()
                .then(|| err.detail());
            ApiResponse::degraded(fallback_stats(&app), FALLBACK_WARNING, detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supply_figures_floor_at_zero() {
        assert_eq!(supply_figures(10_000_000, 3_875_000), (6_125_000, 39));
        assert_eq!(supply_figures(1_000, 5_000), (0, 500));
        assert_eq!(supply_figures(0, 10), (0, 0));
    }
}
