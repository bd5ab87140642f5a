use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::clock::DayWindow;
use crate::config::Config;
use crate::constants::{DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};
use crate::contexts::{AdminOperation, AdminOutcome, AdminRequest, ApiResponse};
use crate::errors::AirdropError;
use crate::instructions::utils::required;
use crate::store::{settle, PurgeCutoff};
use crate::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn tokens_match(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len()
        && expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Header token wins over the body field.
pub fn verify_admin_token(
    config: &Config,
    header_token: Option<&str>,
    body_token: Option<&str>,
) -> Result<(), AirdropError> {
    let expected = config
        .admin_token
        .as_deref()
        .ok_or(AirdropError::AdminDisabled)?;
    let presented = required(header_token)
        .or_else(|| required(body_token))
        .ok_or(AirdropError::MissingToken)?;
    require!(tokens_match(expected, presented), AirdropError::InvalidToken);
    Ok(())
}

pub fn parse_operation(req: &AdminRequest) -> Result<AdminOperation, AirdropError> {
    let name = required(req.operation.as_deref()).ok_or(AirdropError::MissingOperation)?;
    let operation = match name {
        "rebuild_stats" => AdminOperation::RebuildStats,
        "purge_old_data" => AdminOperation::PurgeOldData {
            days: req.days.unwrap_or(DEFAULT_RETENTION_DAYS),
        },
        "reset_test_data" => AdminOperation::ResetTestData,
        "health_check" => AdminOperation::HealthCheck,
        other => return Err(AirdropError::UnknownOperation(other.to_owned())),
    };
    if let AdminOperation::PurgeOldData { days } = operation {
        require!(
            (1..=MAX_RETENTION_DAYS).contains(&days),
            AirdropError::InvalidDays {
                max: MAX_RETENTION_DAYS
            }
        );
    }
    if operation.is_destructive() {
        require!(
            req.confirm.as_deref() == Some("yes"),
            AirdropError::ConfirmationRequired
        );
    }
    Ok(operation)
}

/// Retention cutoff `days` before `now`. Out-of-range values are rejected
/// rather than overflowing the date arithmetic.
pub fn purge_cutoff(
    now: DateTime<Utc>,
    today: DayWindow,
    days: i64,
) -> Result<PurgeCutoff, AirdropError> {
    let invalid = || AirdropError::InvalidDays {
        max: MAX_RETENTION_DAYS,
    };
    require!((1..=MAX_RETENTION_DAYS).contains(&days), invalid());
    let window = Duration::days(days);
    Ok(PurgeCutoff {
        before: now.checked_sub_signed(window).ok_or_else(invalid)?,
        before_day: today.day.checked_sub_signed(window).ok_or_else(invalid)?,
    })
}

pub async fn process(
    app: &AppState,
    operation: AdminOperation,
) -> Result<AdminOutcome, AirdropError> {
    let now = app.clock.now();
    let outcome = match operation {
        AdminOperation::HealthCheck => AdminOutcome::HealthCheck {
            tables: app.store.table_counts().await?,
        },
        AdminOperation::RebuildStats => {
            let mut tx = app.store.begin().await?;
            let rebuilt = tx.rebuild_stats(app.clock.today(), now).await;
            AdminOutcome::RebuildStats {
                stats: settle(tx, rebuilt).await?,
            }
        }
        AdminOperation::PurgeOldData { days } => {
            let cutoff = purge_cutoff(now, app.clock.today(), days)?;
            let mut tx = app.store.begin().await?;
            let purged = tx.purge_before(cutoff).await;
            AdminOutcome::PurgeOldData {
                days,
                report: settle(tx, purged).await?,
            }
        }
        AdminOperation::ResetTestData => {
            let mut tx = app.store.begin().await?;
            let reset = tx.reset_all(now).await;
            settle(tx, reset).await?;
            warn!("all airdrop data wiped by admin request");
            AdminOutcome::ResetTestData { reset: true }
        }
    };
    info!(operation = operation.name(), "admin operation executed");
    Ok(outcome)
}

pub async fn handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AdminRequest>, JsonRejection>,
) -> Result<ApiResponse<AdminOutcome>, AirdropError> {
    let Json(req) = payload?;
    let header_token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_admin_token(&app.config, header_token, req.admin_token.as_deref())?;
    let operation = parse_operation(&req)?;
    process(&app, operation).await.map(ApiResponse::ok)
}
