use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::contexts::{ApiResponse, SpinData, SpinRequest};
use crate::errors::{AirdropError, StoreError};
use crate::instructions::utils::{record_event, required, short_wallet, verify_wallet_address};
use crate::state::{Credit, NewAnalyticsEvent, NewWheelSpin, StatsDelta};
use crate::store::{constraints, settle};
use crate::AppState;

/// One prize draw per wallet per calendar day.
pub async fn process(app: &AppState, req: SpinRequest) -> Result<SpinData, AirdropError> {
    let wallet = required(req.wallet.as_deref())
        .ok_or(AirdropError::MissingWallet)?
        .to_owned();
    verify_wallet_address(&wallet, AirdropError::InvalidAddress)?;

    let today = app.clock.today();
    let already_spun = AirdropError::AlreadySpunToday {
        next_spin: today.end,
    };

    let participant = app
        .store
        .find_by_wallet(&wallet)
        .await?
        .ok_or(AirdropError::WalletNotFound)?;
    require!(participant.last_spin != Some(today.day), already_spun);
    require!(
        app.store.find_spin_on(&wallet, today.day).await?.is_none(),
        already_spun
    );

    let prize = app.wheel.spin(&mut rand::thread_rng());
    let now = app.clock.now();

    let mut tx = app.store.begin().await?;
    let outcome = async {
        tx.insert_wheel_spin(&NewWheelSpin {
            wallet_address: wallet.clone(),
            prize_amount: prize,
            spin_date: today.day,
            created_at: now,
        })
        .await
        .map_err(|err| match err {
            err if err.violates(constraints::WHEEL_SPIN_WALLET_DAY) => {
                AirdropError::AlreadySpunToday {
                    next_spin: today.end,
                }
            }
            StoreError::ForeignKeyViolation { .. } => AirdropError::WalletNotFound,
            other => other.into(),
        })?;

        let new_balance = tx
            .credit_tokens(
                &wallet,
                Credit::Spin {
                    amount: prize,
                    day: today.day,
                },
                now,
            )
            .await?
            .ok_or(AirdropError::UpdateFailed)?;

        tx.increment_stats(StatsDelta::spin(prize), now).await?;
        Ok::<_, AirdropError>(new_balance)
    }
    .await;
    let new_balance = settle(tx, outcome).await?;

    info!(wallet = %short_wallet(&wallet), prize, new_balance, "wheel spun");

    record_event(
        app.store.as_ref(),
        NewAnalyticsEvent {
            event_name: "wheel_spun",
            session_id: None,
            wallet_address: Some(wallet),
            event_data: json!({ "prize": prize, "newBalance": new_balance, "spinDate": today.day }),
            user_agent: None,
            referrer: None,
            created_at: now,
        },
    )
    .await;

    Ok(SpinData {
        prize,
        new_balance,
        message: format!("Congratulations! You won {prize} $REGRET"),
        next_spin: today.end,
    })
}

pub async fn handler(
    State(app): State<AppState>,
    payload: Result<Json<SpinRequest>, JsonRejection>,
) -> Result<ApiResponse<SpinData>, AirdropError> {
    let Json(req) = payload?;
    process(&app, req).await.map(ApiResponse::ok)
}
