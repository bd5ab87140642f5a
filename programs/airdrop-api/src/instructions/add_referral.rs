use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::contexts::{AddReferralData, AddReferralRequest, ApiResponse};
use crate::errors::{AirdropError, StoreError};
use crate::instructions::utils::{
    is_valid_referral_code, record_event, required, short_wallet, verify_wallet_address,
};
use crate::state::{Credit, NewAnalyticsEvent, NewReferral, StatsDelta};
use crate::store::{constraints, settle};
use crate::AppState;

/// Links a registered referred wallet to its referrer and pays the referrer.
pub async fn process(
    app: &AppState,
    req: AddReferralRequest,
) -> Result<AddReferralData, AirdropError> {
    let (referrer_wallet, referred_wallet, referral_code) = match (
        required(req.referrer_wallet.as_deref()),
        required(req.referred_wallet.as_deref()),
        required(req.referral_code.as_deref()),
    ) {
        (Some(referrer), Some(referred), Some(code)) => {
            (referrer.to_owned(), referred.to_owned(), code.to_owned())
        }
        _ => {
            return Err(AirdropError::MissingFields(
                "referrerWallet, referredWallet, referralCode",
            ))
        }
    };

    verify_wallet_address(&referrer_wallet, AirdropError::InvalidReferrerAddress)?;
    verify_wallet_address(&referred_wallet, AirdropError::InvalidReferredAddress)?;
    require!(referrer_wallet != referred_wallet, AirdropError::SelfReferral);
    require!(is_valid_referral_code(&referral_code), AirdropError::InvalidCode);

    let referrer = app
        .store
        .find_by_wallet(&referrer_wallet)
        .await?
        .ok_or(AirdropError::ReferrerNotFound)?;
    require!(referrer.referral_code == referral_code, AirdropError::CodeMismatch);
    require!(
        app.store.find_by_wallet(&referred_wallet).await?.is_some(),
        AirdropError::ReferredNotFound
    );
    require!(
        app.store.find_referral_of(&referred_wallet).await?.is_none(),
        AirdropError::AlreadyReferred
    );

    let now = app.clock.now();
    let reward = NewReferral::TOKENS_AWARDED;

    let mut tx = app.store.begin().await?;
    let outcome = async {
        tx.insert_referral(&NewReferral {
            referrer_wallet: referrer_wallet.clone(),
            referred_wallet: referred_wallet.clone(),
            referral_code: referral_code.clone(),
            created_at: now,
        })
        .await
        .map_err(|err| match err {
            err if err.violates(constraints::REFERRAL_REFERRED_WALLET) => {
                AirdropError::AlreadyReferred
            }
            StoreError::ForeignKeyViolation { constraint }
                if constraint == constraints::REFERRAL_REFERRED_FK =>
            {
                AirdropError::ReferredNotFound
            }
            StoreError::ForeignKeyViolation { .. } => AirdropError::ReferrerNotFound,
            other => other.into(),
        })?;

        let referrer_balance = tx
            .credit_tokens(&referrer_wallet, Credit::Referral { amount: reward }, now)
            .await?
            .ok_or(AirdropError::ReferrerNotFound)?;

        tx.increment_stats(StatsDelta::referral(), now).await?;
        Ok::<_, AirdropError>(referrer_balance)
    }
    .await;
    let referrer_new_tokens = settle(tx, outcome).await?;

    info!(
        referrer = %short_wallet(&referrer_wallet),
        referred = %short_wallet(&referred_wallet),
        referrer_new_tokens,
        "referral added"
    );

    record_event(
        app.store.as_ref(),
        NewAnalyticsEvent {
            event_name: "referral_added",
            session_id: None,
            wallet_address: Some(referrer_wallet.clone()),
            event_data: json!({
                "referrerWallet": referrer_wallet,
                "referredWallet": referred_wallet,
                "referralCode": referral_code,
                "tokensAwarded": reward,
            }),
            user_agent: None,
            referrer: None,
            created_at: now,
        },
    )
    .await;

    Ok(AddReferralData {
        awarded_tokens: reward,
        referrer_new_tokens,
    })
}

pub async fn handler(
    State(app): State<AppState>,
    payload: Result<Json<AddReferralRequest>, JsonRejection>,
) -> Result<ApiResponse<AddReferralData>, AirdropError> {
    let Json(req) = payload?;
    process(&app, req).await.map(ApiResponse::ok)
}
