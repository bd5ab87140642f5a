use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use crate::constants::{
    FREE_TEXT_MAX_LEN, MAX_CODE_ATTEMPTS, REGISTER_TX_ATTEMPTS, SESSION_ID_MAX_LEN, UTM_MAX_LEN,
};
use crate::contexts::{ApiResponse, RegisterData, RegisterRequest};
use crate::errors::{AirdropError, StoreResult};
use crate::instructions::utils::{
    derive_referral_code, normalize_wallet_type, random_referral_code, record_event, required,
    sanitize, short_wallet, verify_wallet_address,
};
use crate::state::{NewAnalyticsEvent, NewParticipant, Participant, StatsDelta};
use crate::store::{constraints, settle, StoreTx};
use crate::AppState;

/// Registers a wallet, or returns its existing code and balance.
pub async fn process(app: &AppState, req: RegisterRequest) -> Result<RegisterData, AirdropError> {
    let (wallet, wallet_type) = match (
        required(req.wallet.as_deref()),
        required(req.wallet_type.as_deref()),
    ) {
        (Some(wallet), Some(wallet_type)) => (wallet.to_owned(), wallet_type.to_owned()),
        _ => return Err(AirdropError::MissingFields("wallet, walletType")),
    };
    verify_wallet_address(&wallet, AirdropError::InvalidAddress)?;
    let wallet_type = normalize_wallet_type(&wallet_type).ok_or(AirdropError::InvalidWalletType)?;

    let session_id = sanitize(req.session_id.as_deref(), SESSION_ID_MAX_LEN);

    if let Some(existing) = app.store.find_by_wallet(&wallet).await? {
        return Ok(already_registered(app, existing, session_id.as_deref()).await);
    }

    let mut new = NewParticipant {
        wallet_address: wallet.clone(),
        wallet_type: wallet_type.to_owned(),
        referral_code: String::new(),
        session_id,
        user_agent: sanitize(req.user_agent.as_deref(), FREE_TEXT_MAX_LEN),
        referrer: sanitize(req.referrer.as_deref(), FREE_TEXT_MAX_LEN),
        utm_source: sanitize(req.utm_source.as_deref(), UTM_MAX_LEN),
        utm_medium: sanitize(req.utm_medium.as_deref(), UTM_MAX_LEN),
        utm_campaign: sanitize(req.utm_campaign.as_deref(), UTM_MAX_LEN),
        registered_at: app.clock.now(),
    };

    let mut attempt = 0;
    let participant = loop {
        attempt += 1;
        new.registered_at = app.clock.now();

        let mut tx = app.store.begin().await?;
        let outcome = insert_with_unique_code(tx.as_mut(), &mut new).await;
        match settle(tx, outcome).await {
            Ok(Some(participant)) => break participant,
            Ok(None) => return Err(AirdropError::CodeGenerationExhausted),
            Err(err) if err.violates(constraints::PARTICIPANT_WALLET) => {
                // Lost a race with a concurrent registration of the same wallet.
                return match app.store.find_by_wallet(&wallet).await {
                    Ok(Some(existing)) => {
                        Ok(already_registered(app, existing, new.session_id.as_deref()).await)
                    }
                    _ => Err(AirdropError::WalletExists),
                };
            }
            Err(err)
                if err.violates(constraints::PARTICIPANT_REFERRAL_CODE)
                    && attempt < REGISTER_TX_ATTEMPTS =>
            {
                warn!(wallet = %short_wallet(&wallet), "referral code taken concurrently, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    };

    info!(
        wallet = %short_wallet(&participant.wallet_address),
        wallet_type = %participant.wallet_type,
        referral_code = %participant.referral_code,
        "registered wallet"
    );

    record_event(
        app.store.as_ref(),
        NewAnalyticsEvent {
            event_name: "wallet_registered",
            session_id: participant.session_id.clone(),
            wallet_address: Some(participant.wallet_address.clone()),
            event_data: json!({
                "walletType": participant.wallet_type,
                "referralCode": participant.referral_code,
                "utmSource": participant.utm_source,
                "utmMedium": participant.utm_medium,
                "utmCampaign": participant.utm_campaign,
            }),
            user_agent: participant.user_agent.clone(),
            referrer: participant.referrer.clone(),
            created_at: app.clock.now(),
        },
    )
    .await;

    Ok(RegisterData {
        referral_code: participant.referral_code,
        tokens: participant.tokens,
        already_registered: false,
    })
}

/// Picks a free code, inserts the participant and bumps the stats row, all
/// inside `tx`. `None` when every candidate code was taken.
async fn insert_with_unique_code(
    tx: &mut dyn StoreTx,
    new: &mut NewParticipant,
) -> StoreResult<Option<Participant>> {
    let mut candidate = derive_referral_code(&new.wallet_address);
    let mut attempts = 0;
    while tx.referral_code_taken(&candidate).await? {
        attempts += 1;
        if attempts >= MAX_CODE_ATTEMPTS {
            return Ok(None);
        }
        candidate = random_referral_code(&mut rand::thread_rng());
    }
    new.referral_code = candidate;

    let participant = tx.insert_participant(new).await?;
    tx.increment_stats(StatsDelta::registration(), new.registered_at)
        .await?;
    Ok(Some(participant))
}

async fn already_registered(
    app: &AppState,
    existing: Participant,
    session_id: Option<&str>,
) -> RegisterData {
    if let Err(err) = app
        .store
        .touch_activity(&existing.wallet_address, session_id, app.clock.now())
        .await
    {
        warn!(wallet = %short_wallet(&existing.wallet_address), error = %err, "failed to touch activity");
    }
    RegisterData {
        referral_code: existing.referral_code,
        tokens: existing.tokens,
        already_registered: true,
    }
}

pub async fn handler(
    State(app): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<ApiResponse<RegisterData>, AirdropError> {
    let Json(req) = payload?;
    process(&app, req).await.map(ApiResponse::ok)
}
