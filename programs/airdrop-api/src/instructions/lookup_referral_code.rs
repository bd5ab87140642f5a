use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};

use crate::contexts::{ApiResponse, LookupData, LookupQuery};
use crate::errors::AirdropError;
use crate::instructions::utils::{is_valid_referral_code, required};
use crate::AppState;

/// Resolves a referral code to the wallet that owns it.
pub async fn process(app: &AppState, query: LookupQuery) -> Result<LookupData, AirdropError> {
    let code = required(query.code.as_deref()).ok_or(AirdropError::MissingCode)?;
    require!(is_valid_referral_code(code), AirdropError::InvalidCode);

    let owner = app
        .store
        .find_by_referral_code(code)
        .await?
        .ok_or(AirdropError::CodeNotFound)?;
    Ok(LookupData {
        referrer_wallet: owner.wallet_address,
        referral_code: owner.referral_code,
    })
}

pub async fn handler(
    State(app): State<AppState>,
    query: Result<Query<LookupQuery>, QueryRejection>,
) -> Result<ApiResponse<LookupData>, AirdropError> {
    let Query(query) = query?;
    process(&app, query).await.map(ApiResponse::ok)
}
