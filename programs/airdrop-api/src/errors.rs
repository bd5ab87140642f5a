use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("transaction aborted")]
    TransactionAborted,

    #[error("timed out waiting for a database connection")]
    PoolTimeout,

    #[error("transaction already finished")]
    TransactionClosed,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) {
            return StoreError::PoolTimeout;
        }

        let (code, constraint) = match err.as_database_error() {
            Some(db) => (
                db.code().map(|c| c.into_owned()),
                db.constraint().unwrap_or_default().to_owned(),
            ),
            None => return StoreError::Database(err),
        };

        match code.as_deref() {
            Some("23505") => StoreError::UniqueViolation { constraint },
            Some("23503") => StoreError::ForeignKeyViolation { constraint },
            // in_failed_sql_transaction, serialization_failure, deadlock_detected
            Some("25P02") | Some("40001") | Some("40P01") => StoreError::TransactionAborted,
            _ => StoreError::Database(err),
        }
    }
}

/// Domain outcome of an airdrop operation. Every variant carries a stable
/// machine-readable code and an HTTP status.
#[derive(Debug, Error)]
pub enum AirdropError {
    #[error("Missing required fields: {0}")]
    MissingFields(&'static str),

    #[error("Wallet address is required")]
    MissingWallet,

    #[error("Referral code is required")]
    MissingCode,

    #[error("Malformed request: {0}")]
    InvalidBody(String),

    #[error("Invalid Solana wallet address format")]
    InvalidAddress,

    #[error("Invalid referrer wallet address")]
    InvalidReferrerAddress,

    #[error("Invalid referred wallet address")]
    InvalidReferredAddress,

    #[error("Invalid wallet type")]
    InvalidWalletType,

    #[error("Invalid referral code format")]
    InvalidCode,

    #[error("Cannot refer yourself")]
    SelfReferral,

    #[error("Invalid referral code for this referrer")]
    CodeMismatch,

    #[error("Operation parameter required")]
    MissingOperation,

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Destructive operation requires confirm: \"yes\"")]
    ConfirmationRequired,

    #[error("days must be between 1 and {max}")]
    InvalidDays { max: i64 },

    #[error("Invalid period. Must be one of: day, week, month")]
    InvalidPeriod,

    #[error("Admin token required")]
    MissingToken,

    #[error("Invalid admin token")]
    InvalidToken,

    #[error("Admin operations are disabled on this deployment")]
    AdminDisabled,

    #[error("Wallet not registered. Please register first.")]
    WalletNotFound,

    #[error("Referrer wallet not found. Referrer must be registered first.")]
    ReferrerNotFound,

    #[error("Referred wallet not found. Referred wallet must be registered first.")]
    ReferredNotFound,

    #[error("No participant owns this referral code")]
    CodeNotFound,

    #[error("Referenced record not found")]
    ReferenceNotFound,

    #[error("Wallet already registered")]
    WalletExists,

    #[error("This wallet has already been referred")]
    AlreadyReferred,

    #[error("Duplicate entry")]
    DuplicateEntry,

    #[error("Already spun today. Come back tomorrow!")]
    AlreadySpunToday { next_spin: DateTime<Utc> },

    #[error("Too many requests. Try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Could not generate a unique referral code")]
    CodeGenerationExhausted,

    #[error("Failed to update participant balance")]
    UpdateFailed,

    #[error("Transaction failed - database might be unavailable")]
    TransactionFailed,

    #[error("Database unavailable. Try again shortly.")]
    DatabaseUnavailable,

    #[error("Internal server error")]
    Internal(#[source] StoreError),
}

impl AirdropError {
    pub fn code(&self) -> &'static str {
        match self {
            AirdropError::MissingFields(_) => "MISSING_FIELDS",
            AirdropError::MissingWallet => "MISSING_WALLET",
            AirdropError::MissingCode => "MISSING_CODE",
            AirdropError::InvalidBody(_) => "INVALID_BODY",
            AirdropError::InvalidAddress => "INVALID_ADDRESS",
            AirdropError::InvalidReferrerAddress => "INVALID_REFERRER_ADDRESS",
            AirdropError::InvalidReferredAddress => "INVALID_REFERRED_ADDRESS",
            AirdropError::InvalidWalletType => "INVALID_WALLET_TYPE",
            AirdropError::InvalidCode => "INVALID_CODE",
            AirdropError::SelfReferral => "SELF_REFERRAL",
            AirdropError::CodeMismatch => "CODE_MISMATCH",
            AirdropError::MissingOperation => "MISSING_OPERATION",
            AirdropError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            AirdropError::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            AirdropError::InvalidDays { .. } => "INVALID_DAYS",
            AirdropError::InvalidPeriod => "INVALID_PERIOD",
            AirdropError::MissingToken => "MISSING_TOKEN",
            AirdropError::InvalidToken => "INVALID_TOKEN",
            AirdropError::AdminDisabled => "ADMIN_DISABLED",
            AirdropError::WalletNotFound => "WALLET_NOT_FOUND",
            AirdropError::ReferrerNotFound => "REFERRER_NOT_FOUND",
            AirdropError::ReferredNotFound => "REFERRED_NOT_FOUND",
            AirdropError::CodeNotFound => "CODE_NOT_FOUND",
            AirdropError::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            AirdropError::WalletExists => "WALLET_EXISTS",
            AirdropError::AlreadyReferred => "ALREADY_REFERRED",
            AirdropError::DuplicateEntry => "DUPLICATE_ENTRY",
            AirdropError::AlreadySpunToday { .. } => "ALREADY_SPUN_TODAY",
            AirdropError::RateLimited { .. } => "RATE_LIMITED",
            AirdropError::CodeGenerationExhausted => "CODE_GENERATION_EXHAUSTED",
            AirdropError::UpdateFailed => "UPDATE_FAILED",
            AirdropError::TransactionFailed => "TRANSACTION_FAILED",
            AirdropError::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
            AirdropError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Underlying cause, for logs and development-only payloads.
    pub fn detail(&self) -> String {
        match self {
            AirdropError::Internal(source) => source.to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AirdropError::MissingFields(_)
            | AirdropError::MissingWallet
            | AirdropError::MissingCode
            | AirdropError::InvalidBody(_)
            | AirdropError::InvalidAddress
            | AirdropError::InvalidReferrerAddress
            | AirdropError::InvalidReferredAddress
            | AirdropError::InvalidWalletType
            | AirdropError::InvalidCode
            | AirdropError::SelfReferral
            | AirdropError::CodeMismatch
            | AirdropError::MissingOperation
            | AirdropError::UnknownOperation(_)
            | AirdropError::ConfirmationRequired
            | AirdropError::InvalidDays { .. }
            | AirdropError::InvalidPeriod => StatusCode::BAD_REQUEST,
            AirdropError::MissingToken => StatusCode::UNAUTHORIZED,
            AirdropError::InvalidToken | AirdropError::AdminDisabled => StatusCode::FORBIDDEN,
            AirdropError::WalletNotFound
            | AirdropError::ReferrerNotFound
            | AirdropError::ReferredNotFound
            | AirdropError::CodeNotFound
            | AirdropError::ReferenceNotFound => StatusCode::NOT_FOUND,
            AirdropError::WalletExists
            | AirdropError::AlreadyReferred
            | AirdropError::DuplicateEntry => StatusCode::CONFLICT,
            AirdropError::AlreadySpunToday { .. } | AirdropError::RateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AirdropError::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AirdropError::CodeGenerationExhausted
            | AirdropError::UpdateFailed
            | AirdropError::TransactionFailed
            | AirdropError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AirdropError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TransactionAborted => AirdropError::TransactionFailed,
            StoreError::PoolTimeout => AirdropError::DatabaseUnavailable,
            StoreError::UniqueViolation { .. } => AirdropError::DuplicateEntry,
            StoreError::ForeignKeyViolation { .. } => AirdropError::ReferenceNotFound,
            other => AirdropError::Internal(other),
        }
    }
}

impl From<JsonRejection> for AirdropError {
    fn from(rejection: JsonRejection) -> Self {
        AirdropError::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for AirdropError {
    fn from(rejection: QueryRejection) -> Self {
        AirdropError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for AirdropError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                AirdropError::Internal(source) => {
                    error!(code = self.code(), error = %source, "request failed")
                }
                other => error!(code = other.code(), "request failed: {}", other),
            }
        }

        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        let mut retry_after = None;
        match &self {
            AirdropError::AlreadySpunToday { next_spin } => {
                body["nextSpin"] = json!(next_spin.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            AirdropError::RateLimited { retry_after_secs } => {
                body["retryAfter"] = json!(retry_after_secs);
                retry_after = Some(*retry_after_secs);
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
