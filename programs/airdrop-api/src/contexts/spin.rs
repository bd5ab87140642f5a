use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpinRequest {
    pub wallet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinData {
    pub prize: i64,
    pub new_balance: i64,
    pub message: String,
    /// Start of the next calendar day.
    pub next_spin: DateTime<Utc>,
}
