use serde::{Deserialize, Serialize};

/// Body of `POST /register`. Every field is optional at the wire level so a
/// missing field is reported as `MISSING_FIELDS` rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub wallet: Option<String>,
    pub wallet_type: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    pub referral_code: String,
    pub tokens: i64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_registered: bool,
}
