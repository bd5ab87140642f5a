use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsData {
    pub total_participants: i64,
    pub tokens_reserved: i64,
    pub tokens_remaining: i64,
    /// Whole percent of the total supply already reserved.
    pub tokens_percentage: i64,
    pub participants_today: i64,
    pub total_spins: i64,
    pub days_to_launch: i64,
    pub launch_date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}
