use serde::{Deserialize, Serialize};

use crate::state::{GlobalStats, PurgeReport, TableCounts};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub operation: Option<String>,
    #[serde(alias = "admin_token")]
    pub admin_token: Option<String>,
    pub days: Option<i64>,
    pub confirm: Option<String>,
}

/// Parsed admin operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOperation {
    RebuildStats,
    PurgeOldData { days: i64 },
    ResetTestData,
    HealthCheck,
}

impl AdminOperation {
    pub fn name(&self) -> &'static str {
        match self {
            AdminOperation::RebuildStats => "rebuild_stats",
            AdminOperation::PurgeOldData { .. } => "purge_old_data",
            AdminOperation::ResetTestData => "reset_test_data",
            AdminOperation::HealthCheck => "health_check",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            AdminOperation::PurgeOldData { .. } | AdminOperation::ResetTestData
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "operation")]
pub enum AdminOutcome {
    #[serde(rename = "rebuild_stats")]
    RebuildStats { stats: GlobalStats },
    #[serde(rename = "purge_old_data")]
    PurgeOldData {
        days: i64,
        #[serde(flatten)]
        report: PurgeReport,
    },
    #[serde(rename = "reset_test_data")]
    ResetTestData { reset: bool },
    #[serde(rename = "health_check")]
    HealthCheck { tables: TableCounts },
}
