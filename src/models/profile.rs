use serde::{Deserialize, Serialize};

/// Status value that makes a profile eligible for active-time accrual.
pub const APPROVED_STATUS: &str = "approved";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub subject_id: String,
    pub total_active_seconds: i64,
    pub approved: bool,
}

pub fn status_is_approved(status: &str) -> bool {
    status.trim().eq_ignore_ascii_case(APPROVED_STATUS)
}
