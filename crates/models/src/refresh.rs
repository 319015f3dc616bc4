use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one successful fetch-and-merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshSummary {
    pub countries: usize,
    pub boundaries: usize,
    pub features: usize,
    pub refreshed_at: DateTime<Utc>,
}
