use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCardRequest {
    pub owner: String,
    pub book_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendCardRequest {
    pub card_id: String,
    pub owner: String,
    pub suspended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsRequest {
    pub owner: String,
    /// Trailing window of UTC days for the history buckets.
    pub window_days: u32,
    pub book_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCapRequest {
    pub owner: String,
    pub daily_cap: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCapResponse {
    pub owner: String,
    /// The cap as stored, after clamping.
    pub daily_cap: u32,
}
