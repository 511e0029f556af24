use serde::Serialize;

/// One row of a race leaderboard, height descending.
#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub height: f64,
}

/// Snapshot of a race for the status API.
#[derive(Clone, Debug, Serialize)]
pub struct RaceSummary {
    #[serde(rename = "raceId")]
    pub race_id: u64,
    #[serde(rename = "playerCount")]
    pub player_count: usize,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "startTime")]
    pub start_time: u64,
    #[serde(rename = "endTime")]
    pub end_time: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "raceId")]
    pub race_id: u64,
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    pub winner: Option<String>,
}

/// Terminal state of a race, computed exactly once at end-of-race.
#[derive(Clone, Debug)]
pub struct RaceOutcome {
    pub race_id: u64,
    pub winner: Option<String>,
    pub final_leaderboard: Vec<LeaderboardEntry>,
}

/// Last reported position of one player, relayed verbatim for ghost
/// rendering on other clients. Carries no authoritative state.
#[derive(Clone, Debug, Serialize)]
pub struct PlayerPosition {
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub x: f64,
    pub y: f64,
    pub score: f64,
    #[serde(rename = "velocityY")]
    pub velocity_y: f64,
    pub alive: bool,
}
