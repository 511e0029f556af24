use std::cmp::Ordering;

use crate::constants::{RACE_DURATION_MS, RACE_RETENTION_MS};
use crate::types::{LeaderboardEntry, RaceOutcome, RaceSummary};

#[derive(Clone, Debug)]
pub struct PlayerEntry {
    pub player_id: String,
    pub connection_id: String,
    pub height: f64,
    pub last_update_ms: u64,
}

/// Authoritative state of one timed race. Membership keeps admission
/// order so that leaderboard ties resolve to the earlier joiner.
///
/// No operation here rejects bad input: unknown players and post-end
/// reports are silent no-ops. Updates are best-effort telemetry and
/// losing one never breaks the race.
pub struct Race {
    pub race_id: u64,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub is_active: bool,
    pub winner: Option<String>,
    members: Vec<PlayerEntry>,
}

impl Race {
    pub fn new(race_id: u64, now_ms: u64) -> Self {
        Self {
            race_id,
            start_time_ms: now_ms,
            end_time_ms: now_ms + RACE_DURATION_MS,
            is_active: true,
            winner: None,
            members: Vec::new(),
        }
    }

    /// Adds a member with height 0. Re-admitting an existing player
    /// resets the entry but keeps its admission position.
    pub fn admit(&mut self, player_id: &str, connection_id: &str, now_ms: u64) {
        let entry = PlayerEntry {
            player_id: player_id.to_string(),
            connection_id: connection_id.to_string(),
            height: 0.0,
            last_update_ms: now_ms,
        };
        match self.find_index(player_id) {
            Some(index) => self.members[index] = entry,
            None => self.members.push(entry),
        }
    }

    /// Last-write-wins height report. Ignored once the race has ended
    /// or when the player is not a member.
    pub fn report_height(&mut self, player_id: &str, height: f64, now_ms: u64) {
        if !self.is_active {
            return;
        }
        let Some(index) = self.find_index(player_id) else {
            return;
        };
        let member = &mut self.members[index];
        member.height = height;
        member.last_update_ms = now_ms;
    }

    pub fn remove(&mut self, player_id: &str) {
        self.members.retain(|member| member.player_id != player_id);
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.find_index(player_id).is_some()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Fresh height-descending snapshot; stable sort keeps admission
    /// order between equal heights.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .members
            .iter()
            .map(|member| LeaderboardEntry {
                player_id: member.player_id.clone(),
                height: member.height,
            })
            .collect();
        entries.sort_by(|a, b| b.height.partial_cmp(&a.height).unwrap_or(Ordering::Equal));
        entries
    }

    /// Whole seconds left on the clock, rounded up.
    pub fn time_remaining_secs(&self, now_ms: u64) -> u64 {
        let left_ms = self.end_time_ms.saturating_sub(now_ms);
        left_ms.div_ceil(1_000)
    }

    /// Ends the race and computes the winner from the final leaderboard.
    /// Idempotent: a second call returns `None` and changes nothing.
    pub fn end(&mut self) -> Option<RaceOutcome> {
        if !self.is_active {
            return None;
        }
        self.is_active = false;

        let final_leaderboard = self.leaderboard();
        self.winner = final_leaderboard
            .first()
            .map(|entry| entry.player_id.clone());
        Some(RaceOutcome {
            race_id: self.race_id,
            winner: self.winner.clone(),
            final_leaderboard,
        })
    }

    /// Whether the retention window has passed, active or not.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.end_time_ms) > RACE_RETENTION_MS
    }

    fn find_index(&self, player_id: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|member| member.player_id == player_id)
    }

    pub fn summary(&self) -> RaceSummary {
        RaceSummary {
            race_id: self.race_id,
            player_count: self.members.len(),
            is_active: self.is_active,
            start_time: self.start_time_ms,
            end_time: self.end_time_ms,
        }
    }
}
