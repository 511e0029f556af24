use std::collections::HashMap;

use crate::types::PlayerPosition;

/// Last-known position of every player, per race, for the cosmetic
/// `playersPositions` relay. Purely transient: never consulted for
/// scoring, cleared when a race is evicted.
#[derive(Default)]
pub struct PositionBoard {
    by_race: HashMap<u64, Vec<PlayerPosition>>,
}

impl PositionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins for a given player; new players append.
    pub fn upsert(&mut self, race_id: u64, position: PlayerPosition) {
        let positions = self.by_race.entry(race_id).or_default();
        match positions
            .iter()
            .position(|existing| existing.player_id == position.player_id)
        {
            Some(index) => positions[index] = position,
            None => positions.push(position),
        }
    }

    pub fn remove_player(&mut self, race_id: u64, player_id: &str) {
        if let Some(positions) = self.by_race.get_mut(&race_id) {
            positions.retain(|position| position.player_id != player_id);
            if positions.is_empty() {
                self.by_race.remove(&race_id);
            }
        }
    }

    pub fn snapshot(&self, race_id: u64) -> Vec<PlayerPosition> {
        self.by_race.get(&race_id).cloned().unwrap_or_default()
    }

    pub fn clear_race(&mut self, race_id: u64) {
        self.by_race.remove(&race_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(player_id: &str, y: f64) -> PlayerPosition {
        PlayerPosition {
            player_id: player_id.to_string(),
            x: 100.0,
            y,
            score: y,
            velocity_y: -2.5,
            alive: true,
        }
    }

    #[test]
    fn upsert_keeps_latest_position_per_player() {
        let mut board = PositionBoard::new();
        board.upsert(1, position("a", 10.0));
        board.upsert(1, position("b", 20.0));
        board.upsert(1, position("a", 30.0));

        let snapshot = board.snapshot(1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].player_id, "a");
        assert_eq!(snapshot[0].y, 30.0);
    }

    #[test]
    fn races_are_isolated() {
        let mut board = PositionBoard::new();
        board.upsert(1, position("a", 10.0));
        board.upsert(2, position("a", 99.0));
        assert_eq!(board.snapshot(1).len(), 1);
        assert_eq!(board.snapshot(1)[0].y, 10.0);
        assert_eq!(board.snapshot(2)[0].y, 99.0);
    }

    #[test]
    fn remove_and_clear_drop_entries() {
        let mut board = PositionBoard::new();
        board.upsert(1, position("a", 10.0));
        board.upsert(1, position("b", 20.0));

        board.remove_player(1, "a");
        assert_eq!(board.snapshot(1).len(), 1);
        board.remove_player(1, "ghost");
        assert_eq!(board.snapshot(1).len(), 1);

        board.clear_race(1);
        assert!(board.snapshot(1).is_empty());
    }
}
