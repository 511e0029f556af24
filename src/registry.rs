use std::collections::HashMap;

use log::info;

use crate::constants::RACE_CAPACITY;
use crate::race::Race;

pub struct JoinTarget {
    pub race_id: u64,
    /// True when admission rolled over to a freshly minted race.
    pub newly_created: bool,
}

/// Process-wide table of races. `current_race_id` always points at the
/// most recently minted race; join routing re-validates that race before
/// using it, because it may have ended or filled up in the meantime.
pub struct RaceRegistry {
    current_race_id: u64,
    races: HashMap<u64, Race>,
}

impl Default for RaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RaceRegistry {
    pub fn new() -> Self {
        Self {
            current_race_id: 0,
            races: HashMap::new(),
        }
    }

    pub fn current_race_id(&self) -> u64 {
        self.current_race_id
    }

    pub fn get(&self, race_id: u64) -> Option<&Race> {
        self.races.get(&race_id)
    }

    pub fn get_mut(&mut self, race_id: u64) -> Option<&mut Race> {
        self.races.get_mut(&race_id)
    }

    pub fn current(&self) -> Option<&Race> {
        self.races.get(&self.current_race_id)
    }

    pub fn races(&self) -> impl Iterator<Item = &Race> {
        self.races.values()
    }

    /// The sole admission rule: reuse the current race while it exists,
    /// is active and has room; otherwise mint the next one. Joiners are
    /// never rejected, only redirected.
    pub fn resolve_join_target(&mut self, now_ms: u64) -> JoinTarget {
        let reusable = self
            .current()
            .map(|race| race.is_active && race.member_count() < RACE_CAPACITY)
            .unwrap_or(false);
        if reusable {
            return JoinTarget {
                race_id: self.current_race_id,
                newly_created: false,
            };
        }

        JoinTarget {
            race_id: self.mint(now_ms),
            newly_created: true,
        }
    }

    /// Admin path: mints unconditionally. Last write wins on the current
    /// race id, matching the relaxed admission semantics.
    pub fn force_start(&mut self, now_ms: u64) -> u64 {
        self.mint(now_ms)
    }

    /// Evicts races past their retention window, active or not, and
    /// returns the reclaimed ids.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<u64> {
        let expired: Vec<u64> = self
            .races
            .values()
            .filter(|race| race.is_expired(now_ms))
            .map(|race| race.race_id)
            .collect();
        for race_id in &expired {
            self.races.remove(race_id);
            info!("cleaned up race {race_id}");
        }
        expired
    }

    fn mint(&mut self, now_ms: u64) -> u64 {
        self.current_race_id += 1;
        let race_id = self.current_race_id;
        self.races.insert(race_id, Race::new(race_id, now_ms));
        info!("started new race {race_id}");
        race_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{RACE_DURATION_MS, RACE_RETENTION_MS};

    fn join_and_admit(registry: &mut RaceRegistry, player_id: &str, now_ms: u64) -> JoinTarget {
        let target = registry.resolve_join_target(now_ms);
        registry
            .get_mut(target.race_id)
            .expect("join target exists")
            .admit(player_id, "conn", now_ms);
        target
    }

    #[test]
    fn first_join_mints_race_one() {
        let mut registry = RaceRegistry::new();
        assert_eq!(registry.current_race_id(), 0);
        assert!(registry.current().is_none());

        let target = registry.resolve_join_target(0);
        assert_eq!(target.race_id, 1);
        assert!(target.newly_created);
        assert_eq!(registry.current_race_id(), 1);
    }

    #[test]
    fn capacity_rollover_happens_on_the_fifty_first_join() {
        let mut registry = RaceRegistry::new();
        for index in 0..RACE_CAPACITY {
            let target = join_and_admit(&mut registry, &format!("p{index}"), 0);
            assert_eq!(target.race_id, 1);
            assert_eq!(target.newly_created, index == 0);
        }
        assert_eq!(
            registry.get(1).expect("race 1 exists").member_count(),
            RACE_CAPACITY
        );

        let target = join_and_admit(&mut registry, "p50", 0);
        assert_eq!(target.race_id, 2);
        assert!(target.newly_created);
        assert_eq!(
            registry.get(1).expect("race 1 still exists").member_count(),
            RACE_CAPACITY
        );
    }

    #[test]
    fn ended_race_is_not_reused() {
        let mut registry = RaceRegistry::new();
        join_and_admit(&mut registry, "a", 0);
        registry.get_mut(1).expect("race 1 exists").end();

        let target = registry.resolve_join_target(100);
        assert_eq!(target.race_id, 2);
        assert!(target.newly_created);
    }

    #[test]
    fn force_start_always_mints() {
        let mut registry = RaceRegistry::new();
        join_and_admit(&mut registry, "a", 0);
        assert_eq!(registry.current_race_id(), 1);

        let forced = registry.force_start(10);
        assert_eq!(forced, 2);
        assert_eq!(registry.current_race_id(), 2);

        // next joiner is rerouted to the forced race
        let target = registry.resolve_join_target(20);
        assert_eq!(target.race_id, 2);
        assert!(!target.newly_created);
    }

    #[test]
    fn sweep_evicts_past_retention_regardless_of_activity() {
        let mut registry = RaceRegistry::new();
        registry.resolve_join_target(0);
        let race = registry.get(1).expect("race 1 exists");
        assert!(race.is_active);

        let not_yet = RACE_DURATION_MS + RACE_RETENTION_MS;
        assert!(registry.sweep(not_yet).is_empty());

        let evicted = registry.sweep(not_yet + 1);
        assert_eq!(evicted, vec![1]);
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn sweep_matches_the_700_second_example() {
        let mut registry = RaceRegistry::new();
        let now = 1_000_000;
        // endTime == now - 700_000, well past the 600s retention window
        registry.resolve_join_target(now - 700_000 - RACE_DURATION_MS);
        assert_eq!(registry.sweep(now), vec![1]);
    }

    #[test]
    fn get_unknown_race_is_none() {
        let registry = RaceRegistry::new();
        assert!(registry.get(42).is_none());
    }
}
