use std::collections::HashMap;

use log::{debug, info};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::positions::PositionBoard;
use crate::registry::RaceRegistry;
use crate::server_utils::normalize_player_id;
use crate::sessions::{SessionBinding, SessionTable};
use crate::types::{LeaderboardResponse, PlayerPosition, RaceSummary};

#[derive(Clone, Debug)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

/// What to do with a client whose outbound queue is full. High-frequency
/// traffic (timers, position relays, leaderboard rebroadcasts) is
/// droppable; everything else disconnects the slow consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
}

/// The relay core: all races, sessions, broadcast channels and outbound
/// queues, mutated only behind one lock so handlers for the same race
/// never run concurrently.
pub struct RelayState {
    clients: HashMap<String, ClientContext>,
    registry: RaceRegistry,
    sessions: SessionTable,
    // race channel membership: connection ids subscribed per race
    channels: HashMap<u64, Vec<String>>,
    positions: PositionBoard,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            registry: RaceRegistry::new(),
            sessions: SessionTable::new(),
            channels: HashMap::new(),
            positions: PositionBoard::new(),
        }
    }

    pub fn register_client(&mut self, connection_id: &str, tx: mpsc::Sender<OutboundMessage>) {
        self.clients
            .insert(connection_id.to_string(), ClientContext { tx });
    }

    /// Routes a joiner to the current race (minting one on rollover),
    /// admits the player, binds the session and subscribes the channel.
    /// Emits `raceStarted` system-wide only when a race was minted, a
    /// private `joinedRace` ack and a `playerJoined` channel broadcast.
    pub fn on_join(&mut self, connection_id: &str, player_id: &str, address: &str, now_ms: u64) {
        let Some(player_id) = normalize_player_id(player_id) else {
            debug!("join from {connection_id} dropped: empty player id");
            return;
        };

        // A connection re-joining lands in the freshest race; its old
        // membership goes away with the binding.
        if let Some(previous) = self.sessions.resolve(connection_id).cloned() {
            self.leave_race(connection_id, &previous, true);
        }

        let target = self.registry.resolve_join_target(now_ms);
        let Some(race) = self.registry.get_mut(target.race_id) else {
            return;
        };
        race.admit(&player_id, connection_id, now_ms);
        let player_count = race.member_count();
        let start_time = race.start_time_ms;

        self.sessions.bind(
            connection_id,
            SessionBinding {
                player_id: player_id.clone(),
                race_id: target.race_id,
                address: address.to_string(),
            },
        );
        self.subscribe(target.race_id, connection_id);

        if target.newly_created {
            self.broadcast_all(
                &json!({
                    "type": "raceStarted",
                    "raceId": target.race_id,
                    "startTime": start_time,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }

        self.send_to_client(
            connection_id,
            &json!({
                "type": "joinedRace",
                "raceId": target.race_id,
                "playerCount": player_count,
            }),
            QueuePolicy::DisconnectOnFull,
        );
        self.broadcast_race(
            target.race_id,
            &json!({
                "type": "playerJoined",
                "playerId": player_id,
                "playerCount": player_count,
            }),
            QueuePolicy::DisconnectOnFull,
        );

        info!("player {player_id} joined race {}", target.race_id);
    }

    /// Last-write-wins height report plus a leaderboard rebroadcast.
    /// The raceId must match the connection's bound race; anything
    /// stale or mismatched is dropped without a client-visible error.
    pub fn on_height_update(
        &mut self,
        connection_id: &str,
        race_id: u64,
        player_id: &str,
        height: f64,
        now_ms: u64,
    ) {
        if !self.is_bound_to(connection_id, race_id) {
            debug!("height update from {connection_id} for race {race_id} dropped: not bound");
            return;
        }
        let Some(race) = self.registry.get_mut(race_id) else {
            debug!("height update for race {race_id} dropped: unknown race");
            return;
        };
        if !race.is_active {
            return;
        }
        race.report_height(player_id, height, now_ms);
        let leaderboard = race.leaderboard();

        self.broadcast_race(
            race_id,
            &json!({
                "type": "heightUpdate",
                "playerId": player_id,
                "height": height,
                "leaderboard": leaderboard,
            }),
            QueuePolicy::DropOnFull,
        );
    }

    /// Pure relay: no authoritative state changes, only a cosmetic
    /// rebroadcast to the race channel while the race is active.
    pub fn on_power_up(
        &mut self,
        connection_id: &str,
        race_id: u64,
        player_id: &str,
        power_up_type: &str,
        target_player_id: Option<&str>,
    ) {
        if !self.is_bound_to(connection_id, race_id) {
            debug!("power-up from {connection_id} for race {race_id} dropped: not bound");
            return;
        }
        let active = self
            .registry
            .get(race_id)
            .map(|race| race.is_active)
            .unwrap_or(false);
        if !active {
            debug!("power-up for race {race_id} dropped: race not active");
            return;
        }

        self.broadcast_race(
            race_id,
            &json!({
                "type": "powerUpApplied",
                "playerId": player_id,
                "targetPlayerId": target_player_id,
                "powerUpType": power_up_type,
            }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    /// Records the latest position and relays the whole set to the race
    /// channel for ghost rendering.
    pub fn on_player_position(
        &mut self,
        connection_id: &str,
        race_id: u64,
        position: PlayerPosition,
    ) {
        if !self.is_bound_to(connection_id, race_id) {
            debug!("position from {connection_id} for race {race_id} dropped: not bound");
            return;
        }
        let active = self
            .registry
            .get(race_id)
            .map(|race| race.is_active)
            .unwrap_or(false);
        if !active {
            return;
        }

        self.positions.upsert(race_id, position);
        let players = self.positions.snapshot(race_id);
        self.broadcast_race(
            race_id,
            &json!({
                "type": "playersPositions",
                "players": players,
            }),
            QueuePolicy::DropOnFull,
        );
    }

    /// A death is a terminal score report: the final score lands on the
    /// leaderboard and the ghost position disappears.
    pub fn on_player_died(
        &mut self,
        connection_id: &str,
        race_id: u64,
        player_id: &str,
        final_score: f64,
        now_ms: u64,
    ) {
        if !self.is_bound_to(connection_id, race_id) {
            debug!("death report from {connection_id} for race {race_id} dropped: not bound");
            return;
        }
        self.positions.remove_player(race_id, player_id);

        let Some(race) = self.registry.get_mut(race_id) else {
            return;
        };
        if !race.is_active {
            return;
        }
        race.report_height(player_id, final_score, now_ms);
        let leaderboard = race.leaderboard();

        self.broadcast_race(
            race_id,
            &json!({
                "type": "heightUpdate",
                "playerId": player_id,
                "height": final_score,
                "leaderboard": leaderboard,
            }),
            QueuePolicy::DropOnFull,
        );
    }

    /// Transport-level disconnect. Safe to call for connections that
    /// never joined, and idempotent.
    pub fn on_disconnect(&mut self, connection_id: &str) {
        self.clients.remove(connection_id);
        let Some(binding) = self.sessions.unbind(connection_id) else {
            return;
        };
        self.leave_race(connection_id, &binding, true);
        info!(
            "player {} disconnected from race {}",
            binding.player_id, binding.race_id
        );
    }

    /// One pass of the shared 1-second ticker: broadcasts the countdown
    /// for every active race and ends those whose clock reached zero.
    /// A single registry-wide ticker replaces per-race timers, so there
    /// is no per-race task to cancel on end or eviction.
    pub fn tick(&mut self, now_ms: u64) {
        let active: Vec<(u64, u64)> = self
            .registry
            .races()
            .filter(|race| race.is_active)
            .map(|race| (race.race_id, race.time_remaining_secs(now_ms)))
            .collect();

        for (race_id, time_remaining) in active {
            self.broadcast_race(
                race_id,
                &json!({
                    "type": "timer",
                    "timeRemaining": time_remaining,
                }),
                QueuePolicy::DropOnFull,
            );

            if time_remaining > 0 {
                continue;
            }
            let outcome = self
                .registry
                .get_mut(race_id)
                .and_then(|race| race.end());
            let Some(outcome) = outcome else {
                continue;
            };
            info!(
                "race {race_id} ended, winner: {}",
                outcome.winner.as_deref().unwrap_or("none")
            );
            self.broadcast_race(
                race_id,
                &json!({
                    "type": "raceEnded",
                    "raceId": outcome.race_id,
                    "winner": outcome.winner,
                    "finalLeaderboard": outcome.final_leaderboard,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }

    /// Periodic eviction of races past retention, plus their channel
    /// membership and ghost positions. Session bindings stay until the
    /// connection goes away; operations on an evicted race are no-ops.
    pub fn sweep(&mut self, now_ms: u64) {
        for race_id in self.registry.sweep(now_ms) {
            self.channels.remove(&race_id);
            self.positions.clear_race(race_id);
        }
    }

    /// Admin force-start: mints unconditionally and announces it.
    pub fn force_start(&mut self, now_ms: u64) -> u64 {
        let race_id = self.registry.force_start(now_ms);
        let start_time = self
            .registry
            .get(race_id)
            .map(|race| race.start_time_ms)
            .unwrap_or(now_ms);
        self.broadcast_all(
            &json!({
                "type": "raceStarted",
                "raceId": race_id,
                "startTime": start_time,
            }),
            QueuePolicy::DisconnectOnFull,
        );
        race_id
    }

    pub fn current_race_summary(&self) -> Option<RaceSummary> {
        self.registry.current().map(|race| race.summary())
    }

    pub fn leaderboard_response(&self, race_id: u64) -> Option<LeaderboardResponse> {
        self.registry.get(race_id).map(|race| LeaderboardResponse {
            race_id: race.race_id,
            leaderboard: race.leaderboard(),
            is_active: race.is_active,
            winner: race.winner.clone(),
        })
    }

    fn is_bound_to(&self, connection_id: &str, race_id: u64) -> bool {
        self.sessions
            .resolve(connection_id)
            .map(|binding| binding.race_id == race_id)
            .unwrap_or(false)
    }

    fn subscribe(&mut self, race_id: u64, connection_id: &str) {
        let members = self.channels.entry(race_id).or_default();
        if !members.iter().any(|member| member == connection_id) {
            members.push(connection_id.to_string());
        }
    }

    fn unsubscribe(&mut self, race_id: u64, connection_id: &str) {
        if let Some(members) = self.channels.get_mut(&race_id) {
            members.retain(|member| member != connection_id);
            if members.is_empty() {
                self.channels.remove(&race_id);
            }
        }
    }

    /// Removes a player from a race on leave or re-join, optionally
    /// announcing the new member count to the remaining channel.
    fn leave_race(&mut self, connection_id: &str, binding: &SessionBinding, announce: bool) {
        self.unsubscribe(binding.race_id, connection_id);
        self.positions
            .remove_player(binding.race_id, &binding.player_id);

        let Some(race) = self.registry.get_mut(binding.race_id) else {
            return;
        };
        if !race.contains(&binding.player_id) {
            return;
        }
        race.remove(&binding.player_id);
        let player_count = race.member_count();

        if announce {
            self.broadcast_race(
                binding.race_id,
                &json!({
                    "type": "playerLeft",
                    "playerId": binding.player_id,
                    "playerCount": player_count,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }

    fn send_to_client(&mut self, connection_id: &str, message: &Value, policy: QueuePolicy) {
        let send_failed = if let Some(client) = self.clients.get(connection_id) {
            client
                .tx
                .try_send(OutboundMessage::Text(message.to_string()))
                .is_err()
        } else {
            false
        };
        if send_failed && policy == QueuePolicy::DisconnectOnFull {
            self.drop_client(connection_id);
        }
    }

    fn broadcast_all(&mut self, message: &Value, policy: QueuePolicy) {
        let connection_ids: Vec<String> = self.clients.keys().cloned().collect();
        self.deliver(&connection_ids, message, policy);
    }

    fn broadcast_race(&mut self, race_id: u64, message: &Value, policy: QueuePolicy) {
        let Some(members) = self.channels.get(&race_id).cloned() else {
            return;
        };
        self.deliver(&members, message, policy);
    }

    fn deliver(&mut self, connection_ids: &[String], message: &Value, policy: QueuePolicy) {
        let payload = message.to_string();
        let mut failed = Vec::new();
        for connection_id in connection_ids {
            let Some(client) = self.clients.get(connection_id) else {
                continue;
            };
            if client
                .tx
                .try_send(OutboundMessage::Text(payload.clone()))
                .is_err()
                && policy == QueuePolicy::DisconnectOnFull
            {
                failed.push(connection_id.clone());
            }
        }
        for connection_id in failed {
            self.drop_client(&connection_id);
        }
    }

    /// Tears a slow or dead client down without re-broadcasting into
    /// the fan-out that failed.
    fn drop_client(&mut self, connection_id: &str) {
        if let Some(client) = self.clients.remove(connection_id) {
            let _ = client.tx.try_send(OutboundMessage::Close {
                code: 1008,
                reason: "outbound queue overflow".to_string(),
            });
        }
        if let Some(binding) = self.sessions.unbind(connection_id) {
            self.leave_race(connection_id, &binding, false);
        }
    }
}
