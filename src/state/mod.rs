mod ballot;
mod collab;
mod lock;
mod phase;
mod registry;
mod sequence;
mod timer;

pub use ballot::Ballot;
pub use collab::{CollabSync, LedgerEntry};
pub use lock::LockArbiter;
pub use sequence::SequenceRound;
pub use timer::TimerService;

use crate::config::ServerConfig;
use crate::protocol::{Identity, ServerMessage, Snapshot};
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Who a server message is for. Each connection filters the shared broadcast
/// stream against its own role and (for team devices) identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    All,
    Operator,
    Team(TeamId),
    /// The sender's teammates, excluding the sender (typing mirrors).
    TeamOthers { team_id: TeamId, except: PlayerId },
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub msg: ServerMessage,
}

/// The authoritative session: every field here is shared, rapidly-changing
/// state that all three client roles must agree on.
pub struct Session {
    pub phase: Phase,
    pub teams: HashMap<TeamId, Team>,
    pub join_codes: HashMap<String, TeamId>,
    pub lock: LockArbiter,
    pub timer: TimerService,
    pub collab: CollabSync,
    pub sequence: SequenceRound,
    pub ballot: Ballot,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Lobby,
            teams: HashMap::new(),
            join_codes: HashMap::new(),
            lock: LockArbiter::default(),
            timer: TimerService::default(),
            collab: CollabSync::default(),
            sequence: SequenceRound::default(),
            ballot: Ballot::default(),
        }
    }
}

impl Session {
    pub fn scores(&self) -> HashMap<TeamId, i64> {
        self.teams.iter().map(|(id, t)| (id.clone(), t.score)).collect()
    }

    pub fn teams_info(&self) -> Vec<TeamInfo> {
        let mut info: Vec<TeamInfo> = self.teams.values().map(TeamInfo::from).collect();
        info.sort_by(|a, b| a.name.cmp(&b.name));
        info
    }

    /// Add points and record the instant the team reached its new score,
    /// which is the victory tie-break.
    pub fn award_points(&mut self, team_id: &str, points: i64, now: DateTime<Utc>) -> bool {
        match self.teams.get_mut(team_id) {
            Some(team) => {
                team.score += points;
                team.score_reached_at = now;
                true
            }
            None => false,
        }
    }

    pub fn score_update(&self) -> ServerMessage {
        ServerMessage::ScoreUpdate {
            scores: self.scores(),
            teams: self.teams_info(),
        }
    }

    pub fn identity_for(&self, team_id: &str, player_id: &str) -> Option<Identity> {
        let team = self.teams.get(team_id)?;
        let player = team.player(player_id)?;
        Some(Identity {
            team_id: team.id.clone(),
            player_id: player.id.clone(),
            team_name: team.name.clone(),
            player_name: player.name.clone(),
            join_code: team.join_code.clone(),
            color: team.color,
            players: team.players.iter().map(PlayerInfo::from).collect(),
        })
    }

    /// Full snapshot tailored to one recipient. Identity, drafts and the
    /// recipient's own freeze countdown are filled for team devices.
    pub fn snapshot_for(
        &self,
        identity: Option<(&str, &str)>,
        now: DateTime<Utc>,
    ) -> Snapshot {
        let (you, draft, submitted, freeze_remaining) = match identity {
            Some((team_id, player_id)) => {
                let round = self.phase.round_ref();
                let entry = round.and_then(|r| self.collab.entry(team_id, r));
                (
                    self.identity_for(team_id, player_id),
                    entry.map(|e| e.draft.clone()).filter(|d| !d.is_empty()),
                    entry.and_then(|e| e.submitted.clone()),
                    self.lock.freeze_remaining(team_id, now),
                )
            }
            None => (None, None, None, 0),
        };

        Snapshot {
            phase: self.phase.sanitized(),
            server_now: now.to_rfc3339(),
            scores: self.scores(),
            teams: self.teams_info(),
            lock: self.lock.holder().cloned(),
            freeze_remaining_seconds: freeze_remaining,
            timer: self.timer.snapshot(now),
            you,
            draft,
            submitted,
        }
    }
}

/// Shared application state. The `session` write guard is the single-writer
/// serialization point: every mutating command acquires it once, applies
/// fully, and emits its broadcasts before releasing, so concurrent inputs
/// resolve deterministically by lock-acquisition order.
pub struct AppState {
    pub session: RwLock<Session>,
    pub broadcast: broadcast::Sender<Envelope>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            session: RwLock::new(Session::default()),
            broadcast: tx,
            config,
        }
    }

    pub fn shared(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Send a targeted message. No receivers connected is fine.
    pub fn send(&self, audience: Audience, msg: ServerMessage) {
        let _ = self.broadcast.send(Envelope { audience, msg });
    }

    pub fn send_all(&self, msg: ServerMessage) {
        self.send(Audience::All, msg);
    }

    /// Snapshot for a connection, used on connect, rejoin and `request_sync`.
    pub async fn snapshot(&self, identity: Option<(&str, &str)>) -> Snapshot {
        self.session.read().await.snapshot_for(identity, Utc::now())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_session_snapshot() {
        let state = AppState::default();
        let snap = state.snapshot(None).await;
        assert_eq!(snap.phase, Phase::Lobby);
        assert!(snap.scores.is_empty());
        assert!(snap.lock.is_none());
        assert!(snap.you.is_none());
    }

    #[tokio::test]
    async fn award_points_tracks_reach_instant() {
        let state = AppState::default();
        state.create_team("Alpha", "Ada").await.unwrap();
        let team_id = {
            let session = state.session.read().await;
            session.teams.keys().next().unwrap().clone()
        };

        let t1 = Utc::now();
        {
            let mut session = state.session.write().await;
            assert!(session.award_points(&team_id, 50, t1));
        }
        let session = state.session.read().await;
        let team = session.teams.get(&team_id).unwrap();
        assert_eq!(team.score, 50);
        assert_eq!(team.score_reached_at, t1);
    }
}
