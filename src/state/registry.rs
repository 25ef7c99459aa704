//! Team and player lifecycle: creation, joining, rejoin, presence, kicks.

use super::{AppState, Audience, Session};
use crate::error::SessionError;
use crate::protocol::{Identity, ServerMessage};
use crate::types::{Phase, Player, PlayerInfo, Team, TEAM_COLORS};
use chrono::Utc;
use rand::Rng;
use ulid::Ulid;

/// Join-code alphabet with the usual lookalikes (I, L, O, 0, 1) removed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 4;
const NAME_MAX: usize = 20;

fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > NAME_MAX {
        return None;
    }
    Some(trimmed.to_string())
}

fn generate_join_code(session: &Session) -> String {
    let mut rng = rand::rng();
    loop {
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        if !session.join_codes.contains_key(&code) {
            return code;
        }
    }
}

/// Lowest unused palette index, wrapping once all eight are taken.
fn pick_color(session: &Session) -> u8 {
    for idx in 1..=TEAM_COLORS.len() as u8 {
        if !session.teams.values().any(|t| t.color == idx) {
            return idx;
        }
    }
    (session.teams.len() % TEAM_COLORS.len()) as u8 + 1
}

impl AppState {
    /// Create a team with its founding player. The caller gets back the
    /// credentials to store for rejoin; everyone else sees the roster grow.
    pub async fn create_team(
        &self,
        team_name: &str,
        player_name: &str,
    ) -> Result<Identity, SessionError> {
        let team_name = clean_name(team_name).ok_or(SessionError::BadTeamName)?;
        let player_name = clean_name(player_name).ok_or(SessionError::BadPlayerName)?;
        let now = Utc::now();
        let mut session = self.session.write().await;

        let taken = session
            .teams
            .values()
            .any(|t| t.name.eq_ignore_ascii_case(&team_name));
        if taken {
            return Err(SessionError::TeamNameTaken);
        }

        let team_id = Ulid::new().to_string();
        let player_id = Ulid::new().to_string();
        let join_code = generate_join_code(&session);
        let color = pick_color(&session);

        let team = Team {
            id: team_id.clone(),
            name: team_name.clone(),
            join_code: join_code.clone(),
            color,
            avatar: None,
            players: vec![Player {
                id: player_id.clone(),
                name: player_name,
                connected: true,
                last_seen: Some(now),
            }],
            score: 0,
            score_reached_at: now,
            eliminated: false,
        };
        session.join_codes.insert(join_code, team_id.clone());
        session.teams.insert(team_id.clone(), team);
        tracing::info!(%team_name, %team_id, "team created");

        self.send_all(session.score_update());
        session
            .identity_for(&team_id, &player_id)
            .ok_or(SessionError::TeamNotFound)
    }

    /// Join an existing team by its 4-character code.
    pub async fn join_team(
        &self,
        join_code: &str,
        player_name: &str,
    ) -> Result<Identity, SessionError> {
        let player_name = clean_name(player_name).ok_or(SessionError::BadPlayerName)?;
        let code = join_code.trim().to_uppercase();
        let now = Utc::now();
        let mut session = self.session.write().await;

        let team_id = session
            .join_codes
            .get(&code)
            .ok_or(SessionError::UnknownJoinCode)?
            .clone();
        let team = session
            .teams
            .get_mut(&team_id)
            .ok_or(SessionError::UnknownJoinCode)?;
        if team
            .players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&player_name))
        {
            return Err(SessionError::PlayerNameTaken);
        }

        let player_id = Ulid::new().to_string();
        team.players.push(Player {
            id: player_id.clone(),
            name: player_name.clone(),
            connected: true,
            last_seen: Some(now),
        });
        let roster: Vec<PlayerInfo> = team.players.iter().map(PlayerInfo::from).collect();
        tracing::info!(%player_name, team = %team.name, "player joined");

        self.send(
            Audience::TeamOthers {
                team_id: team_id.clone(),
                except: player_id.clone(),
            },
            ServerMessage::PlayerJoined {
                player_id: player_id.clone(),
                player_name,
                players: roster,
            },
        );
        self.send_all(session.score_update());
        session
            .identity_for(&team_id, &player_id)
            .ok_or(SessionError::TeamNotFound)
    }

    /// Stored-credential resume. Idempotent: rejoining while already marked
    /// connected succeeds and simply refreshes presence.
    pub async fn rejoin(
        &self,
        team_id: &str,
        player_id: &str,
    ) -> Result<Identity, SessionError> {
        let now = Utc::now();
        let mut session = self.session.write().await;
        let team = session
            .teams
            .get_mut(team_id)
            .ok_or(SessionError::StaleCredentials)?;
        let player = team
            .player_mut(player_id)
            .ok_or(SessionError::StaleCredentials)?;
        player.connected = true;
        player.last_seen = Some(now);
        let player_name = player.name.clone();
        tracing::info!(%player_name, team = %team.name, "player rejoined");

        session
            .identity_for(team_id, player_id)
            .ok_or(SessionError::StaleCredentials)
    }

    /// Presence ping from a connected device.
    pub async fn heartbeat(&self, team_id: &str, player_id: &str) {
        let mut session = self.session.write().await;
        if let Some(team) = session.teams.get_mut(team_id) {
            if let Some(player) = team.player_mut(player_id) {
                player.connected = true;
                player.last_seen = Some(Utc::now());
            }
        }
    }

    /// Mark players disconnected when their heartbeat has gone quiet. Their
    /// identity and team survive; only the presence flag flips.
    pub async fn sweep_presence(&self) {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.heartbeat_timeout_seconds as i64);
        let mut session = self.session.write().await;
        let mut changed = false;
        for team in session.teams.values_mut() {
            for player in &mut team.players {
                if player.connected && player.last_seen.is_some_and(|seen| seen < cutoff) {
                    player.connected = false;
                    changed = true;
                    tracing::debug!(player = %player.name, "presence timed out");
                }
            }
        }
        if changed {
            self.send_all(session.score_update());
        }
    }

    pub async fn select_avatar(
        &self,
        team_id: &str,
        avatar_id: &str,
    ) -> Result<(), SessionError> {
        let mut session = self.session.write().await;
        let team = session
            .teams
            .get_mut(team_id)
            .ok_or(SessionError::TeamNotFound)?;
        team.avatar = Some(avatar_id.to_string());

        self.send_all(ServerMessage::AvatarUpdated {
            team_id: team_id.to_string(),
            avatar_id: avatar_id.to_string(),
        });
        Ok(())
    }

    /// Operator marks a team in or out of an elimination round.
    pub async fn toggle_elimination(
        &self,
        team_id: &str,
        eliminated: bool,
    ) -> Result<(), SessionError> {
        let mut session = self.session.write().await;
        let team = session
            .teams
            .get_mut(team_id)
            .ok_or(SessionError::TeamNotFound)?;
        team.eliminated = eliminated;
        let team_name = team.name.clone();
        let remaining = session.teams.values().filter(|t| !t.eliminated).count();

        self.send_all(ServerMessage::EliminationUpdate {
            team_id: team_id.to_string(),
            team_name,
            eliminated,
            remaining_teams: remaining,
        });
        self.send_all(session.score_update());
        Ok(())
    }

    /// Manual score adjustment, positive or negative.
    pub async fn add_points(
        &self,
        team_id: &str,
        points: i64,
        reason: &str,
    ) -> Result<(), SessionError> {
        let now = Utc::now();
        let mut session = self.session.write().await;
        if !session.award_points(team_id, points, now) {
            return Err(SessionError::TeamNotFound);
        }
        tracing::info!(%team_id, points, reason, "manual point adjustment");
        self.send_all(session.score_update());
        Ok(())
    }

    /// Remove a team entirely. Its devices are told first so they can fall
    /// back to the registration screen.
    pub async fn kick_team(&self, team_id: &str) -> Result<(), SessionError> {
        let mut session = self.session.write().await;
        let team = session
            .teams
            .remove(team_id)
            .ok_or(SessionError::TeamNotFound)?;
        session.join_codes.remove(&team.join_code);
        tracing::info!(team = %team.name, "team kicked");

        self.send(
            Audience::Team(team_id.to_string()),
            ServerMessage::TeamKicked {
                message: "Your team was removed by the host".to_string(),
            },
        );
        self.send_all(session.score_update());
        Ok(())
    }

    /// Back to a fresh lobby. `preserve_teams` keeps the roster with scores
    /// zeroed; otherwise the registry empties too.
    pub async fn reset_game(&self, preserve_teams: bool) {
        let now = Utc::now();
        let mut session = self.session.write().await;

        session.phase = Phase::Lobby;
        session.lock.force_clear();
        session.timer.force_reset();
        session.collab.set_active_round(None);
        session.sequence.clear();
        session.ballot.clear();

        if preserve_teams {
            for team in session.teams.values_mut() {
                team.score = 0;
                team.score_reached_at = now;
                team.eliminated = false;
            }
        } else {
            session.teams.clear();
            session.join_codes.clear();
        }
        tracing::info!(preserve_teams, "game reset");

        self.send_all(ServerMessage::StateChange {
            phase: Phase::Lobby,
            server_now: now.to_rfc3339(),
        });
        self.send_all(session.score_update());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_join_by_code() {
        let state = AppState::default();
        let creator = state.create_team("Alpha", "Ada").await.unwrap();
        assert_eq!(creator.join_code.len(), CODE_LEN);
        assert_eq!(creator.color, 1);

        let joiner = state.join_team(&creator.join_code, "Grace").await.unwrap();
        assert_eq!(joiner.team_id, creator.team_id);
        assert_eq!(joiner.players.len(), 2);
    }

    #[tokio::test]
    async fn join_code_is_case_insensitive() {
        let state = AppState::default();
        let creator = state.create_team("Alpha", "Ada").await.unwrap();
        let lowered = creator.join_code.to_lowercase();
        assert!(state.join_team(&lowered, "Grace").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_names_rejected() {
        let state = AppState::default();
        let creator = state.create_team("Alpha", "Ada").await.unwrap();

        assert_eq!(
            state.create_team("alpha", "Bob").await.unwrap_err(),
            SessionError::TeamNameTaken
        );
        assert_eq!(
            state.join_team(&creator.join_code, "ADA").await.unwrap_err(),
            SessionError::PlayerNameTaken
        );
    }

    #[tokio::test]
    async fn name_length_enforced() {
        let state = AppState::default();
        assert_eq!(
            state.create_team("   ", "Ada").await.unwrap_err(),
            SessionError::BadTeamName
        );
        assert_eq!(
            state.create_team("Alpha", &"x".repeat(21)).await.unwrap_err(),
            SessionError::BadPlayerName
        );
    }

    #[tokio::test]
    async fn colors_assigned_lowest_unused() {
        let state = AppState::default();
        let a = state.create_team("Alpha", "Ada").await.unwrap();
        let b = state.create_team("Bravo", "Bob").await.unwrap();
        assert_eq!(a.color, 1);
        assert_eq!(b.color, 2);

        state.kick_team(&a.team_id).await.unwrap();
        let c = state.create_team("Charlie", "Cam").await.unwrap();
        assert_eq!(c.color, 1);
    }

    #[tokio::test]
    async fn rejoin_is_idempotent() {
        let state = AppState::default();
        let id = state.create_team("Alpha", "Ada").await.unwrap();

        let first = state.rejoin(&id.team_id, &id.player_id).await.unwrap();
        let second = state.rejoin(&id.team_id, &id.player_id).await.unwrap();
        assert_eq!(first.player_id, second.player_id);
        assert_eq!(first.team_id, second.team_id);

        assert_eq!(
            state.rejoin("gone", "gone").await.unwrap_err(),
            SessionError::StaleCredentials
        );
    }

    #[tokio::test]
    async fn kicked_team_frees_its_join_code() {
        let state = AppState::default();
        let id = state.create_team("Alpha", "Ada").await.unwrap();
        state.kick_team(&id.team_id).await.unwrap();

        assert_eq!(
            state.join_team(&id.join_code, "Grace").await.unwrap_err(),
            SessionError::UnknownJoinCode
        );
        assert_eq!(
            state.rejoin(&id.team_id, &id.player_id).await.unwrap_err(),
            SessionError::StaleCredentials
        );
    }

    #[tokio::test]
    async fn reset_preserving_teams_zeroes_scores() {
        let state = AppState::default();
        let id = state.create_team("Alpha", "Ada").await.unwrap();
        state.add_points(&id.team_id, 150, "test").await.unwrap();

        state.reset_game(true).await;
        let session = state.session.read().await;
        let team = session.teams.get(&id.team_id).unwrap();
        assert_eq!(team.score, 0);
        assert_eq!(session.phase, Phase::Lobby);
    }

    #[tokio::test]
    async fn full_reset_clears_registry() {
        let state = AppState::default();
        state.create_team("Alpha", "Ada").await.unwrap();
        state.reset_game(false).await;
        let session = state.session.read().await;
        assert!(session.teams.is_empty());
        assert!(session.join_codes.is_empty());
    }
}
