//! Ordering rounds where teams race to arrange items correctly.
//!
//! Finish position determines the award: first correct team gets the top
//! value, later correct teams work down the table, and a wrong order just
//! marks the team as having failed an attempt without locking them out.

use super::{AppState, Audience};
use crate::error::SessionError;
use crate::protocol::{SequenceTeamStatus, ServerMessage};
use crate::types::{Phase, RoundRef, TeamId};
use std::collections::HashMap;

/// Award by finish position; finishers past the table earn the last tier.
const POSITION_POINTS: [i64; 4] = [100, 75, 50, 25];

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceVerdict {
    Correct { position: usize, points: i64 },
    Incorrect,
    AlreadyWon { position: usize },
}

#[derive(Debug, Default)]
pub struct SequenceRound {
    round_ref: Option<RoundRef>,
    correct_order: Vec<usize>,
    /// Finish order; index = position - 1.
    winners: Vec<TeamId>,
    statuses: HashMap<TeamId, SequenceTeamStatus>,
}

impl SequenceRound {
    /// Phase transition hook: arms the round with its answer key.
    pub fn begin(&mut self, round_ref: RoundRef, correct_order: Vec<usize>) {
        self.round_ref = Some(round_ref);
        self.correct_order = correct_order;
        self.winners.clear();
        self.statuses.clear();
    }

    pub fn clear(&mut self) {
        self.round_ref = None;
        self.correct_order.clear();
        self.winners.clear();
        self.statuses.clear();
    }

    /// Check a team's order against the key. A team that already finished
    /// keeps its original position no matter what it submits afterwards.
    pub fn submit(
        &mut self,
        team_id: &str,
        round_ref: &str,
        order: &[usize],
    ) -> Result<SequenceVerdict, SessionError> {
        if self.round_ref.as_deref() != Some(round_ref) {
            return Err(SessionError::NoActiveRound);
        }
        if let Some(pos) = self.winners.iter().position(|t| t == team_id) {
            return Ok(SequenceVerdict::AlreadyWon { position: pos + 1 });
        }
        if order == self.correct_order {
            self.winners.push(team_id.to_string());
            let position = self.winners.len();
            self.statuses.insert(team_id.to_string(), SequenceTeamStatus::Winner);
            let points = POSITION_POINTS[(position - 1).min(POSITION_POINTS.len() - 1)];
            Ok(SequenceVerdict::Correct { position, points })
        } else {
            self.statuses.insert(team_id.to_string(), SequenceTeamStatus::Failed);
            Ok(SequenceVerdict::Incorrect)
        }
    }

    pub fn statuses(&self) -> &HashMap<TeamId, SequenceTeamStatus> {
        &self.statuses
    }
}

impl AppState {
    /// Mirror a teammate's drag order, same delivery rules as answer typing.
    pub async fn sequence_update(
        &self,
        team_id: &str,
        player_id: &str,
        order: Vec<usize>,
    ) -> Result<(), SessionError> {
        let session = self.session.write().await;
        if !matches!(session.phase, Phase::Sequencing { .. }) {
            return Err(SessionError::WrongPhase);
        }
        let team = session.teams.get(team_id).ok_or(SessionError::TeamNotFound)?;
        let player = team.player(player_id).ok_or(SessionError::PlayerNotFound)?;

        self.send(
            Audience::TeamOthers {
                team_id: team_id.to_string(),
                except: player.id.clone(),
            },
            ServerMessage::SequenceSync {
                order,
                from_player_id: player.id.clone(),
                from_player_name: player.name.clone(),
            },
        );
        Ok(())
    }

    /// Grade a sequence attempt server-side. The verdict goes to the team,
    /// the status board to everyone, scores only when points were earned.
    pub async fn submit_sequence(
        &self,
        team_id: &str,
        round_ref: &str,
        order: Vec<usize>,
    ) -> Result<(), SessionError> {
        let now = chrono::Utc::now();
        let mut session = self.session.write().await;
        let team_name = session
            .teams
            .get(team_id)
            .ok_or(SessionError::TeamNotFound)?
            .name
            .clone();

        let verdict = session.sequence.submit(team_id, round_ref, &order)?;

        let result = match &verdict {
            SequenceVerdict::Correct { position, points } => {
                tracing::info!(%team_name, position, points, "sequence solved");
                if *points != 0 {
                    session.award_points(team_id, *points, now);
                    self.send_all(session.score_update());
                }
                ServerMessage::SequenceResult {
                    correct: true,
                    points_awarded: *points,
                    finish_position: Some(*position),
                    message: format!("Correct! Finished #{position}"),
                }
            }
            SequenceVerdict::Incorrect => ServerMessage::SequenceResult {
                correct: false,
                points_awarded: 0,
                finish_position: None,
                message: "Not quite, keep trying".to_string(),
            },
            SequenceVerdict::AlreadyWon { position } => ServerMessage::SequenceResult {
                correct: true,
                points_awarded: 0,
                finish_position: Some(*position),
                message: format!("Already finished #{position}"),
            },
        };

        self.send(Audience::Team(team_id.to_string()), result);
        self.send_all(ServerMessage::SequenceStatus {
            team_statuses: session.sequence.statuses().clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed() -> SequenceRound {
        let mut round = SequenceRound::default();
        round.begin("s1".into(), vec![2, 0, 1, 3]);
        round
    }

    #[test]
    fn finish_positions_pay_down_the_table() {
        let mut round = armed();
        assert_eq!(
            round.submit("t1", "s1", &[2, 0, 1, 3]),
            Ok(SequenceVerdict::Correct { position: 1, points: 100 })
        );
        assert_eq!(
            round.submit("t2", "s1", &[2, 0, 1, 3]),
            Ok(SequenceVerdict::Correct { position: 2, points: 75 })
        );
        assert_eq!(
            round.submit("t3", "s1", &[2, 0, 1, 3]),
            Ok(SequenceVerdict::Correct { position: 3, points: 50 })
        );
    }

    #[test]
    fn wrong_order_fails_without_lockout() {
        let mut round = armed();
        assert_eq!(round.submit("t1", "s1", &[0, 1, 2, 3]), Ok(SequenceVerdict::Incorrect));
        assert_eq!(
            round.statuses().get("t1"),
            Some(&SequenceTeamStatus::Failed)
        );
        // Retry allowed.
        assert!(matches!(
            round.submit("t1", "s1", &[2, 0, 1, 3]),
            Ok(SequenceVerdict::Correct { position: 1, .. })
        ));
    }

    #[test]
    fn winners_keep_their_position_on_resubmit() {
        let mut round = armed();
        round.submit("t1", "s1", &[2, 0, 1, 3]).unwrap();
        assert_eq!(
            round.submit("t1", "s1", &[0, 1, 2, 3]),
            Ok(SequenceVerdict::AlreadyWon { position: 1 })
        );
    }

    #[test]
    fn late_finishers_earn_the_last_tier() {
        let mut round = armed();
        for team in ["t1", "t2", "t3", "t4"] {
            round.submit(team, "s1", &[2, 0, 1, 3]).unwrap();
        }
        assert_eq!(
            round.submit("t5", "s1", &[2, 0, 1, 3]),
            Ok(SequenceVerdict::Correct { position: 5, points: 25 })
        );
        assert_eq!(
            round.submit("t6", "s1", &[2, 0, 1, 3]),
            Ok(SequenceVerdict::Correct { position: 6, points: 25 })
        );
    }

    #[test]
    fn stale_round_rejected() {
        let mut round = armed();
        assert_eq!(
            round.submit("t1", "old", &[2, 0, 1, 3]),
            Err(SessionError::NoActiveRound)
        );
    }
}
