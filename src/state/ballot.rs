//! Two-option voting rounds.
//!
//! Players vote individually; on reveal, teams whose voters leaned with the
//! room-wide majority split the spoils. An overall tie pays nobody.

use super::{AppState, Audience};
use crate::error::SessionError;
use crate::protocol::{ServerMessage, VoteCounts};
use crate::types::{Phase, PlayerId, TeamId};
use std::collections::HashMap;

const MAJORITY_POINTS: i64 = 100;

#[derive(Debug, Default)]
pub struct Ballot {
    /// Latest vote per player; re-voting overwrites.
    votes: HashMap<PlayerId, (TeamId, String)>,
    revealed: bool,
}

impl Ballot {
    pub fn clear(&mut self) {
        self.votes.clear();
        self.revealed = false;
    }

    /// Record a vote, normalized to "A"/"B". Re-votes replace silently until
    /// the reveal, after which the ballot is closed.
    pub fn cast(
        &mut self,
        player_id: &str,
        team_id: &str,
        vote: &str,
    ) -> Result<(), SessionError> {
        if self.revealed {
            return Err(SessionError::WrongPhase);
        }
        let normalized = vote.trim().to_uppercase();
        if normalized != "A" && normalized != "B" {
            return Err(SessionError::InvalidVote);
        }
        self.votes
            .insert(player_id.to_string(), (team_id.to_string(), normalized));
        Ok(())
    }

    pub fn counts(&self) -> VoteCounts {
        let mut counts = VoteCounts::default();
        for (_, vote) in self.votes.values() {
            match vote.as_str() {
                "A" => counts.a += 1,
                _ => counts.b += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Close the ballot. Returns the winning option (None on a tie) and the
    /// teams whose own voters leaned toward it.
    pub fn reveal(&mut self) -> (Option<String>, VoteCounts, Vec<TeamId>) {
        self.revealed = true;
        let counts = self.counts();
        let majority = match counts.a.cmp(&counts.b) {
            std::cmp::Ordering::Greater => Some("A".to_string()),
            std::cmp::Ordering::Less => Some("B".to_string()),
            std::cmp::Ordering::Equal => None,
        };

        let winners = match &majority {
            Some(side) => {
                let mut per_team: HashMap<&TeamId, (usize, usize)> = HashMap::new();
                for (team_id, vote) in self.votes.values() {
                    let tally = per_team.entry(team_id).or_default();
                    if vote == side {
                        tally.0 += 1;
                    } else {
                        tally.1 += 1;
                    }
                }
                let mut aligned: Vec<TeamId> = per_team
                    .into_iter()
                    .filter(|(_, (with, against))| with > against)
                    .map(|(team_id, _)| team_id.clone())
                    .collect();
                aligned.sort();
                aligned
            }
            None => Vec::new(),
        };

        (majority, counts, winners)
    }
}

impl AppState {
    /// A player casts or changes their vote; running totals go to everyone,
    /// who voted what stays hidden until the reveal.
    pub async fn cast_vote(
        &self,
        team_id: &str,
        player_id: &str,
        vote: &str,
    ) -> Result<(), SessionError> {
        let mut session = self.session.write().await;
        if !matches!(session.phase, Phase::BinaryChoice { .. }) {
            return Err(SessionError::WrongPhase);
        }
        if !session.teams.contains_key(team_id) {
            return Err(SessionError::TeamNotFound);
        }

        session.ballot.cast(player_id, team_id, vote)?;

        self.send_all(ServerMessage::VoteUpdate {
            counts: session.ballot.counts(),
            total_votes: session.ballot.total(),
        });
        Ok(())
    }

    /// Operator closes the ballot: majority teams are paid, everyone sees the
    /// outcome. Revealing an empty ballot is rejected.
    pub async fn reveal_votes(&self) -> Result<(), SessionError> {
        let now = chrono::Utc::now();
        let mut session = self.session.write().await;
        if session.ballot.is_empty() {
            return Err(SessionError::NothingToReveal);
        }

        let (majority, counts, teams_awarded) = session.ballot.reveal();
        let is_tie = majority.is_none();
        for team_id in &teams_awarded {
            session.award_points(team_id, MAJORITY_POINTS, now);
        }
        if !teams_awarded.is_empty() {
            self.send_all(session.score_update());
        }
        tracing::info!(?majority, awarded = teams_awarded.len(), "votes revealed");

        self.send(
            Audience::All,
            ServerMessage::VoteRevealed {
                majority,
                counts,
                teams_awarded,
                points_value: MAJORITY_POINTS,
                is_tie,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_normalize_and_overwrite() {
        let mut ballot = Ballot::default();
        ballot.cast("p1", "t1", " a ").unwrap();
        assert_eq!(ballot.counts(), VoteCounts { a: 1, b: 0 });
        ballot.cast("p1", "t1", "B").unwrap();
        assert_eq!(ballot.counts(), VoteCounts { a: 0, b: 1 });
        assert_eq!(ballot.total(), 1);
    }

    #[test]
    fn rejects_anything_but_a_or_b() {
        let mut ballot = Ballot::default();
        assert_eq!(ballot.cast("p1", "t1", "C"), Err(SessionError::InvalidVote));
        assert_eq!(ballot.cast("p1", "t1", ""), Err(SessionError::InvalidVote));
    }

    #[test]
    fn majority_pays_aligned_teams() {
        let mut ballot = Ballot::default();
        ballot.cast("p1", "t1", "A").unwrap();
        ballot.cast("p2", "t1", "A").unwrap();
        ballot.cast("p3", "t2", "A").unwrap();
        ballot.cast("p4", "t2", "B").unwrap();
        ballot.cast("p5", "t3", "B").unwrap();

        let (majority, counts, winners) = ballot.reveal();
        assert_eq!(majority.as_deref(), Some("A"));
        assert_eq!(counts, VoteCounts { a: 3, b: 2 });
        // t1 leaned A, t2 split evenly, t3 leaned B.
        assert_eq!(winners, vec!["t1".to_string()]);
    }

    #[test]
    fn tie_pays_nobody() {
        let mut ballot = Ballot::default();
        ballot.cast("p1", "t1", "A").unwrap();
        ballot.cast("p2", "t2", "B").unwrap();
        let (majority, _, winners) = ballot.reveal();
        assert!(majority.is_none());
        assert!(winners.is_empty());
    }

    #[test]
    fn closed_ballot_rejects_late_votes() {
        let mut ballot = Ballot::default();
        ballot.cast("p1", "t1", "A").unwrap();
        ballot.reveal();
        assert_eq!(ballot.cast("p2", "t2", "B"), Err(SessionError::WrongPhase));
    }
}
