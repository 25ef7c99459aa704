//! Per-team, per-round collaborative submissions.
//!
//! Drafts are last-write-wins mirrors of whichever teammate typed most
//! recently; submissions may be overwritten any number of times until the
//! operator grades them, and grading is idempotent. Entries for past rounds
//! are retained for history but the active round moves with the phase.

use super::{AppState, Audience};
use crate::error::SessionError;
use crate::protocol::{PriceGuessResult, PriceGuessStatus, RevealedAnswer, ServerMessage};
use crate::types::{Phase, PlayerId, RoundRef, TeamId};
use std::collections::HashMap;

/// Price-round payouts by closeness rank.
const PRICE_TIERS: [i64; 4] = [100, 50, 25, 10];

/// Lenient numeric parse for price guesses ("$1,299.99" and the like).
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .replace(',', "");
    cleaned.trim().parse().ok()
}

#[derive(Debug, Clone, Default)]
pub struct LedgerEntry {
    pub draft: String,
    pub submitted: Option<String>,
    pub submitted_by: Option<(PlayerId, String)>,
    pub graded: bool,
    pub points_awarded: i64,
    /// Arrived after the phase moved on; kept, shown, never scored.
    pub out_of_round: bool,
}

#[derive(Debug, Default)]
pub struct CollabSync {
    active_round: Option<RoundRef>,
    entries: HashMap<(TeamId, RoundRef), LedgerEntry>,
}

impl CollabSync {
    /// Phase transition hook: history stays, new typing/submissions bind to
    /// the incoming round (or nothing, for phases without one).
    pub fn set_active_round(&mut self, round: Option<RoundRef>) {
        self.active_round = round;
    }

    pub fn active_round(&self) -> Option<&RoundRef> {
        self.active_round.as_ref()
    }

    /// Last-write-wins draft overwrite. Typing against a stale round is
    /// dropped: the round is over, there is nothing left to mirror.
    pub fn typing(&mut self, team_id: &str, round_ref: &str, text: String) -> bool {
        if self.active_round.as_deref() != Some(round_ref) {
            return false;
        }
        self.entry_mut(team_id, round_ref).draft = text;
        true
    }

    /// Store (or overwrite) a submission. Returns whether it was tagged
    /// out-of-round: a near-simultaneous submit racing a phase change is
    /// accepted rather than silently dropped, but cannot affect the new
    /// round's scoring.
    pub fn submit(
        &mut self,
        team_id: &str,
        round_ref: &str,
        value: String,
        by: (PlayerId, String),
    ) -> bool {
        let out_of_round = self.active_round.as_deref() != Some(round_ref);
        let entry = self.entry_mut(team_id, round_ref);
        entry.submitted = Some(value);
        entry.submitted_by = Some(by);
        entry.out_of_round = out_of_round;
        out_of_round
    }

    /// Idempotent grading: the first call decides, every later call is an
    /// "already graded" notice. Returns the points actually awarded.
    pub fn grade(
        &mut self,
        team_id: &str,
        round_ref: &str,
        correct: bool,
        points: i64,
    ) -> Result<i64, SessionError> {
        let entry = self.entry_mut(team_id, round_ref);
        if entry.graded {
            return Err(SessionError::AlreadyGraded);
        }
        entry.graded = true;
        let awarded = if correct && !entry.out_of_round { points } else { 0 };
        entry.points_awarded = awarded;
        Ok(awarded)
    }

    pub fn entry(&self, team_id: &str, round_ref: &str) -> Option<&LedgerEntry> {
        self.entries.get(&(team_id.to_string(), round_ref.to_string()))
    }

    pub fn round_entries(&self, round_ref: &str) -> Vec<(&TeamId, &LedgerEntry)> {
        self.entries
            .iter()
            .filter(|((_, r), _)| r == round_ref)
            .map(|((t, _), e)| (t, e))
            .collect()
    }

    fn entry_mut(&mut self, team_id: &str, round_ref: &str) -> &mut LedgerEntry {
        self.entries
            .entry((team_id.to_string(), round_ref.to_string()))
            .or_default()
    }
}

impl AppState {
    /// Mirror a draft to the typist's teammates only. Other teams and the
    /// display never see it. Coalescing rapid keystrokes is the client's job.
    pub async fn answer_typing(
        &self,
        team_id: &str,
        player_id: &str,
        round_ref: &str,
        text: String,
    ) -> Result<(), SessionError> {
        let mut session = self.session.write().await;
        let team = session.teams.get(team_id).ok_or(SessionError::TeamNotFound)?;
        let player = team.player(player_id).ok_or(SessionError::PlayerNotFound)?;
        let (from_id, from_name) = (player.id.clone(), player.name.clone());

        if !session.collab.typing(team_id, round_ref, text.clone()) {
            return Ok(());
        }

        self.send(
            Audience::TeamOthers {
                team_id: team_id.to_string(),
                except: from_id.clone(),
            },
            ServerMessage::AnswerSync {
                round_ref: round_ref.to_string(),
                text,
                from_player_id: from_id,
                from_player_name: from_name,
            },
        );
        Ok(())
    }

    /// Record a submission and tell the operator and the submitting team.
    /// Controls stay enabled: teams may change their answer until grading.
    pub async fn submit_answer(
        &self,
        team_id: &str,
        player_id: &str,
        round_ref: &str,
        value: String,
    ) -> Result<(), SessionError> {
        let mut session = self.session.write().await;
        let team = session.teams.get(team_id).ok_or(SessionError::TeamNotFound)?;
        let player = team.player(player_id).ok_or(SessionError::PlayerNotFound)?;
        let team_name = team.name.clone();
        let (pid, pname) = (player.id.clone(), player.name.clone());

        let out_of_round =
            session
                .collab
                .submit(team_id, round_ref, value.clone(), (pid.clone(), pname.clone()));
        if out_of_round {
            tracing::debug!(%team_name, round_ref, "submission tagged out-of-round");
        }

        let msg = ServerMessage::AnswerSubmitted {
            round_ref: round_ref.to_string(),
            team_id: team_id.to_string(),
            team_name,
            player_id: pid,
            player_name: pname,
            value,
            out_of_round,
        };
        self.send(Audience::Operator, msg.clone());
        self.send(Audience::Team(team_id.to_string()), msg);
        Ok(())
    }

    /// Grade a team's submission for a round. The second grading attempt for
    /// the same (team, round) is rejected with a notice and awards nothing.
    pub async fn grade_answer(
        &self,
        team_id: &str,
        round_ref: &str,
        correct: bool,
        points: i64,
    ) -> Result<(), SessionError> {
        let now = chrono::Utc::now();
        let mut session = self.session.write().await;
        if !session.teams.contains_key(team_id) {
            return Err(SessionError::TeamNotFound);
        }

        let awarded = session.collab.grade(team_id, round_ref, correct, points)?;
        if awarded != 0 {
            session.award_points(team_id, awarded, now);
            self.send_all(session.score_update());
        }

        self.send(
            Audience::Team(team_id.to_string()),
            ServerMessage::AnswerResult {
                round_ref: round_ref.to_string(),
                correct,
                points_awarded: awarded,
            },
        );
        Ok(())
    }

    /// Broadcast every team's submission for a round, typically alongside the
    /// operator revealing the correct answer on the display.
    pub async fn reveal_answers(&self, round_ref: &str) -> Result<(), SessionError> {
        let session = self.session.write().await;

        let correct_answer = match &session.phase {
            crate::types::Phase::ImageGuess { correct_answer, .. }
            | crate::types::Phase::PixelReveal { correct_answer, .. } => correct_answer.clone(),
            _ => None,
        };

        let mut answers: Vec<RevealedAnswer> = session
            .collab
            .round_entries(round_ref)
            .into_iter()
            .filter_map(|(team_id, entry)| {
                let team = session.teams.get(team_id)?;
                let value = entry.submitted.clone()?;
                Some(RevealedAnswer {
                    team_id: team.id.clone(),
                    team_name: team.name.clone(),
                    value,
                    player_name: entry
                        .submitted_by
                        .as_ref()
                        .map(|(_, name)| name.clone())
                        .unwrap_or_default(),
                    graded: entry.graded,
                    points_awarded: entry.points_awarded,
                })
            })
            .collect();
        answers.sort_by(|a, b| a.team_name.cmp(&b.team_name));

        self.send_all(ServerMessage::AnswerRevealed {
            round_ref: round_ref.to_string(),
            correct_answer,
            answers,
        });
        Ok(())
    }

    /// Close a price round: closest guess without going over wins, the top
    /// four non-bust guesses earn tiered points automatically, and everyone
    /// sees the full board. Grading the entries here makes the reveal
    /// idempotent; a repeat pays nothing.
    pub async fn reveal_price(
        &self,
        round_ref: &str,
        actual_price: Option<f64>,
    ) -> Result<(), SessionError> {
        let now = chrono::Utc::now();
        let mut session = self.session.write().await;

        let actual = actual_price
            .or(match &session.phase {
                Phase::PriceGuess { actual_price, .. } => *actual_price,
                _ => None,
            })
            .ok_or(SessionError::InvalidPrice)?;

        let mut guesses: Vec<PriceGuessResult> = session
            .collab
            .round_entries(round_ref)
            .into_iter()
            .filter_map(|(team_id, entry)| {
                let team = session.teams.get(team_id)?;
                let guess = parse_price(entry.submitted.as_deref()?)?;
                Some(PriceGuessResult {
                    team_id: team.id.clone(),
                    team_name: team.name.clone(),
                    guess,
                    player_name: entry
                        .submitted_by
                        .as_ref()
                        .map(|(_, name)| name.clone())
                        .unwrap_or_default(),
                    status: if guess > actual {
                        PriceGuessStatus::Bust
                    } else {
                        PriceGuessStatus::Valid
                    },
                    rank: None,
                    points_awarded: 0,
                })
            })
            .collect();
        if guesses.is_empty() {
            return Err(SessionError::NothingToReveal);
        }

        // Rank non-bust guesses by closeness, smallest gap first.
        let mut valid_order: Vec<usize> = guesses
            .iter()
            .enumerate()
            .filter(|(_, g)| g.status != PriceGuessStatus::Bust)
            .map(|(idx, _)| idx)
            .collect();
        valid_order.sort_by(|&a, &b| {
            (actual - guesses[a].guess)
                .partial_cmp(&(actual - guesses[b].guess))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut winner_team_id = None;
        let mut total_awarded = 0i64;
        for (pos, &idx) in valid_order.iter().enumerate() {
            guesses[idx].rank = Some(pos + 1);
            if pos == 0 {
                guesses[idx].status = PriceGuessStatus::Winner;
                winner_team_id = Some(guesses[idx].team_id.clone());
            }
            if pos < PRICE_TIERS.len() {
                let team_id = guesses[idx].team_id.clone();
                let awarded = session
                    .collab
                    .grade(&team_id, round_ref, true, PRICE_TIERS[pos])
                    .unwrap_or(0);
                guesses[idx].points_awarded = awarded;
                if awarded != 0 {
                    session.award_points(&team_id, awarded, now);
                    total_awarded += awarded;
                }
            }
        }
        for guess in guesses.iter().filter(|g| g.status == PriceGuessStatus::Bust) {
            let _ = session.collab.grade(&guess.team_id, round_ref, false, 0);
        }

        guesses.sort_by(|a, b| {
            a.guess.partial_cmp(&b.guess).unwrap_or(std::cmp::Ordering::Equal)
        });
        tracing::info!(round_ref, actual, total_awarded, "price revealed");

        if total_awarded != 0 {
            self.send_all(session.score_update());
        }
        self.send_all(ServerMessage::PriceRevealed {
            round_ref: round_ref.to_string(),
            actual_price: actual,
            winner_team_id,
            guesses,
            points_awarded: total_awarded,
        });
        Ok(())
    }
}
