//! First-claim-wins lock with a timed cooldown penalty.
//!
//! One arbiter instance serves every buzz-style phase; a phase transition
//! force-clears it, so no lock outlives the round it was claimed in.

use super::{AppState, Audience};
use crate::error::SessionError;
use crate::protocol::{JudgeOutcome, LockedBy, ServerMessage};
use crate::types::TeamId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct LockArbiter {
    holder: Option<LockedBy>,
    claimed_at: Option<DateTime<Utc>>,
    frozen: HashMap<TeamId, DateTime<Utc>>,
}

impl LockArbiter {
    /// First claim wins: accepted only when no holder exists and the team is
    /// not serving a penalty. The server-side expiry check is authoritative;
    /// a client-side countdown rounding discrepancy changes nothing here.
    pub fn claim(&mut self, claimant: LockedBy, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.holder.is_some() {
            return Err(SessionError::LockHeld);
        }
        let remaining = self.freeze_remaining(&claimant.team_id, now);
        if remaining > 0 {
            return Err(SessionError::LockFrozen { remaining_seconds: remaining });
        }
        self.holder = Some(claimant);
        self.claimed_at = Some(now);
        Ok(())
    }

    /// Clear the holder after a judgment. An incorrect answer freezes the
    /// ex-holder until `now + freeze_seconds`.
    pub fn release(
        &mut self,
        correct: bool,
        now: DateTime<Utc>,
        freeze_seconds: u64,
    ) -> Option<LockedBy> {
        let previous = self.holder.take();
        self.claimed_at = None;
        if !correct {
            if let Some(prev) = &previous {
                self.frozen.insert(
                    prev.team_id.clone(),
                    now + Duration::seconds(freeze_seconds as i64),
                );
            }
        }
        previous
    }

    /// Phase-change cancellation: holder and penalties gone, unconditionally.
    pub fn force_clear(&mut self) -> Option<LockedBy> {
        self.frozen.clear();
        self.claimed_at = None;
        self.holder.take()
    }

    pub fn holder(&self) -> Option<&LockedBy> {
        self.holder.as_ref()
    }

    /// Whole seconds left on a team's penalty, 0 when not frozen. Expired
    /// entries are lazily dropped.
    pub fn freeze_remaining(&self, team_id: &str, now: DateTime<Utc>) -> u64 {
        match self.frozen.get(team_id) {
            Some(expiry) if *expiry > now => (*expiry - now).num_seconds().max(1) as u64,
            _ => 0,
        }
    }
}

impl AppState {
    /// A team device races for the lock. Exactly one concurrent claimant
    /// wins; the rest observe the winner via the `buzzer_locked` broadcast.
    pub async fn press_buzzer(
        &self,
        team_id: &str,
        player_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let now = Utc::now();
        let mut session = self.session.write().await;

        if !session.phase.uses_lock() {
            return Err(SessionError::WrongPhase);
        }
        let team = session.teams.get(team_id).ok_or(SessionError::TeamNotFound)?;
        let player = player_id.and_then(|pid| team.player(pid));
        let claimant = LockedBy {
            team_id: team.id.clone(),
            team_name: team.name.clone(),
            player_id: player.map(|p| p.id.clone()),
            player_name: player.map(|p| p.name.clone()),
        };

        session.lock.claim(claimant.clone(), now)?;
        tracing::info!(team = %claimant.team_name, "buzzer locked");
        self.send_all(ServerMessage::BuzzerLocked { locked_by: claimant });
        Ok(())
    }

    /// Operator judges the held buzz. Correct: award points, reopen the lock.
    /// Incorrect: reopen for everyone else while the ex-holder serves a
    /// penalty it is told about privately.
    pub async fn judge_buzz(
        &self,
        team_id: &str,
        correct: bool,
        points: i64,
        freeze_seconds: Option<u64>,
    ) -> Result<(), SessionError> {
        let now = Utc::now();
        let freeze = freeze_seconds.unwrap_or(self.config.default_freeze_seconds);
        let mut session = self.session.write().await;

        if !session.phase.uses_lock() {
            return Err(SessionError::WrongPhase);
        }

        let previous = session.lock.release(correct, now, freeze);

        if correct && points != 0 {
            session.award_points(team_id, points, now);
            self.send_all(session.score_update());
        }

        let freeze_broadcast = if correct { 0 } else { freeze };
        if !correct {
            self.send(
                Audience::Team(team_id.to_string()),
                ServerMessage::BuzzerLockout {
                    freeze_seconds: freeze,
                    message: format!("Frozen for {freeze} seconds"),
                },
            );
        }

        self.send_all(ServerMessage::BuzzerReset {
            previous_team_id: previous.as_ref().map(|p| p.team_id.clone()),
            previous_team_name: previous.as_ref().map(|p| p.team_name.clone()),
            result: if correct { JudgeOutcome::Correct } else { JudgeOutcome::Incorrect },
            freeze_seconds: freeze_broadcast,
        });
        Ok(())
    }
}
