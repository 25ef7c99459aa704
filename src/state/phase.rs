//! Phase transitions and the cancellation cascade they trigger.

use super::{AppState, Session};
use crate::protocol::{JudgeOutcome, ServerMessage};
use crate::types::{Phase, Standing};
use chrono::Utc;

/// Final leaderboard: score descending, ties broken by whoever reached the
/// score first, then by name so the order is stable.
pub fn standings(session: &Session) -> Vec<Standing> {
    let mut teams: Vec<_> = session.teams.values().collect();
    teams.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.score_reached_at.cmp(&b.score_reached_at))
            .then(a.name.cmp(&b.name))
    });
    teams
        .into_iter()
        .enumerate()
        .map(|(idx, team)| Standing {
            rank: idx as u32 + 1,
            team_id: team.id.clone(),
            team_name: team.name.clone(),
            score: team.score,
            color: team.color,
        })
        .collect()
}

impl AppState {
    /// Switch the session to a new phase. Transitions are unconditional and
    /// atomic: the lock, timer, sequence round and ballot are all reset under
    /// the same write guard that swaps the phase, then exactly one
    /// `state_change` goes out.
    pub async fn set_phase(&self, mut phase: Phase) {
        let now = Utc::now();
        let mut session = self.session.write().await;

        // An undecided buzz dies with its round.
        if let Some(holder) = session.lock.force_clear() {
            tracing::debug!(team = %holder.team_name, "lock cleared by phase change");
            self.send_all(ServerMessage::BuzzerReset {
                previous_team_id: Some(holder.team_id),
                previous_team_name: Some(holder.team_name),
                result: JudgeOutcome::Cleared,
                freeze_seconds: 0,
            });
        }
        session.timer.force_reset();
        session.sequence.clear();
        session.ballot.clear();

        match &phase {
            // Armed with the duration but not running; the operator starts
            // it with timer_control so clients get the ends_at broadcast.
            Phase::Timer { duration_seconds, .. } => {
                session.timer.reset(*duration_seconds);
            }
            Phase::Sequencing { round_ref, correct_order, .. } => {
                session.sequence.begin(round_ref.clone(), correct_order.clone());
            }
            _ => {}
        }
        if matches!(phase, Phase::Victory { .. }) {
            phase = Phase::Victory { standings: standings(&session) };
        }
        session.collab.set_active_round(phase.round_ref().cloned());
        session.phase = phase;
        tracing::info!(phase = session.phase.label(), "phase change");

        self.send_all(ServerMessage::StateChange {
            phase: session.phase.sanitized(),
            server_now: now.to_rfc3339(),
        });
    }
}
