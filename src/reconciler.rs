//! Client-side view reconciliation.
//!
//! A client mirrors session state from two sources: full snapshots
//! (`sync_state`) and incremental deltas (everything else). This state
//! machine keeps the mirror consistent across connects, reloads and missed
//! messages: deltas that arrive before the first snapshot are buffered, a
//! snapshot is applied atomically, and buffered deltas that refer to a round
//! the snapshot already superseded are discarded instead of replayed.
//!
//! Server code does not use this module; it exists for native client builds
//! and as the executable definition of how clients are expected to resync.

use crate::protocol::{LockedBy, ServerMessage, TimerStatus};
use crate::types::{Phase, TeamId, TeamInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug)]
enum SyncPhase {
    Disconnected,
    /// Connected, waiting for the first `sync_state`; deltas queue up.
    AwaitingSnapshot { buffered: Vec<ServerMessage> },
    Live,
}

/// The reconciled local mirror of session state.
#[derive(Debug, Default, Clone)]
pub struct ClientView {
    pub phase: Option<Phase>,
    pub scores: HashMap<TeamId, i64>,
    pub teams: Vec<TeamInfo>,
    pub lock: Option<LockedBy>,
    pub timer_status: Option<TimerStatus>,
    pub timer_total: u64,
    /// Absolute end instant while the timer runs; remaining time is always
    /// recomputed from this, never counted down locally.
    pub timer_ends_at: Option<DateTime<Utc>>,
    /// Fixed remaining value for paused/stopped timers.
    pub timer_fixed_remaining: u64,
    pub freeze_remaining_seconds: u64,
    pub draft: Option<String>,
    pub submitted: Option<String>,
}

impl ClientView {
    /// Remaining whole seconds at `now`, clamped to zero.
    pub fn timer_remaining(&self, now: DateTime<Utc>) -> u64 {
        match self.timer_ends_at {
            Some(end) if end > now => (end - now).num_seconds() as u64,
            Some(_) => 0,
            None => self.timer_fixed_remaining,
        }
    }
}

#[derive(Debug)]
pub struct ClientReconciler {
    sync: SyncPhase,
    view: ClientView,
}

impl Default for ClientReconciler {
    fn default() -> Self {
        Self { sync: SyncPhase::Disconnected, view: ClientView::default() }
    }
}

impl ClientReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        matches!(self.sync, SyncPhase::Live)
    }

    pub fn view(&self) -> &ClientView {
        &self.view
    }

    /// Transport opened; nothing is trusted until a snapshot lands.
    pub fn connected(&mut self) {
        self.sync = SyncPhase::AwaitingSnapshot { buffered: Vec::new() };
    }

    /// Transport lost. The stale view is kept for display; the next snapshot
    /// replaces it wholesale.
    pub fn disconnected(&mut self) {
        self.sync = SyncPhase::Disconnected;
    }

    /// Feed one server message through the state machine.
    pub fn handle(&mut self, msg: ServerMessage) {
        match &mut self.sync {
            SyncPhase::Disconnected => {}
            SyncPhase::AwaitingSnapshot { buffered } => {
                if let ServerMessage::SyncState { .. } = msg {
                    let pending = std::mem::take(buffered);
                    self.apply(msg);
                    self.sync = SyncPhase::Live;
                    for delta in pending {
                        if self.is_stale(&delta) {
                            continue;
                        }
                        self.apply(delta);
                    }
                } else {
                    buffered.push(msg);
                }
            }
            SyncPhase::Live => self.apply(msg),
        }
    }

    /// A buffered delta is stale when it is scoped to a round the snapshot
    /// no longer considers active.
    fn is_stale(&self, msg: &ServerMessage) -> bool {
        let delta_round = match msg {
            ServerMessage::AnswerSync { round_ref, .. }
            | ServerMessage::AnswerSubmitted { round_ref, .. }
            | ServerMessage::AnswerResult { round_ref, .. }
            | ServerMessage::AnswerRevealed { round_ref, .. } => round_ref,
            _ => return false,
        };
        self.view
            .phase
            .as_ref()
            .and_then(Phase::round_ref)
            .map_or(true, |active| active != delta_round)
    }

    fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::SyncState { snapshot } => {
                // Atomic: the whole view comes from one self-consistent copy.
                self.view = ClientView {
                    phase: Some(snapshot.phase),
                    scores: snapshot.scores,
                    teams: snapshot.teams,
                    lock: snapshot.lock,
                    timer_status: Some(snapshot.timer.status),
                    timer_total: snapshot.timer.total_seconds,
                    timer_ends_at: snapshot
                        .timer
                        .ends_at
                        .as_deref()
                        .and_then(parse_instant),
                    timer_fixed_remaining: snapshot.timer.remaining_seconds,
                    freeze_remaining_seconds: snapshot.freeze_remaining_seconds,
                    draft: snapshot.draft,
                    submitted: snapshot.submitted,
                };
            }
            ServerMessage::StateChange { phase, .. } => {
                // A transition invalidates everything phase-scoped.
                self.view.phase = Some(phase);
                self.view.lock = None;
                self.view.timer_status = None;
                self.view.timer_ends_at = None;
                self.view.timer_fixed_remaining = 0;
                self.view.freeze_remaining_seconds = 0;
                self.view.draft = None;
                self.view.submitted = None;
            }
            ServerMessage::ScoreUpdate { scores, teams } => {
                self.view.scores = scores;
                self.view.teams = teams;
            }
            ServerMessage::BuzzerLocked { locked_by } => {
                self.view.lock = Some(locked_by);
            }
            ServerMessage::BuzzerReset { .. } => {
                self.view.lock = None;
            }
            ServerMessage::BuzzerLockout { freeze_seconds, .. } => {
                self.view.freeze_remaining_seconds = freeze_seconds;
            }
            ServerMessage::TimerSync {
                action: _,
                remaining_seconds,
                total_seconds,
                ends_at,
                ..
            } => {
                self.view.timer_total = total_seconds;
                self.view.timer_ends_at = ends_at.as_deref().and_then(parse_instant);
                self.view.timer_fixed_remaining = remaining_seconds;
            }
            ServerMessage::AnswerSync { text, .. } => {
                self.view.draft = Some(text);
            }
            ServerMessage::AnswerSubmitted { value, .. } => {
                self.view.submitted = Some(value);
            }
            // Presentation-only messages carry no mirrored state.
            _ => {}
        }
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
