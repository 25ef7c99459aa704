//! Authoritative countdown with absolute-end-instant reconciliation.
//!
//! The service broadcasts `ends_at` rather than a decrementing counter: a
//! late-joining or reconnecting client renders the exact remaining time on
//! its first frame, and independently-ticking clients cannot drift apart
//! because each recomputes `remaining = ends_at - local_now` every second.

use super::AppState;
use crate::protocol::{ServerMessage, TimerAction, TimerSnapshot, TimerStatus};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug)]
pub struct TimerService {
    status: TimerStatus,
    total_seconds: u64,
    ends_at: Option<DateTime<Utc>>,
    /// Fixed remaining value while paused; never recomputed from a moving
    /// end instant.
    paused_remaining: Option<u64>,
}

impl Default for TimerService {
    fn default() -> Self {
        Self {
            status: TimerStatus::Stopped,
            total_seconds: 0,
            ends_at: None,
            paused_remaining: None,
        }
    }
}

impl TimerService {
    pub fn start(&mut self, duration_seconds: u64, now: DateTime<Utc>) {
        self.status = TimerStatus::Running;
        self.total_seconds = duration_seconds;
        self.ends_at = Some(now + Duration::seconds(duration_seconds as i64));
        self.paused_remaining = None;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> u64 {
        if self.status == TimerStatus::Running {
            let remaining = self.remaining(now);
            self.status = TimerStatus::Paused;
            self.paused_remaining = Some(remaining);
            self.ends_at = None;
        }
        self.remaining(now)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> u64 {
        if self.status == TimerStatus::Paused {
            let remaining = self.paused_remaining.take().unwrap_or(0);
            self.status = TimerStatus::Running;
            self.ends_at = Some(now + Duration::seconds(remaining as i64));
        }
        self.remaining(now)
    }

    /// Back to a full, unstarted countdown.
    pub fn reset(&mut self, duration_seconds: u64) {
        self.status = TimerStatus::Stopped;
        self.total_seconds = duration_seconds;
        self.ends_at = None;
        self.paused_remaining = None;
    }

    pub fn stop(&mut self) {
        self.status = TimerStatus::Stopped;
        self.ends_at = None;
        self.paused_remaining = None;
    }

    /// Phase-change cancellation.
    pub fn force_reset(&mut self) {
        self.status = TimerStatus::Stopped;
        self.total_seconds = 0;
        self.ends_at = None;
        self.paused_remaining = None;
    }

    /// Remaining whole seconds, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> u64 {
        match self.status {
            TimerStatus::Running => match self.ends_at {
                Some(end) if end > now => (end - now).num_seconds() as u64,
                _ => 0,
            },
            TimerStatus::Paused => self.paused_remaining.unwrap_or(0),
            TimerStatus::Stopped => self.total_seconds,
            TimerStatus::Finished => 0,
        }
    }

    /// Transition Running -> Finished when the end instant has passed.
    /// Returns true exactly once per expiry so the terminal broadcast cannot
    /// repeat.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == TimerStatus::Running {
            if let Some(end) = self.ends_at {
                if now >= end {
                    self.status = TimerStatus::Finished;
                    self.ends_at = None;
                    return true;
                }
            }
        }
        false
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn total(&self) -> u64 {
        self.total_seconds
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        TimerSnapshot {
            status: self.status,
            remaining_seconds: self.remaining(now),
            total_seconds: self.total_seconds,
            ends_at: self.ends_at.map(|e| e.to_rfc3339()),
        }
    }
}

impl AppState {
    /// Operator drives the countdown; every mutation re-broadcasts the full
    /// timer picture so clients reconcile instead of accumulating ticks.
    pub async fn timer_control(
        &self,
        action: TimerAction,
        duration_seconds: Option<u64>,
        message: Option<String>,
    ) {
        let now = Utc::now();
        let mut session = self.session.write().await;
        let duration = duration_seconds.unwrap_or(180);

        let (remaining, total) = match action {
            TimerAction::Start => {
                session.timer.start(duration, now);
                (duration, duration)
            }
            TimerAction::Pause => {
                let r = session.timer.pause(now);
                (r, session.timer.total())
            }
            TimerAction::Resume => {
                let r = session.timer.resume(now);
                (r, session.timer.total())
            }
            TimerAction::Reset => {
                session.timer.reset(duration);
                (duration, duration)
            }
            TimerAction::Stop => {
                session.timer.stop();
                (0, session.timer.total())
            }
            // Complete is server-emitted, not an operator verb.
            TimerAction::Complete => return,
        };

        let ends_at = session.timer.snapshot(now).ends_at;
        tracing::info!(?action, remaining, "timer control");
        self.send_all(ServerMessage::TimerSync {
            action,
            remaining_seconds: remaining,
            total_seconds: total,
            ends_at,
            message,
        });
    }

    /// Recurring expiry check (driven once per second by a background task)
    /// so "finished" fires close to on-time regardless of other traffic.
    pub async fn check_timer_expiry(&self) {
        let now = Utc::now();
        let mut session = self.session.write().await;
        if session.timer.check_expiry(now) {
            let total = session.timer.total();
            tracing::info!(total, "timer complete");
            self.send_all(ServerMessage::TimerSync {
                action: TimerAction::Complete,
                remaining_seconds: 0,
                total_seconds: total,
                ends_at: None,
                message: None,
            });
        }
    }
}
