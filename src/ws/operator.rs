//! Handlers for operator-console commands. Authorization happens at dispatch.

use crate::protocol::{ServerMessage, TimerAction};
use crate::state::AppState;
use crate::types::Phase;
use std::sync::Arc;

use super::handlers::failure;

pub async fn handle_set_phase(state: &Arc<AppState>, phase: Phase) -> Vec<ServerMessage> {
    state.set_phase(phase).await;
    vec![]
}

pub async fn handle_judge_buzz(
    state: &Arc<AppState>,
    team_id: String,
    correct: bool,
    points: i64,
    freeze_seconds: Option<u64>,
) -> Vec<ServerMessage> {
    match state.judge_buzz(&team_id, correct, points, freeze_seconds).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_timer_control(
    state: &Arc<AppState>,
    action: TimerAction,
    duration_seconds: Option<u64>,
    message: Option<String>,
) -> Vec<ServerMessage> {
    state.timer_control(action, duration_seconds, message).await;
    vec![]
}

pub async fn handle_grade_answer(
    state: &Arc<AppState>,
    team_id: String,
    round_ref: String,
    correct: bool,
    points: i64,
) -> Vec<ServerMessage> {
    match state.grade_answer(&team_id, &round_ref, correct, points).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_reveal_answers(
    state: &Arc<AppState>,
    round_ref: String,
) -> Vec<ServerMessage> {
    match state.reveal_answers(&round_ref).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_reveal_price(
    state: &Arc<AppState>,
    round_ref: String,
    actual_price: Option<f64>,
) -> Vec<ServerMessage> {
    match state.reveal_price(&round_ref, actual_price).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_reveal_votes(state: &Arc<AppState>) -> Vec<ServerMessage> {
    match state.reveal_votes().await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_add_points(
    state: &Arc<AppState>,
    team_id: String,
    points: i64,
    reason: String,
) -> Vec<ServerMessage> {
    match state.add_points(&team_id, points, &reason).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_toggle_elimination(
    state: &Arc<AppState>,
    team_id: String,
    eliminated: bool,
) -> Vec<ServerMessage> {
    match state.toggle_elimination(&team_id, eliminated).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_kick_team(state: &Arc<AppState>, team_id: String) -> Vec<ServerMessage> {
    match state.kick_team(&team_id).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

/// Reset requires explicit confirmation; a bare reset command is a misclick.
pub async fn handle_reset_game(
    state: &Arc<AppState>,
    confirm: bool,
    preserve_teams: bool,
) -> Vec<ServerMessage> {
    if !confirm {
        return vec![ServerMessage::Error {
            code: "CONFIRM_REQUIRED".to_string(),
            msg: "Reset must be confirmed".to_string(),
        }];
    }
    state.reset_game(preserve_teams).await;
    vec![]
}
