//! Handlers for team-device messages.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;

use super::handlers::failure;
use super::ConnCtx;

pub async fn handle_create_team(
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
    team_name: String,
    player_name: String,
) -> Vec<ServerMessage> {
    match state.create_team(&team_name, &player_name).await {
        Ok(identity) => {
            ctx.team_id = Some(identity.team_id.clone());
            ctx.player_id = Some(identity.player_id.clone());
            vec![ServerMessage::CreationResult {
                success: true,
                message: format!("Team {} created", identity.team_name),
                identity: Some(identity),
            }]
        }
        Err(err) => vec![ServerMessage::CreationResult {
            success: false,
            message: err.to_string(),
            identity: None,
        }],
    }
}

pub async fn handle_join_team(
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
    join_code: String,
    player_name: String,
) -> Vec<ServerMessage> {
    match state.join_team(&join_code, &player_name).await {
        Ok(identity) => {
            ctx.team_id = Some(identity.team_id.clone());
            ctx.player_id = Some(identity.player_id.clone());
            vec![ServerMessage::JoinResult {
                success: true,
                message: format!("Joined {}", identity.team_name),
                identity: Some(identity),
            }]
        }
        Err(err) => vec![ServerMessage::JoinResult {
            success: false,
            message: err.to_string(),
            identity: None,
        }],
    }
}

/// Rejoin with stored credentials. Success carries a fresh full snapshot so
/// the reconnecting device renders current state in one step.
pub async fn handle_rejoin(
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
    team_id: String,
    player_id: String,
) -> Vec<ServerMessage> {
    match state.rejoin(&team_id, &player_id).await {
        Ok(identity) => {
            ctx.team_id = Some(identity.team_id.clone());
            ctx.player_id = Some(identity.player_id.clone());
            let snapshot = state.snapshot(ctx.identity()).await;
            vec![
                ServerMessage::RejoinResult { success: true, message: None },
                ServerMessage::SyncState { snapshot },
            ]
        }
        Err(err) => vec![ServerMessage::RejoinResult {
            success: false,
            message: Some(err.to_string()),
        }],
    }
}

pub async fn handle_press_buzzer(
    state: &Arc<AppState>,
    team_id: String,
    player_id: String,
) -> Vec<ServerMessage> {
    match state.press_buzzer(&team_id, Some(&player_id)).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_answer_typing(
    state: &Arc<AppState>,
    team_id: String,
    player_id: String,
    round_ref: String,
    text: String,
) -> Vec<ServerMessage> {
    match state.answer_typing(&team_id, &player_id, &round_ref, text).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    team_id: String,
    player_id: String,
    round_ref: String,
    value: String,
) -> Vec<ServerMessage> {
    match state.submit_answer(&team_id, &player_id, &round_ref, value).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_sequence_update(
    state: &Arc<AppState>,
    team_id: String,
    player_id: String,
    order: Vec<usize>,
) -> Vec<ServerMessage> {
    match state.sequence_update(&team_id, &player_id, order).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_submit_sequence(
    state: &Arc<AppState>,
    team_id: String,
    round_ref: String,
    order: Vec<usize>,
) -> Vec<ServerMessage> {
    match state.submit_sequence(&team_id, &round_ref, order).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_cast_vote(
    state: &Arc<AppState>,
    team_id: String,
    player_id: String,
    vote: String,
) -> Vec<ServerMessage> {
    match state.cast_vote(&team_id, &player_id, &vote).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}

pub async fn handle_select_avatar(
    state: &Arc<AppState>,
    team_id: String,
    avatar_id: String,
) -> Vec<ServerMessage> {
    match state.select_avatar(&team_id, &avatar_id).await {
        Ok(()) => vec![],
        Err(err) => vec![failure(err)],
    }
}
