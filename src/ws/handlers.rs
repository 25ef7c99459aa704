//! WebSocket message dispatch.
//!
//! Authorization and identity requirements are checked here, then messages
//! are dispatched to role-specific handler modules. Direct replies go back
//! on the caller's connection; everything else arrives via broadcast.

use crate::error::SessionError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{operator, team, ConnCtx};

/// Check operator authorization and return early if unauthorized.
macro_rules! check_operator {
    ($ctx:expr, $action:expr) => {
        if $ctx.role != Role::Operator {
            return vec![ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the operator can {}", $action),
            }];
        }
    };
}

/// Require a registered team identity on this connection.
macro_rules! require_identity {
    ($ctx:expr) => {
        match ($ctx.team_id.clone(), $ctx.player_id.clone()) {
            (Some(team_id), Some(player_id)) => (team_id, player_id),
            _ => {
                return vec![ServerMessage::Error {
                    code: "NOT_REGISTERED".to_string(),
                    msg: "Create or join a team first".to_string(),
                }]
            }
        }
    };
}

/// Turn a command failure into its wire form: race losses are routine and
/// become notices, everything else is an error frame.
pub(super) fn failure(err: SessionError) -> ServerMessage {
    if err.is_race_loss() {
        tracing::debug!(%err, "race loss");
        ServerMessage::Notice { code: err.code().to_string(), msg: err.to_string() }
    } else {
        ServerMessage::Error { code: err.code().to_string(), msg: err.to_string() }
    }
}

/// Handle a client message, returning the direct replies for this connection.
pub async fn handle_message(
    msg: ClientMessage,
    ctx: &mut ConnCtx,
    state: &Arc<AppState>,
) -> Vec<ServerMessage> {
    match msg {
        // Registry lifecycle
        ClientMessage::CreateTeam { team_name, player_name } => {
            team::handle_create_team(state, ctx, team_name, player_name).await
        }

        ClientMessage::JoinTeam { join_code, player_name } => {
            team::handle_join_team(state, ctx, join_code, player_name).await
        }

        ClientMessage::RejoinSession { team_id, player_id } => {
            team::handle_rejoin(state, ctx, team_id, player_id).await
        }

        ClientMessage::Heartbeat => {
            if let Some((team_id, player_id)) = ctx.identity() {
                state.heartbeat(team_id, player_id).await;
            }
            vec![]
        }

        ClientMessage::RequestSync => {
            let snapshot = state.snapshot(ctx.identity()).await;
            vec![ServerMessage::SyncState { snapshot }]
        }

        // Team-device play
        ClientMessage::PressBuzzer => {
            let (team_id, player_id) = require_identity!(ctx);
            team::handle_press_buzzer(state, team_id, player_id).await
        }

        ClientMessage::AnswerTyping { round_ref, text } => {
            let (team_id, player_id) = require_identity!(ctx);
            team::handle_answer_typing(state, team_id, player_id, round_ref, text).await
        }

        ClientMessage::SubmitAnswer { round_ref, value } => {
            let (team_id, player_id) = require_identity!(ctx);
            team::handle_submit_answer(state, team_id, player_id, round_ref, value).await
        }

        ClientMessage::SequenceUpdate { order } => {
            let (team_id, player_id) = require_identity!(ctx);
            team::handle_sequence_update(state, team_id, player_id, order).await
        }

        ClientMessage::SubmitSequence { round_ref, order } => {
            let (team_id, _) = require_identity!(ctx);
            team::handle_submit_sequence(state, team_id, round_ref, order).await
        }

        ClientMessage::CastVote { vote } => {
            let (team_id, player_id) = require_identity!(ctx);
            team::handle_cast_vote(state, team_id, player_id, vote).await
        }

        ClientMessage::SelectAvatar { avatar_id } => {
            let (team_id, _) = require_identity!(ctx);
            team::handle_select_avatar(state, team_id, avatar_id).await
        }

        // Operator-only commands (authorization checked before dispatch)
        ClientMessage::SetPhase { phase } => {
            check_operator!(ctx, "change the phase");
            operator::handle_set_phase(state, phase).await
        }

        ClientMessage::JudgeBuzz { team_id, correct, points, freeze_seconds } => {
            check_operator!(ctx, "judge buzzes");
            operator::handle_judge_buzz(state, team_id, correct, points, freeze_seconds).await
        }

        ClientMessage::TimerControl { action, duration_seconds, message } => {
            check_operator!(ctx, "control the timer");
            operator::handle_timer_control(state, action, duration_seconds, message).await
        }

        ClientMessage::GradeAnswer { team_id, round_ref, correct, points } => {
            check_operator!(ctx, "grade answers");
            operator::handle_grade_answer(state, team_id, round_ref, correct, points).await
        }

        ClientMessage::RevealAnswers { round_ref } => {
            check_operator!(ctx, "reveal answers");
            operator::handle_reveal_answers(state, round_ref).await
        }

        ClientMessage::RevealPrice { round_ref, actual_price } => {
            check_operator!(ctx, "reveal prices");
            operator::handle_reveal_price(state, round_ref, actual_price).await
        }

        ClientMessage::RevealVotes => {
            check_operator!(ctx, "reveal votes");
            operator::handle_reveal_votes(state).await
        }

        ClientMessage::AddPoints { team_id, points, reason } => {
            check_operator!(ctx, "adjust scores");
            operator::handle_add_points(state, team_id, points, reason).await
        }

        ClientMessage::ToggleElimination { team_id, eliminated } => {
            check_operator!(ctx, "toggle eliminations");
            operator::handle_toggle_elimination(state, team_id, eliminated).await
        }

        ClientMessage::KickTeam { team_id } => {
            check_operator!(ctx, "kick teams");
            operator::handle_kick_team(state, team_id).await
        }

        ClientMessage::ResetGame { confirm, preserve_teams } => {
            check_operator!(ctx, "reset the game");
            operator::handle_reset_game(state, confirm, preserve_teams).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;

    #[tokio::test]
    async fn operator_commands_rejected_for_players() {
        let state = Arc::new(AppState::default());
        let mut ctx = ConnCtx::new(Role::Player);

        let replies = handle_message(
            ClientMessage::SetPhase { phase: Phase::Lobby },
            &mut ctx,
            &state,
        )
        .await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "UNAUTHORIZED"
        ));
    }

    #[tokio::test]
    async fn play_commands_require_registration() {
        let state = Arc::new(AppState::default());
        let mut ctx = ConnCtx::new(Role::Player);

        let replies = handle_message(ClientMessage::PressBuzzer, &mut ctx, &state).await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "NOT_REGISTERED"
        ));
    }

    #[tokio::test]
    async fn create_team_binds_connection_identity() {
        let state = Arc::new(AppState::default());
        let mut ctx = ConnCtx::new(Role::Player);

        let replies = handle_message(
            ClientMessage::CreateTeam {
                team_name: "Alpha".into(),
                player_name: "Ada".into(),
            },
            &mut ctx,
            &state,
        )
        .await;

        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::CreationResult { success: true, .. }]
        ));
        assert!(ctx.team_id.is_some());
        assert!(ctx.player_id.is_some());
    }

    #[tokio::test]
    async fn race_losses_surface_as_notices() {
        let state = Arc::new(AppState::default());
        state
            .set_phase(Phase::BuzzIn { round_ref: "r1".into(), hint: String::new() })
            .await;

        let mut first = ConnCtx::new(Role::Player);
        handle_message(
            ClientMessage::CreateTeam { team_name: "Alpha".into(), player_name: "Ada".into() },
            &mut first,
            &state,
        )
        .await;
        let mut second = ConnCtx::new(Role::Player);
        handle_message(
            ClientMessage::CreateTeam { team_name: "Bravo".into(), player_name: "Bob".into() },
            &mut second,
            &state,
        )
        .await;

        assert!(handle_message(ClientMessage::PressBuzzer, &mut first, &state)
            .await
            .is_empty());
        let replies = handle_message(ClientMessage::PressBuzzer, &mut second, &state).await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Notice { code, .. }] if code == "LOCK_HELD"
        ));
    }
}
