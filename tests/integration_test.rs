//! End-to-end tests driving the dispatcher the way connections do, with a
//! broadcast subscriber standing in for the display.

use partyline::protocol::{ClientMessage, JudgeOutcome, ServerMessage, TimerAction};
use partyline::state::{AppState, Audience, Envelope};
use partyline::types::{Phase, Role};
use partyline::ws::{handlers::handle_message, ConnCtx};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

async fn operator() -> ConnCtx {
    ConnCtx::new(Role::Operator)
}

/// Register a player connection with a fresh team; panics on failure.
async fn register(state: &Arc<AppState>, team: &str, player: &str) -> ConnCtx {
    let mut ctx = ConnCtx::new(Role::Player);
    let replies = handle_message(
        ClientMessage::CreateTeam { team_name: team.into(), player_name: player.into() },
        &mut ctx,
        state,
    )
    .await;
    match replies.as_slice() {
        [ServerMessage::CreationResult { success: true, .. }] => ctx,
        other => panic!("registration failed: {other:?}"),
    }
}

/// Drain everything currently queued on a broadcast receiver.
fn drain(rx: &mut Receiver<Envelope>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}

#[tokio::test]
async fn buzz_round_end_to_end() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let mut alpha = register(&state, "Alpha", "Ada").await;
    let mut bravo = register(&state, "Bravo", "Bob").await;

    handle_message(
        ClientMessage::SetPhase {
            phase: Phase::BuzzIn { round_ref: "r1".into(), hint: "90s hit".into() },
        },
        &mut op,
        &state,
    )
    .await;

    let mut rx = state.broadcast.subscribe();

    // Alpha wins the race, Bravo loses it.
    assert!(handle_message(ClientMessage::PressBuzzer, &mut alpha, &state)
        .await
        .is_empty());
    let replies = handle_message(ClientMessage::PressBuzzer, &mut bravo, &state).await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::Notice { code, .. }] if code == "LOCK_HELD"
    ));

    // Judged incorrect: lock reopens, Alpha is frozen and told so privately.
    handle_message(
        ClientMessage::JudgeBuzz {
            team_id: alpha.team_id.clone().unwrap(),
            correct: false,
            points: 0,
            freeze_seconds: Some(10),
        },
        &mut op,
        &state,
    )
    .await;

    let envelopes = drain(&mut rx);
    assert!(envelopes.iter().any(|e| matches!(
        &e.msg,
        ServerMessage::BuzzerLocked { locked_by } if locked_by.team_name == "Alpha"
    )));
    let lockout = envelopes
        .iter()
        .find(|e| matches!(e.msg, ServerMessage::BuzzerLockout { .. }))
        .expect("lockout broadcast");
    assert_eq!(lockout.audience, Audience::Team(alpha.team_id.clone().unwrap()));
    assert!(envelopes.iter().any(|e| matches!(
        &e.msg,
        ServerMessage::BuzzerReset { result: JudgeOutcome::Incorrect, freeze_seconds: 10, .. }
    )));

    // Frozen team rejected, the other team gets through and scores.
    let replies = handle_message(ClientMessage::PressBuzzer, &mut alpha, &state).await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::Notice { code, .. }] if code == "LOCK_FROZEN"
    ));
    assert!(handle_message(ClientMessage::PressBuzzer, &mut bravo, &state)
        .await
        .is_empty());
    handle_message(
        ClientMessage::JudgeBuzz {
            team_id: bravo.team_id.clone().unwrap(),
            correct: true,
            points: 100,
            freeze_seconds: None,
        },
        &mut op,
        &state,
    )
    .await;

    let session = state.session.read().await;
    let bravo_team = session.teams.get(bravo.team_id.as_ref().unwrap()).unwrap();
    assert_eq!(bravo_team.score, 100);
}

#[tokio::test]
async fn grading_awards_points_exactly_once() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let mut alpha = register(&state, "Alpha", "Ada").await;

    handle_message(
        ClientMessage::SetPhase {
            phase: Phase::Trivia { round_ref: "q1".into(), question_text: "Who?".into() },
        },
        &mut op,
        &state,
    )
    .await;
    assert!(handle_message(
        ClientMessage::SubmitAnswer { round_ref: "q1".into(), value: "Lovelace".into() },
        &mut alpha,
        &state,
    )
    .await
    .is_empty());

    let grade = ClientMessage::GradeAnswer {
        team_id: alpha.team_id.clone().unwrap(),
        round_ref: "q1".into(),
        correct: true,
        points: 50,
    };
    assert!(handle_message(grade.clone(), &mut op, &state).await.is_empty());

    // Double-click on the grading button: notice, no double award.
    let replies = handle_message(grade, &mut op, &state).await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::Notice { code, .. }] if code == "ALREADY_GRADED"
    ));

    let session = state.session.read().await;
    let team = session.teams.get(alpha.team_id.as_ref().unwrap()).unwrap();
    assert_eq!(team.score, 50);
}

#[tokio::test]
async fn rejoin_restores_identity_and_current_state() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let alpha = register(&state, "Alpha", "Ada").await;
    let (team_id, player_id) = (alpha.team_id.unwrap(), alpha.player_id.unwrap());

    // The session moves on while the device is gone.
    for phase in [
        Phase::Trivia { round_ref: "q1".into(), question_text: "?".into() },
        Phase::EliminationGrid,
        Phase::BuzzIn { round_ref: "r2".into(), hint: String::new() },
    ] {
        handle_message(ClientMessage::SetPhase { phase }, &mut op, &state).await;
    }

    // Fresh connection, stored credentials.
    let mut rejoined = ConnCtx::new(Role::Player);
    let replies = handle_message(
        ClientMessage::RejoinSession { team_id: team_id.clone(), player_id: player_id.clone() },
        &mut rejoined,
        &state,
    )
    .await;

    match replies.as_slice() {
        [ServerMessage::RejoinResult { success: true, .. }, ServerMessage::SyncState { snapshot }] =>
        {
            // Snapshot reflects the current phase, not any missed one.
            assert!(matches!(snapshot.phase, Phase::BuzzIn { .. }));
            let you = snapshot.you.as_ref().expect("identity in snapshot");
            assert_eq!(you.team_id, team_id);
            assert_eq!(you.player_id, player_id);
        }
        other => panic!("unexpected rejoin replies: {other:?}"),
    }

    // Rejoining again with the same credentials is fine.
    let mut again = ConnCtx::new(Role::Player);
    let replies = handle_message(
        ClientMessage::RejoinSession { team_id, player_id },
        &mut again,
        &state,
    )
    .await;
    assert!(matches!(
        replies.first(),
        Some(ServerMessage::RejoinResult { success: true, .. })
    ));

    // Made-up credentials fall back to registration.
    let mut stranger = ConnCtx::new(Role::Player);
    let replies = handle_message(
        ClientMessage::RejoinSession { team_id: "nope".into(), player_id: "nope".into() },
        &mut stranger,
        &state,
    )
    .await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::RejoinResult { success: false, .. }]
    ));
}

#[tokio::test]
async fn timer_broadcasts_absolute_end_instant() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let mut rx = state.broadcast.subscribe();

    handle_message(
        ClientMessage::TimerControl {
            action: TimerAction::Start,
            duration_seconds: Some(90),
            message: Some("Go!".into()),
        },
        &mut op,
        &state,
    )
    .await;

    let envelopes = drain(&mut rx);
    let sync = envelopes
        .iter()
        .find_map(|e| match &e.msg {
            ServerMessage::TimerSync { action: TimerAction::Start, remaining_seconds, ends_at, .. } => {
                Some((*remaining_seconds, ends_at.clone()))
            }
            _ => None,
        })
        .expect("timer sync broadcast");
    assert_eq!(sync.0, 90);
    assert!(sync.1.is_some());

    // Pause freezes a fixed remaining value with no end instant.
    handle_message(
        ClientMessage::TimerControl {
            action: TimerAction::Pause,
            duration_seconds: None,
            message: None,
        },
        &mut op,
        &state,
    )
    .await;
    let envelopes = drain(&mut rx);
    assert!(envelopes.iter().any(|e| matches!(
        &e.msg,
        ServerMessage::TimerSync { action: TimerAction::Pause, ends_at: None, .. }
    )));
}

#[tokio::test]
async fn phase_change_clears_undecided_buzz() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let mut alpha = register(&state, "Alpha", "Ada").await;

    handle_message(
        ClientMessage::SetPhase {
            phase: Phase::BuzzIn { round_ref: "r1".into(), hint: String::new() },
        },
        &mut op,
        &state,
    )
    .await;
    handle_message(ClientMessage::PressBuzzer, &mut alpha, &state).await;

    let mut rx = state.broadcast.subscribe();
    handle_message(ClientMessage::SetPhase { phase: Phase::Lobby }, &mut op, &state).await;

    let envelopes = drain(&mut rx);
    let reset_idx = envelopes
        .iter()
        .position(|e| {
            matches!(&e.msg, ServerMessage::BuzzerReset { result: JudgeOutcome::Cleared, .. })
        })
        .expect("cleared buzzer reset");
    let change_idx = envelopes
        .iter()
        .position(|e| matches!(&e.msg, ServerMessage::StateChange { .. }))
        .expect("state change");
    // The lock is cleared before the new phase is announced.
    assert!(reset_idx < change_idx);

    let session = state.session.read().await;
    assert!(session.lock.holder().is_none());
}

#[tokio::test]
async fn sequencing_race_pays_by_finish_position() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let mut alpha = register(&state, "Alpha", "Ada").await;
    let mut bravo = register(&state, "Bravo", "Bob").await;

    handle_message(
        ClientMessage::SetPhase {
            phase: Phase::Sequencing {
                round_ref: "s1".into(),
                items: vec!["1985".into(), "1992".into(), "1999".into()],
                correct_order: vec![2, 0, 1],
            },
        },
        &mut op,
        &state,
    )
    .await;

    // Clients never see the answer key.
    let snapshot = state.snapshot(None).await;
    match snapshot.phase {
        Phase::Sequencing { correct_order, .. } => assert!(correct_order.is_empty()),
        other => panic!("unexpected phase: {other:?}"),
    }

    handle_message(
        ClientMessage::SubmitSequence { round_ref: "s1".into(), order: vec![2, 0, 1] },
        &mut alpha,
        &state,
    )
    .await;
    handle_message(
        ClientMessage::SubmitSequence { round_ref: "s1".into(), order: vec![2, 0, 1] },
        &mut bravo,
        &state,
    )
    .await;

    let session = state.session.read().await;
    let alpha_team = session.teams.get(alpha.team_id.as_ref().unwrap()).unwrap();
    let bravo_team = session.teams.get(bravo.team_id.as_ref().unwrap()).unwrap();
    assert_eq!(alpha_team.score, 100);
    assert_eq!(bravo_team.score, 75);
}

#[tokio::test]
async fn binary_choice_majority_pays_aligned_teams() {
    let state = Arc::new(AppState::default());
    let mut op = operator().await;
    let mut alpha = register(&state, "Alpha", "Ada").await;
    let mut bravo = register(&state, "Bravo", "Bob").await;

    handle_message(
        ClientMessage::SetPhase {
            phase: Phase::BinaryChoice {
                round_ref: "v1".into(),
                question_text: "Cake or pie?".into(),
                option_a: "Cake".into(),
                option_b: "Pie".into(),
            },
        },
        &mut op,
        &state,
    )
    .await;

    // Revealing before anyone votes is rejected.
    let replies = handle_message(ClientMessage::RevealVotes, &mut op, &state).await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::Error { code, .. }] if code == "NOTHING_TO_REVEAL"
    ));

    handle_message(ClientMessage::CastVote { vote: "A".into() }, &mut alpha, &state).await;
    handle_message(ClientMessage::CastVote { vote: "A".into() }, &mut bravo, &state).await;
    // Bravo changes its mind; last vote counts.
    handle_message(ClientMessage::CastVote { vote: "B".into() }, &mut bravo, &state).await;

    let mut rx = state.broadcast.subscribe();
    // A tie pays nobody.
    handle_message(ClientMessage::RevealVotes, &mut op, &state).await;
    let envelopes = drain(&mut rx);
    assert!(envelopes.iter().any(|e| matches!(
        &e.msg,
        ServerMessage::VoteRevealed { is_tie: true, teams_awarded, .. } if teams_awarded.is_empty()
    )));
}
