use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages from any connected device to the server.
///
/// Operator-only commands are grouped at the bottom; authorization is checked
/// at dispatch before any of them reaches session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    // Registry lifecycle
    CreateTeam {
        team_name: String,
        player_name: String,
    },
    JoinTeam {
        join_code: String,
        player_name: String,
    },
    /// Stored-credential resume after a reload or dropped connection.
    RejoinSession {
        team_id: TeamId,
        player_id: PlayerId,
    },
    /// Liveness signal; no payload semantics beyond arrival.
    Heartbeat,
    /// Display/operator asking for a fresh full snapshot.
    RequestSync,

    // Team-device play
    PressBuzzer,
    AnswerTyping {
        round_ref: RoundRef,
        text: String,
    },
    SubmitAnswer {
        round_ref: RoundRef,
        value: String,
    },
    /// Live drag-order mirror to teammates while arranging a sequence.
    SequenceUpdate {
        order: Vec<usize>,
    },
    SubmitSequence {
        round_ref: RoundRef,
        order: Vec<usize>,
    },
    CastVote {
        vote: String,
    },
    SelectAvatar {
        avatar_id: String,
    },

    // Operator-only commands
    SetPhase {
        #[serde(flatten)]
        phase: Phase,
    },
    JudgeBuzz {
        team_id: TeamId,
        correct: bool,
        #[serde(default)]
        points: i64,
        /// Penalty override for an incorrect answer; server default when absent.
        freeze_seconds: Option<u64>,
    },
    TimerControl {
        action: TimerAction,
        duration_seconds: Option<u64>,
        message: Option<String>,
    },
    GradeAnswer {
        team_id: TeamId,
        round_ref: RoundRef,
        correct: bool,
        #[serde(default)]
        points: i64,
    },
    RevealAnswers {
        round_ref: RoundRef,
    },
    /// Close a price round: rank guesses and auto-award tiered points.
    RevealPrice {
        round_ref: RoundRef,
        /// Override; falls back to the price stored in the phase payload.
        actual_price: Option<f64>,
    },
    RevealVotes,
    AddPoints {
        team_id: TeamId,
        points: i64,
        #[serde(default)]
        reason: String,
    },
    ToggleElimination {
        team_id: TeamId,
        eliminated: bool,
    },
    KickTeam {
        team_id: TeamId,
    },
    ResetGame {
        confirm: bool,
        #[serde(default)]
        preserve_teams: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Start,
    Pause,
    Resume,
    Reset,
    Stop,
    /// Server-emitted only: natural expiry.
    Complete,
}

/// Messages from the server to connected devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot on connect/rejoin/request; applied atomically client-side.
    SyncState {
        #[serde(flatten)]
        snapshot: Snapshot,
    },
    /// Broadcast on every phase transition.
    StateChange {
        #[serde(flatten)]
        phase: Phase,
        server_now: String,
    },
    /// Broadcast after any point award or roster change.
    ScoreUpdate {
        scores: HashMap<TeamId, i64>,
        teams: Vec<TeamInfo>,
    },

    // Registry lifecycle
    CreationResult {
        success: bool,
        message: String,
        /// Flattened rejoin credentials; absent on failure.
        #[serde(flatten)]
        identity: Option<Identity>,
    },
    JoinResult {
        success: bool,
        message: String,
        #[serde(flatten)]
        identity: Option<Identity>,
    },
    RejoinResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// To the joining player's teammates.
    PlayerJoined {
        player_id: PlayerId,
        player_name: String,
        players: Vec<PlayerInfo>,
    },
    TeamKicked {
        message: String,
    },

    // Lock lifecycle
    BuzzerLocked {
        #[serde(flatten)]
        locked_by: LockedBy,
    },
    BuzzerReset {
        previous_team_id: Option<TeamId>,
        previous_team_name: Option<String>,
        result: JudgeOutcome,
        freeze_seconds: u64,
    },
    /// To the penalized team only; its client drives the local countdown.
    BuzzerLockout {
        freeze_seconds: u64,
        message: String,
    },

    // Timer lifecycle
    TimerSync {
        action: TimerAction,
        remaining_seconds: u64,
        total_seconds: u64,
        /// Absolute end instant (RFC 3339) while running; clients compute
        /// remaining from this every second instead of trusting prior ticks.
        #[serde(skip_serializing_if = "Option::is_none")]
        ends_at: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    // Submission lifecycle
    /// Live draft mirror, to the typist's teammates only.
    AnswerSync {
        round_ref: RoundRef,
        text: String,
        from_player_id: PlayerId,
        from_player_name: String,
    },
    /// To operator and the submitting team.
    AnswerSubmitted {
        round_ref: RoundRef,
        team_id: TeamId,
        team_name: String,
        player_id: PlayerId,
        player_name: String,
        value: String,
        out_of_round: bool,
    },
    /// Grading result, to the graded team.
    AnswerResult {
        round_ref: RoundRef,
        correct: bool,
        points_awarded: i64,
    },
    AnswerRevealed {
        round_ref: RoundRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_answer: Option<String>,
        answers: Vec<RevealedAnswer>,
    },
    /// Price round outcome: every guess with its rank, the winner, and the
    /// points handed out automatically.
    PriceRevealed {
        round_ref: RoundRef,
        actual_price: f64,
        winner_team_id: Option<TeamId>,
        /// Sorted by guess amount, lowest first.
        guesses: Vec<PriceGuessResult>,
        points_awarded: i64,
    },

    // Sequencing (to teammates / team / all respectively)
    SequenceSync {
        order: Vec<usize>,
        from_player_id: PlayerId,
        from_player_name: String,
    },
    SequenceResult {
        correct: bool,
        points_awarded: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_position: Option<usize>,
        message: String,
    },
    SequenceStatus {
        team_statuses: HashMap<TeamId, SequenceTeamStatus>,
    },

    // Binary-choice voting
    VoteUpdate {
        counts: VoteCounts,
        total_votes: usize,
    },
    VoteRevealed {
        majority: Option<String>,
        counts: VoteCounts,
        teams_awarded: Vec<TeamId>,
        points_value: i64,
        is_tie: bool,
    },

    EliminationUpdate {
        team_id: TeamId,
        team_name: String,
        eliminated: bool,
        remaining_teams: usize,
    },
    AvatarUpdated {
        team_id: TeamId,
        avatar_id: String,
    },

    /// Informational race-loss notice (lock held, already graded, ...).
    Notice {
        code: String,
        msg: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum JudgeOutcome {
    Correct,
    Incorrect,
    /// Cleared by a phase change rather than a judgment.
    Cleared,
}

/// The current lock holder, as broadcast and as mirrored in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedBy {
    pub team_id: TeamId,
    pub team_name: String,
    pub player_id: Option<PlayerId>,
    pub player_name: Option<String>,
}

/// Rejoin credentials plus roster context, returned on create/join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub team_name: String,
    pub player_name: String,
    pub join_code: String,
    pub color: u8,
    pub players: Vec<PlayerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealedAnswer {
    pub team_id: TeamId,
    pub team_name: String,
    pub value: String,
    pub player_name: String,
    pub graded: bool,
    pub points_awarded: i64,
}

/// One team's guess in a `price_revealed` broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceGuessResult {
    pub team_id: TeamId,
    pub team_name: String,
    pub guess: f64,
    pub player_name: String,
    pub status: PriceGuessStatus,
    /// Closeness rank among non-bust guesses; busts carry none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    pub points_awarded: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PriceGuessStatus {
    Winner,
    Valid,
    /// Guessed over the actual price; out of the running.
    Bust,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SequenceTeamStatus {
    Thinking,
    Failed,
    Winner,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VoteCounts {
    pub a: usize,
    pub b: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub remaining_seconds: u64,
    pub total_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
}

/// Full, self-consistent copy of session state for one recipient.
///
/// Built per connection: identity and draft fields are filled for team-player
/// roles, and `freeze_remaining_seconds` reflects the recipient's own penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub phase: Phase,
    pub server_now: String,
    pub scores: HashMap<TeamId, i64>,
    pub teams: Vec<TeamInfo>,
    pub lock: Option<LockedBy>,
    pub freeze_remaining_seconds: u64,
    pub timer: TimerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub you: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted: Option<String>,
}
