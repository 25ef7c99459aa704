use thiserror::Error;

/// Failure taxonomy for session commands.
///
/// Race-loss variants (`LockHeld`, `LockFrozen`, `AlreadyGraded`) are expected
/// during normal play and surface as informational notices, not errors; they
/// are logged at debug level. Identity variants fall back to registration on
/// the client. No variant leaves the session partially mutated.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    // Identity
    #[error("invalid join code")]
    UnknownJoinCode,
    #[error("team not found")]
    TeamNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("stale rejoin credentials")]
    StaleCredentials,
    #[error("team name must be 1-20 characters")]
    BadTeamName,
    #[error("player name must be 1-20 characters")]
    BadPlayerName,
    #[error("team name already taken")]
    TeamNameTaken,
    #[error("player name already taken on this team")]
    PlayerNameTaken,

    // Race losses
    #[error("buzzer already locked")]
    LockHeld,
    #[error("buzzer frozen for {remaining_seconds} more seconds")]
    LockFrozen { remaining_seconds: u64 },
    #[error("already graded")]
    AlreadyGraded,

    // Command/phase mismatches
    #[error("no active round accepts this command")]
    NoActiveRound,
    #[error("command not valid in current phase")]
    WrongPhase,
    #[error("invalid vote option")]
    InvalidVote,
    #[error("no usable actual price")]
    InvalidPrice,
    #[error("nothing to reveal")]
    NothingToReveal,
}

impl SessionError {
    /// Stable wire code for `error`/`notice` payloads.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::UnknownJoinCode => "UNKNOWN_JOIN_CODE",
            SessionError::TeamNotFound => "TEAM_NOT_FOUND",
            SessionError::PlayerNotFound => "PLAYER_NOT_FOUND",
            SessionError::StaleCredentials => "STALE_CREDENTIALS",
            SessionError::BadTeamName => "BAD_TEAM_NAME",
            SessionError::BadPlayerName => "BAD_PLAYER_NAME",
            SessionError::TeamNameTaken => "TEAM_NAME_TAKEN",
            SessionError::PlayerNameTaken => "PLAYER_NAME_TAKEN",
            SessionError::LockHeld => "LOCK_HELD",
            SessionError::LockFrozen { .. } => "LOCK_FROZEN",
            SessionError::AlreadyGraded => "ALREADY_GRADED",
            SessionError::NoActiveRound => "NO_ACTIVE_ROUND",
            SessionError::WrongPhase => "WRONG_PHASE",
            SessionError::InvalidVote => "INVALID_VOTE",
            SessionError::InvalidPrice => "INVALID_PRICE",
            SessionError::NothingToReveal => "NOTHING_TO_REVEAL",
        }
    }

    /// Race losses are routine; they get a notice rather than an error frame.
    pub fn is_race_loss(&self) -> bool {
        matches!(
            self,
            SessionError::LockHeld
                | SessionError::LockFrozen { .. }
                | SessionError::AlreadyGraded
        )
    }
}
