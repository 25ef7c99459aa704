use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type TeamId = String;
pub type PlayerId = String;
pub type RoundRef = String;

/// Fixed 8-value team color palette. Indices are 1-based on the wire so they
/// line up with the display's CSS variables.
pub const TEAM_COLORS: [(&str, &str); 8] = [
    ("Coral", "#FF6B6B"),
    ("Teal", "#4ECDC4"),
    ("Yellow", "#FFE66D"),
    ("Mint", "#95E1D3"),
    ("Plum", "#DDA0DD"),
    ("Sky", "#87CEEB"),
    ("Sand", "#F4A460"),
    ("Seafoam", "#98D8C8"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Operator,
    Display,
    Player,
}

/// The single active round-type of the session, with its phase-scoped payload.
///
/// Serialized adjacently as `{"phase": "...", "payload": {...}}` so the wire
/// shape of `state_change` and `sync_state` carries both in one object.
/// Transitions are unconditional: the operator may jump from any phase to any
/// phase, and every phase-scoped subsystem treats the transition as its
/// cancellation signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    FreeformChallenge {
        prompt: String,
    },
    Trivia {
        round_ref: RoundRef,
        question_text: String,
    },
    Timer {
        duration_seconds: u64,
        #[serde(default)]
        message: String,
    },
    BuzzIn {
        round_ref: RoundRef,
        #[serde(default)]
        hint: String,
    },
    Sequencing {
        round_ref: RoundRef,
        items: Vec<String>,
        /// Answer key; stripped by `sanitized()` before any client broadcast.
        #[serde(default)]
        correct_order: Vec<usize>,
    },
    EliminationGrid,
    ImageGuess {
        round_ref: RoundRef,
        image_url: String,
        #[serde(default)]
        hint: String,
        #[serde(default)]
        correct_answer: Option<String>,
    },
    PixelReveal {
        round_ref: RoundRef,
        image_url: String,
        #[serde(default)]
        correct_answer: Option<String>,
    },
    PriceGuess {
        round_ref: RoundRef,
        image_url: String,
        #[serde(default)]
        hint: String,
        #[serde(default)]
        actual_price: Option<f64>,
    },
    BinaryChoice {
        round_ref: RoundRef,
        question_text: String,
        option_a: String,
        option_b: String,
    },
    Victory {
        #[serde(default)]
        standings: Vec<Standing>,
    },
}

impl Phase {
    /// Copy of this phase with answer keys stripped, safe to send to clients.
    pub fn sanitized(&self) -> Phase {
        let mut phase = self.clone();
        match &mut phase {
            Phase::Sequencing { correct_order, .. } => correct_order.clear(),
            Phase::ImageGuess { correct_answer, .. }
            | Phase::PixelReveal { correct_answer, .. } => *correct_answer = None,
            Phase::PriceGuess { actual_price, .. } => *actual_price = None,
            _ => {}
        }
        phase
    }

    /// The collab round this phase accepts typing/submissions for, if any.
    pub fn round_ref(&self) -> Option<&RoundRef> {
        match self {
            Phase::Trivia { round_ref, .. }
            | Phase::BuzzIn { round_ref, .. }
            | Phase::Sequencing { round_ref, .. }
            | Phase::ImageGuess { round_ref, .. }
            | Phase::PixelReveal { round_ref, .. }
            | Phase::PriceGuess { round_ref, .. }
            | Phase::BinaryChoice { round_ref, .. } => Some(round_ref),
            _ => None,
        }
    }

    /// Whether the lock arbiter is live in this phase.
    pub fn uses_lock(&self) -> bool {
        matches!(self, Phase::BuzzIn { .. } | Phase::PixelReveal { .. })
    }

    /// Wire tag of this phase, for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Lobby => "LOBBY",
            Phase::FreeformChallenge { .. } => "FREEFORM_CHALLENGE",
            Phase::Trivia { .. } => "TRIVIA",
            Phase::Timer { .. } => "TIMER",
            Phase::BuzzIn { .. } => "BUZZ_IN",
            Phase::Sequencing { .. } => "SEQUENCING",
            Phase::EliminationGrid => "ELIMINATION_GRID",
            Phase::ImageGuess { .. } => "IMAGE_GUESS",
            Phase::PixelReveal { .. } => "PIXEL_REVEAL",
            Phase::PriceGuess { .. } => "PRICE_GUESS",
            Phase::BinaryChoice { .. } => "BINARY_CHOICE",
            Phase::Victory { .. } => "VICTORY",
        }
    }
}

/// One leaderboard row for the Victory phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Standing {
    pub rank: u32,
    pub team_id: TeamId,
    pub team_name: String,
    pub score: i64,
    pub color: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// False while the device is silently gone; flipped back on rejoin.
    pub connected: bool,
    #[serde(skip)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub join_code: String,
    /// 1-based index into the 8-value palette, never reused while the team lives.
    pub color: u8,
    pub avatar: Option<String>,
    /// Ordered by join time; the first entry is the team creator.
    pub players: Vec<Player>,
    pub score: i64,
    /// Instant the team last reached its current score. Victory tie-break:
    /// equal scores rank by whoever got there first.
    #[serde(skip)]
    pub score_reached_at: DateTime<Utc>,
    pub eliminated: bool,
}

impl Team {
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }
}

/// Roster info broadcast alongside scores (`score_update`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team_id: TeamId,
    pub name: String,
    pub color: u8,
    pub avatar: Option<String>,
    pub eliminated: bool,
    pub players: Vec<String>,
}

impl From<&Team> for TeamInfo {
    fn from(t: &Team) -> Self {
        Self {
            team_id: t.id.clone(),
            name: t.name.clone(),
            color: t.color,
            avatar: t.avatar.clone(),
            eliminated: t.eliminated,
            players: t.players.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

/// Roster entry sent to teammates (`player_joined`, `creation_result`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub connected: bool,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            player_id: p.id.clone(),
            name: p.name.clone(),
            connected: p.connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_with_tag_and_payload() {
        let phase = Phase::Trivia {
            round_ref: "q1".into(),
            question_text: "Who?".into(),
        };
        let json = serde_json::to_value(&phase).unwrap();
        assert_eq!(json["phase"], "TRIVIA");
        assert_eq!(json["payload"]["round_ref"], "q1");
    }

    #[test]
    fn sanitized_strips_answer_keys() {
        let phase = Phase::Sequencing {
            round_ref: "s1".into(),
            items: vec!["a".into(), "b".into()],
            correct_order: vec![1, 0],
        };
        match phase.sanitized() {
            Phase::Sequencing { correct_order, items, .. } => {
                assert!(correct_order.is_empty());
                assert_eq!(items.len(), 2);
            }
            _ => panic!("variant changed"),
        }

        let phase = Phase::PriceGuess {
            round_ref: "p1".into(),
            image_url: "http://x/y.jpg".into(),
            hint: String::new(),
            actual_price: Some(49.99),
        };
        match phase.sanitized() {
            Phase::PriceGuess { actual_price, .. } => assert!(actual_price.is_none()),
            _ => panic!("variant changed"),
        }
    }

    #[test]
    fn lock_phases() {
        assert!(Phase::BuzzIn { round_ref: "r".into(), hint: String::new() }.uses_lock());
        assert!(!Phase::Lobby.uses_lock());
    }
}
