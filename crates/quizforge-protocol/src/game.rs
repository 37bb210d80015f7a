//! Per-room game state: question cursor, phase, settings, leaderboard rows.

use serde::{Deserialize, Serialize};

use crate::{PlayerId, Question};

/// Lowest accepted per-room countdown override, in seconds.
pub const MIN_DEFAULT_TIMER: u32 = 5;
/// Highest accepted per-room countdown override, in seconds.
pub const MAX_DEFAULT_TIMER: u32 = 120;

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Host-chosen options fixed at room creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Replaces every question's countdown when set.
    #[serde(default)]
    pub default_timer: Option<u32>,
}

impl RoomSettings {
    /// Builds settings from a requested timer, dropping values outside
    /// `5..=120` seconds.
    pub fn with_default_timer(requested: Option<i64>) -> Self {
        let default_timer = requested
            .and_then(|secs| u32::try_from(secs).ok())
            .filter(|secs| (MIN_DEFAULT_TIMER..=MAX_DEFAULT_TIMER).contains(secs));
        Self { default_timer }
    }
}

// ---------------------------------------------------------------------------
// GamePhase
// ---------------------------------------------------------------------------

/// Where a room is in its quiz.
///
/// ```text
/// waiting → question → reveal → (leaderboard) → question … → ended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Question,
    Reveal,
    Leaderboard,
    Ended,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The question list and cursor for one room.
///
/// The phase is never stored; [`GameState::phase`] derives it from the
/// cursor and the `revealed`/`showing_leaderboard`/`ended` flags so the
/// two can't drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(default)]
    pub questions: Vec<Question>,
    /// `None` until the first question is served.
    #[serde(rename = "currentQuestionIndex", default)]
    pub cursor: Option<usize>,
    #[serde(default)]
    pub current_question: Option<Question>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub question_start_time: Option<u64>,
    pub is_active: bool,
    #[serde(default)]
    pub revealed: bool,
    #[serde(default)]
    pub showing_leaderboard: bool,
    #[serde(default)]
    pub ended: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            questions: Vec::new(),
            cursor: None,
            current_question: None,
            question_start_time: None,
            is_active: true,
            revealed: false,
            showing_leaderboard: false,
            ended: false,
        }
    }
}

impl GameState {
    pub fn phase(&self) -> GamePhase {
        if self.ended {
            GamePhase::Ended
        } else if self.cursor.is_none() {
            GamePhase::Waiting
        } else if self.showing_leaderboard {
            GamePhase::Leaderboard
        } else if self.revealed {
            GamePhase::Reveal
        } else {
            GamePhase::Question
        }
    }

    /// Replaces the question list. The cursor is left alone, so a reload
    /// mid-game keeps the host's place.
    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.questions = questions;
    }

    /// Moves the cursor one step forward and returns the new question.
    ///
    /// Returns `None` without touching anything once the list is
    /// exhausted.
    pub fn advance(&mut self, now_ms: u64) -> Option<&Question> {
        let next = self.cursor.map_or(0, |i| i + 1);
        let question = self.questions.get(next)?.clone();
        self.cursor = Some(next);
        self.current_question = Some(question);
        self.question_start_time = Some(now_ms);
        self.revealed = false;
        self.showing_leaderboard = false;
        self.ended = false;
        self.current_question.as_ref()
    }

    /// The question under the cursor, if any.
    pub fn current(&self) -> Option<&Question> {
        self.cursor.and_then(|i| self.questions.get(i))
    }

    /// Cursor as the wire expects it: `-1` before the first question.
    pub fn question_index(&self) -> i64 {
        self.cursor.map_or(-1, |i| i as i64)
    }

    pub fn reveal(&mut self) {
        self.revealed = true;
        self.showing_leaderboard = false;
    }

    pub fn show_leaderboard(&mut self) {
        self.showing_leaderboard = true;
    }

    /// Ends the game and rewinds the cursor so the host can start again.
    pub fn finish(&mut self) {
        self.cursor = None;
        self.current_question = None;
        self.question_start_time = None;
        self.revealed = false;
        self.showing_leaderboard = false;
        self.ended = true;
    }
}

// ---------------------------------------------------------------------------
// LeaderboardEntry
// ---------------------------------------------------------------------------

/// One ranked row of a room's leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: i64,
    /// 1-based, distinct even for tied scores.
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}
