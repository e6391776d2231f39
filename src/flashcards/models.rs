//! Data models for flashcard review scheduling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a card in the spaced repetition system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardStatus {
    /// Never reviewed
    New,
    /// In initial learning phase
    Learning,
    /// Regular spaced review
    Review,
    /// Failed and re-learning
    Relearning,
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Current spaced repetition schedule for a card
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSchedule {
    pub card_id: Uuid,
    /// Consecutive successful reviews; reset to 0 by a failed review
    #[serde(default)]
    pub repetitions: i32,
    /// SM-2 ease factor (default 2.5, floor 1.3)
    #[serde(default = "default_ease_factor")]
    pub ease_factor: f32,
    /// Current interval in days
    #[serde(default)]
    pub interval: i32,
    /// When the card is due for review
    pub due_date: DateTime<Utc>,
    /// Current status in the learning process
    #[serde(default)]
    pub status: CardStatus,
    /// Total number of reviews, never reset
    #[serde(default)]
    pub review_count: i32,
    /// Number of correct responses
    #[serde(default)]
    pub correct_count: i32,
}

fn default_ease_factor() -> f32 {
    2.5
}

impl CardSchedule {
    pub fn new(card_id: Uuid) -> Self {
        Self {
            card_id,
            repetitions: 0,
            ease_factor: 2.5,
            interval: 0,
            due_date: Utc::now(),
            status: CardStatus::New,
            review_count: 0,
            correct_count: 0,
        }
    }

    /// Check if the card is due for review
    pub fn is_due(&self) -> bool {
        Utc::now() >= self.due_date
    }
}

/// A record of a single review attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: Uuid,
    pub card_id: Uuid,
    /// Quality rating (0-5, SM-2 scale)
    /// 0 = complete blackout
    /// 1 = incorrect, but recognized
    /// 2 = incorrect, but easy to recall
    /// 3 = correct with difficulty
    /// 4 = correct with hesitation
    /// 5 = perfect response
    pub quality: i32,
    /// Interval at time of review (days)
    pub interval: i32,
    /// Ease factor at time of review
    pub ease_factor: f32,
    /// When the review occurred
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn new(card_id: Uuid, quality: i32, interval: i32, ease_factor: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            quality,
            interval,
            ease_factor,
            reviewed_at: Utc::now(),
        }
    }
}
