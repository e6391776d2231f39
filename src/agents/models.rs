//! Data models shared by the generation, analysis, and grading agents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of quiz question or flashcard prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    /// Pick one lettered option
    MultipleChoice,
    /// True or false
    TrueFalse,
    /// Free-form written answer
    Written,
    /// Fill in the blank
    FillBlank,
}

impl QuestionType {
    /// True for types answered by selecting a fixed option
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::MultipleChoice | Self::TrueFalse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple choice",
            Self::TrueFalse => "true/false",
            Self::Written => "written answer",
            Self::FillBlank => "fill in the blank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

/// A user-supplied question used as a style sample
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleQuestion {
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Derived description of a category's question-writing conventions.
///
/// At most one profile exists per category; re-analysis replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleProfile {
    pub category_id: Uuid,
    /// How the samples phrase things (tone, vocabulary, sentence length)
    pub language_style: String,
    /// Structural conventions (stem shape, option ordering, blank placement)
    pub structural_patterns: String,
    /// Per question type pattern notes
    #[serde(default)]
    pub type_patterns: HashMap<QuestionType, String>,
    /// Free-text recommendations for future generation
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Number of samples the analysis saw
    pub sample_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Result of a style analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleAnalysis {
    pub profile: StyleProfile,
    pub samples_analyzed: usize,
}

/// A generated question or flashcard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedItem {
    pub text: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    /// Lettered options ("A) ..."); empty for written/fill-blank types
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Topic tags assigned by the model
    #[serde(default)]
    pub topics: Vec<String>,
    /// Chapter or section of the source content this item came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

/// Outcome of one generation call. A shortfall is a soft signal, not an
/// error: the caller decides whether to retry for the missing items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBatch {
    pub items: Vec<GeneratedItem>,
    pub requested: usize,
}

impl GenerationBatch {
    /// How many requested items did not survive validation
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.items.len())
    }

    pub fn is_complete(&self) -> bool {
        self.items.len() >= self.requested
    }
}

/// A weak area identified from a learner's answer history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakTopic {
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    /// Fraction of answers correct for this slice (0..1)
    pub accuracy: f32,
}

/// Optional signals used to bias generation toward a specific learner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationSignals {
    /// Question texts the learner rated highly
    #[serde(default)]
    pub exemplars: Vec<String>,
    /// Slices where the learner's accuracy is low
    #[serde(default)]
    pub weak_topics: Vec<WeakTopic>,
    /// Aggregate accuracy across all answered questions (0..1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_accuracy: Option<f32>,
}

impl PersonalizationSignals {
    pub fn is_empty(&self) -> bool {
        self.exemplars.is_empty() && self.weak_topics.is_empty() && self.overall_accuracy.is_none()
    }
}

/// Processing status of an audit message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageStatus {
    Pending,
    Processed,
}

/// Append-only audit record of inter-agent traffic.
///
/// Observability only — downstream computation never depends on these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub message_type: String,
    /// Opaque payload; shape varies per message type
    pub payload: serde_json::Value,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl AgentMessage {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            message_type: message_type.into(),
            payload,
            status: MessageStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn mark_processed(&mut self) {
        self.status = MessageStatus::Processed;
        self.processed_at = Some(Utc::now());
    }
}
