//! File-backed storage for study-material records
//!
//! Directory structure:
//! ```text
//! {data_dir}/
//! ├── categories/{category-id}/
//! │   ├── samples.json          # Sample questions for style analysis
//! │   ├── style_profile.json    # At most one profile per category
//! │   ├── corrections.json      # Handwriting correction log (append-only)
//! │   └── messages.json         # Agent audit log (append-only)
//! ├── grades/
//! │   └── {session}_{question}.json
//! ├── schedules/
//! │   └── {card-id}.json        # Card spaced repetition state
//! └── reviews/
//!     └── {card-id}.json        # Review history per card
//! ```
//!
//! Every record lives in its own file keyed by id, so concurrent writes to
//! different keys never conflict; same-key writes are last-writer-wins.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::agents::handwriting::CorrectionEntry;
use crate::agents::models::{AgentMessage, QuestionType, SampleQuestion, StyleProfile};
use crate::flashcards::algorithm::{next_review, ReviewOutcome};
use crate::flashcards::models::{CardSchedule, ReviewRecord};

/// Correction entries kept per category. Oldest entries drop first once the
/// cap is reached; the recognition prompt only ever reads a recent window.
const CORRECTION_LOG_CAP: usize = 500;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("grade not found for session {session} question {question}")]
    GradeNotFound { session: Uuid, question: Uuid },

    #[error("invalid data directory")]
    InvalidDataDir,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage manager for all study-material records
pub struct StudyStorage {
    data_dir: PathBuf,
}

impl StudyStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Default data directory (e.g., ~/.local/share/didact)
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|d| d.join("didact"))
            .ok_or(StorageError::InvalidDataDir)
    }

    fn category_dir(&self, category_id: Uuid) -> PathBuf {
        self.data_dir
            .join("categories")
            .join(category_id.to_string())
    }

    fn samples_path(&self, category_id: Uuid) -> PathBuf {
        self.category_dir(category_id).join("samples.json")
    }

    fn profile_path(&self, category_id: Uuid) -> PathBuf {
        self.category_dir(category_id).join("style_profile.json")
    }

    fn corrections_path(&self, category_id: Uuid) -> PathBuf {
        self.category_dir(category_id).join("corrections.json")
    }

    fn messages_path(&self, category_id: Uuid) -> PathBuf {
        self.category_dir(category_id).join("messages.json")
    }

    fn grade_path(&self, session_id: Uuid, question_id: Uuid) -> PathBuf {
        self.data_dir
            .join("grades")
            .join(format!("{}_{}.json", session_id, question_id))
    }

    fn schedule_path(&self, card_id: Uuid) -> PathBuf {
        self.data_dir
            .join("schedules")
            .join(format!("{}.json", card_id))
    }

    fn reviews_path(&self, card_id: Uuid) -> PathBuf {
        self.data_dir
            .join("reviews")
            .join(format!("{}.json", card_id))
    }

    /// Initialize the storage tree
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir.join("categories"))?;
        fs::create_dir_all(self.data_dir.join("grades"))?;
        fs::create_dir_all(self.data_dir.join("schedules"))?;
        fs::create_dir_all(self.data_dir.join("reviews"))?;
        Ok(())
    }

    fn read_list<T: serde::de::DeserializeOwned>(&self, path: &PathBuf) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_list<T: serde::Serialize>(&self, path: &PathBuf, list: &[T]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(list)?)?;
        Ok(())
    }

    // ==================== Sample Questions ====================

    /// Add a sample question to a category
    pub fn add_sample(&self, category_id: Uuid, sample: &SampleQuestion) -> Result<()> {
        let path = self.samples_path(category_id);
        let mut samples: Vec<SampleQuestion> = self.read_list(&path)?;
        samples.push(sample.clone());
        self.write_list(&path, &samples)
    }

    /// List all sample questions for a category
    pub fn list_samples(&self, category_id: Uuid) -> Result<Vec<SampleQuestion>> {
        self.read_list(&self.samples_path(category_id))
    }

    /// Count samples per question type
    pub fn sample_counts(&self, category_id: Uuid) -> Result<HashMap<QuestionType, usize>> {
        let samples = self.list_samples(category_id)?;
        let mut counts = HashMap::new();
        for sample in &samples {
            *counts.entry(sample.question_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    // ==================== Style Profile ====================

    /// Store the style profile for a category, replacing any existing one
    pub fn upsert_style_profile(&self, profile: &StyleProfile) -> Result<()> {
        let path = self.profile_path(profile.category_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(profile)?)?;
        Ok(())
    }

    /// Get the style profile for a category, if one exists
    pub fn get_style_profile(&self, category_id: Uuid) -> Result<Option<StyleProfile>> {
        let path = self.profile_path(category_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Delete the style profile for a category, forcing re-analysis
    pub fn delete_style_profile(&self, category_id: Uuid) -> Result<()> {
        let path = self.profile_path(category_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    // ==================== Correction Log ====================

    /// Append a handwriting correction for a category
    pub fn append_correction(&self, category_id: Uuid, entry: &CorrectionEntry) -> Result<()> {
        let path = self.corrections_path(category_id);
        let mut entries: Vec<CorrectionEntry> = self.read_list(&path)?;
        entries.push(entry.clone());
        if entries.len() > CORRECTION_LOG_CAP {
            let excess = entries.len() - CORRECTION_LOG_CAP;
            entries.drain(..excess);
        }
        self.write_list(&path, &entries)
    }

    /// Most recent corrections for a category, newest last
    pub fn recent_corrections(
        &self,
        category_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CorrectionEntry>> {
        let entries: Vec<CorrectionEntry> =
            self.read_list(&self.corrections_path(category_id))?;
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].to_vec())
    }

    // ==================== Agent Audit Log ====================

    /// Append an audit message for a category
    pub fn append_message(&self, category_id: Uuid, message: &AgentMessage) -> Result<()> {
        let path = self.messages_path(category_id);
        let mut messages: Vec<AgentMessage> = self.read_list(&path)?;
        messages.push(message.clone());
        self.write_list(&path, &messages)
    }

    /// List audit messages for a category, oldest first, up to `limit`
    /// of the most recent
    pub fn list_messages(&self, category_id: Uuid, limit: usize) -> Result<Vec<AgentMessage>> {
        let messages: Vec<AgentMessage> = self.read_list(&self.messages_path(category_id))?;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    // ==================== Grades ====================

    /// Store a grade keyed by (session, question); overwrites any prior grade
    pub fn put_grade(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        grade: &crate::agents::grader::GradeResult,
    ) -> Result<()> {
        let path = self.grade_path(session_id, question_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(grade)?)?;
        Ok(())
    }

    /// Get the stored grade for a (session, question) pair
    pub fn get_grade(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> Result<crate::agents::grader::GradeResult> {
        let path = self.grade_path(session_id, question_id);
        if !path.exists() {
            return Err(StorageError::GradeNotFound {
                session: session_id,
                question: question_id,
            });
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    // ==================== Schedules ====================

    /// Get the schedule for a card, defaulting to a fresh one if missing
    pub fn get_schedule(&self, card_id: Uuid) -> Result<CardSchedule> {
        let path = self.schedule_path(card_id);
        if !path.exists() {
            return Ok(CardSchedule::new(card_id));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Store the schedule for a card
    pub fn put_schedule(&self, schedule: &CardSchedule) -> Result<()> {
        let path = self.schedule_path(schedule.card_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(schedule)?)?;
        Ok(())
    }

    /// Delete the schedule and review history for a card
    pub fn delete_schedule(&self, card_id: Uuid) -> Result<()> {
        let schedule_path = self.schedule_path(card_id);
        if schedule_path.exists() {
            fs::remove_file(&schedule_path)?;
        }
        let reviews_path = self.reviews_path(card_id);
        if reviews_path.exists() {
            fs::remove_file(&reviews_path)?;
        }
        Ok(())
    }

    /// Apply a review to a card: run the SM-2 transition, persist the new
    /// schedule, and append to the review history
    pub fn review_card(&self, card_id: Uuid, quality: i32) -> Result<CardSchedule> {
        let mut schedule = self.get_schedule(card_id)?;

        let record = ReviewRecord::new(card_id, quality, schedule.interval, schedule.ease_factor);

        let ReviewOutcome {
            repetitions,
            interval,
            ease_factor,
            due_date,
            status,
        } = next_review(&schedule, quality);

        schedule.repetitions = repetitions;
        schedule.interval = interval;
        schedule.ease_factor = ease_factor;
        schedule.due_date = due_date;
        schedule.status = status;
        schedule.review_count += 1;
        if quality >= 3 {
            schedule.correct_count += 1;
        }

        self.put_schedule(&schedule)?;

        let reviews_path = self.reviews_path(card_id);
        let mut history: Vec<ReviewRecord> = self.read_list(&reviews_path)?;
        history.push(record);
        self.write_list(&reviews_path, &history)?;

        Ok(schedule)
    }

    /// Review history for a card, oldest first
    pub fn review_history(&self, card_id: Uuid) -> Result<Vec<ReviewRecord>> {
        self.read_list(&self.reviews_path(card_id))
    }
}
