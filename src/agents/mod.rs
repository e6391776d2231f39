//! AI agents for study-material generation and grading
//!
//! This module provides:
//! - Style analysis of user-supplied sample questions
//! - Question/flashcard generation from source content
//! - Answer grading with partial credit
//! - Handwriting recognition with a correction feedback loop
//! - An orchestrator sequencing the above and keeping an audit trail

pub mod generator;
pub mod grader;
pub mod handwriting;
pub mod models;
pub mod orchestrator;
pub mod parse;
pub mod style;

pub use generator::{ContentGenerator, GenerationRequest};
pub use grader::{AnswerGrader, ComponentScore, GradeResult};
pub use handwriting::{HandwritingRecognizer, Recognition, RecognitionInput};
pub use models::*;
pub use orchestrator::{AnalysisStatus, GenerateOptions, Orchestrator, PreferenceSource};
pub use style::StyleAnalyzer;

use thiserror::Error;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("at least one sample question is required for analysis")]
    InsufficientSamples,

    #[error("no sample questions stored for category {0}")]
    NoSamples(Uuid),

    #[error("model returned malformed output: {0}")]
    MalformedResponse(String),

    #[error("model returned no usable items")]
    EmptyBatch,

    #[error("completion backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
