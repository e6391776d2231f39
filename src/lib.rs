//! didact — AI study-material generation, grading, and spaced repetition.
//!
//! The crate is the core behind a document-to-study-material product:
//! ingesting extracted document text, generating quiz questions and
//! flashcards through a pluggable completion backend, grading free-form
//! answers with partial credit, recognizing handwritten answers, and
//! scheduling flashcard review with SM-2.
//!
//! HTTP routing, auth, file extraction, and UI live in the surrounding
//! application; they call into this crate and persist through
//! [`storage::StudyStorage`].

pub mod agents;
pub mod backend;
pub mod flashcards;
pub mod storage;

pub use agents::{
    AgentError, AnswerGrader, ContentGenerator, GradeResult, HandwritingRecognizer, Orchestrator,
    StyleAnalyzer,
};
pub use backend::{CompletionRequest, HttpBackendConfig, OpenAiBackend, TextCompletionBackend};
pub use flashcards::{next_review, CardSchedule, ReviewOutcome};
pub use storage::{StorageError, StudyStorage};
