//! Handwriting recognition with a per-category correction feedback loop.
//!
//! The caller extracts whatever machine-readable text layer the upload has
//! and passes it in as a baseline; recognition layers the model's reading
//! on top, guided by past corrections from the same category. Recognition
//! sits on the answer-submission path, so it never fails outright: any
//! backend or parse problem falls back to the baseline text.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{CompletionRequest, TextCompletionBackend};
use crate::storage::StudyStorage;

use super::parse::extract_json;
use super::Result;

/// Confidence reported when recognition degrades to the baseline text.
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// How many recent corrections feed the prompt as exemplars.
const CORRECTION_WINDOW: usize = 50;

/// One learner correction of a recognition result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionEntry {
    pub id: Uuid,
    pub original_text: String,
    pub corrected_text: String,
    /// Question or answer context the correction happened in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CorrectionEntry {
    pub fn new(
        original_text: impl Into<String>,
        corrected_text: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_text: original_text.into(),
            corrected_text: corrected_text.into(),
            context,
            created_at: Utc::now(),
        }
    }
}

/// A recognized span of the answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub text: String,
    /// "text", "formula", "unit", "symbol", ...
    #[serde(rename = "type", default)]
    pub segment_type: String,
    #[serde(default)]
    pub confidence: f32,
    /// Ordinal position within the answer
    #[serde(default)]
    pub position: usize,
}

/// Result of recognizing one handwritten answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recognition {
    pub text: String,
    /// 0..1; fixed at 0.3 when recognition fell back to the baseline
    pub confidence: f32,
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// Alternative readings of ambiguous spans
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Domain tokens found in the answer (formulas, units, symbols)
    #[serde(default)]
    pub detected_tokens: Vec<String>,
}

impl Recognition {
    fn baseline(text: String) -> Self {
        Self {
            text,
            confidence: FALLBACK_CONFIDENCE,
            segments: Vec::new(),
            alternatives: Vec::new(),
            detected_tokens: Vec::new(),
        }
    }
}

/// Input for one recognition call
#[derive(Debug, Clone)]
pub struct RecognitionInput {
    /// Machine-readable text layer extracted from the upload, possibly empty
    pub baseline_text: String,
    /// The question being answered, for context
    pub question_context: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecognition {
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    detected_tokens: Vec<String>,
}

pub struct HandwritingRecognizer {
    backend: Arc<dyn TextCompletionBackend>,
    storage: Arc<StudyStorage>,
}

impl HandwritingRecognizer {
    pub fn new(backend: Arc<dyn TextCompletionBackend>, storage: Arc<StudyStorage>) -> Self {
        Self { backend, storage }
    }

    /// Recognize one handwritten answer. Never fails: backend or parse
    /// problems degrade to the baseline text at low confidence.
    pub async fn recognize(&self, category_id: Uuid, input: &RecognitionInput) -> Recognition {
        let corrections = match self.storage.recent_corrections(category_id, CORRECTION_WINDOW) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not load correction log for {}: {}", category_id, e);
                Vec::new()
            }
        };

        let prompt = build_recognition_prompt(input, &corrections);

        let raw = match self
            .backend
            .complete(
                CompletionRequest::new(prompt)
                    .with_temperature(0.2)
                    .with_max_tokens(2048),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Recognition call failed ({}), using baseline text", e);
                return Recognition::baseline(input.baseline_text.clone());
            }
        };

        match parse_recognition(&raw) {
            Ok(recognition) => recognition,
            Err(e) => {
                log::warn!("Recognition output unparseable ({}), using baseline text", e);
                Recognition::baseline(input.baseline_text.clone())
            }
        }
    }

    /// Record a learner's edit of a recognition result. The correction is
    /// scoped to the category and consulted by future recognition calls.
    /// No-op edits (identical text) are not recorded.
    pub fn record_correction(
        &self,
        category_id: Uuid,
        original_text: &str,
        corrected_text: &str,
        context: Option<String>,
    ) -> Result<Option<CorrectionEntry>> {
        if original_text == corrected_text {
            return Ok(None);
        }

        let entry = CorrectionEntry::new(original_text, corrected_text, context);
        self.storage.append_correction(category_id, &entry)?;
        log::info!(
            "Recorded handwriting correction for category {}",
            category_id
        );
        Ok(Some(entry))
    }
}

fn parse_recognition(raw: &str) -> Result<Recognition> {
    let value = extract_json(raw)?;
    let parsed: RawRecognition = serde_json::from_value(value)
        .map_err(|e| super::AgentError::MalformedResponse(e.to_string()))?;

    Ok(Recognition {
        text: parsed.text,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        segments: parsed.segments,
        alternatives: parsed.alternatives,
        detected_tokens: parsed.detected_tokens,
    })
}

fn build_recognition_prompt(input: &RecognitionInput, corrections: &[CorrectionEntry]) -> String {
    let mut prompt = String::from(
        "Transcribe a student's handwritten answer. A rough machine-extracted \
         text layer is provided; correct its errors using the question context \
         and the known correction patterns for this class.\n",
    );

    if let Some(ref context) = input.question_context {
        let _ = write!(prompt, "\nQuestion being answered: {}\n", context);
    }

    let _ = write!(
        prompt,
        "\nExtracted text layer:\n---\n{}\n---\n",
        input.baseline_text
    );

    if !corrections.is_empty() {
        prompt.push_str("\nPast corrections from this class (original -> corrected):\n");
        for entry in corrections {
            let _ = writeln!(
                prompt,
                "- \"{}\" should be corrected to \"{}\"",
                entry.original_text, entry.corrected_text
            );
        }
    }

    prompt.push_str(
        "\nRespond with ONLY a JSON object:\n\
         {\n\
         \"text\": \"the full corrected transcription\",\n\
         \"confidence\": 0.0,\n\
         \"segments\": [{\"text\": \"...\", \"type\": \"text|formula|unit|symbol\", \
         \"confidence\": 0.0, \"position\": 0}],\n\
         \"alternatives\": [\"other plausible readings of ambiguous spans\"],\n\
         \"detectedTokens\": [\"formulas, units, and symbols found\"]\n\
         }",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testutil::{FailingBackend, FakeBackend};
    use tempfile::TempDir;

    fn storage() -> (TempDir, Arc<StudyStorage>) {
        let dir = TempDir::new().unwrap();
        let storage = StudyStorage::new(dir.path().to_path_buf());
        storage.init().unwrap();
        (dir, Arc::new(storage))
    }

    fn input() -> RecognitionInput {
        RecognitionInput {
            baseline_text: "the mitochondrla is the powerhouse".to_string(),
            question_context: Some("What organelle produces ATP?".to_string()),
        }
    }

    const RECOGNITION_JSON: &str = r#"{
        "text": "the mitochondria is the powerhouse",
        "confidence": 0.92,
        "segments": [
            {"text": "the mitochondria", "type": "text", "confidence": 0.9, "position": 0},
            {"text": "is the powerhouse", "type": "text", "confidence": 0.95, "position": 1}
        ],
        "alternatives": ["the mitochondrion is the powerhouse"],
        "detectedTokens": []
    }"#;

    #[tokio::test]
    async fn test_successful_recognition() {
        let (_dir, storage) = storage();
        let backend = Arc::new(FakeBackend::new(vec![RECOGNITION_JSON]));
        let recognizer = HandwritingRecognizer::new(backend.clone(), storage);

        let result = recognizer.recognize(Uuid::new_v4(), &input()).await;
        assert_eq!(result.text, "the mitochondria is the powerhouse");
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert_eq!(result.segments.len(), 2);

        // Question context and baseline both reached the prompt
        let prompt = backend.last_prompt();
        assert!(prompt.contains("What organelle produces ATP?"));
        assert!(prompt.contains("mitochondrla"));
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_baseline() {
        let (_dir, storage) = storage();
        let recognizer = HandwritingRecognizer::new(Arc::new(FailingBackend), storage);

        let result = recognizer.recognize(Uuid::new_v4(), &input()).await;
        assert_eq!(result.text, "the mitochondrla is the powerhouse");
        assert!((result.confidence - FALLBACK_CONFIDENCE).abs() < 1e-6);
        assert!(result.segments.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back_to_baseline() {
        let (_dir, storage) = storage();
        let backend = Arc::new(FakeBackend::new(vec!["I can't read this image"]));
        let recognizer = HandwritingRecognizer::new(backend, storage);

        let result = recognizer.recognize(Uuid::new_v4(), &input()).await;
        assert_eq!(result.text, "the mitochondrla is the powerhouse");
        assert!((result.confidence - FALLBACK_CONFIDENCE).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_confidence_clamped_into_unit_range() {
        let (_dir, storage) = storage();
        let over = r#"{"text": "abc", "confidence": 3.5}"#;
        let backend = Arc::new(FakeBackend::new(vec![over]));
        let recognizer = HandwritingRecognizer::new(backend, storage);

        let result = recognizer.recognize(Uuid::new_v4(), &input()).await;
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_corrections_feed_future_prompts() {
        let (_dir, storage) = storage();
        let backend = Arc::new(FakeBackend::new(vec![RECOGNITION_JSON]));
        let recognizer = HandwritingRecognizer::new(backend.clone(), storage);
        let category = Uuid::new_v4();

        recognizer
            .record_correction(category, "mitochondrla", "mitochondria", None)
            .unwrap();

        recognizer.recognize(category, &input()).await;

        let prompt = backend.last_prompt();
        assert!(prompt.contains("\"mitochondrla\" should be corrected to \"mitochondria\""));
    }

    #[test]
    fn test_noop_correction_not_recorded() {
        let (_dir, storage) = storage();
        let recognizer =
            HandwritingRecognizer::new(Arc::new(FailingBackend), storage.clone());
        let category = Uuid::new_v4();

        let recorded = recognizer
            .record_correction(category, "same", "same", None)
            .unwrap();
        assert!(recorded.is_none());
        assert!(storage.recent_corrections(category, 10).unwrap().is_empty());
    }

    #[test]
    fn test_corrections_scoped_per_category() {
        let (_dir, storage) = storage();
        let recognizer =
            HandwritingRecognizer::new(Arc::new(FailingBackend), storage.clone());

        let class_a = Uuid::new_v4();
        let class_b = Uuid::new_v4();

        recognizer
            .record_correction(class_a, "2x", "2x^2", None)
            .unwrap();

        assert_eq!(storage.recent_corrections(class_a, 10).unwrap().len(), 1);
        assert!(storage.recent_corrections(class_b, 10).unwrap().is_empty());
    }
}
