//! Question and flashcard generation from source content.
//!
//! One model call per batch. Invalid items are dropped rather than failing
//! the whole batch; an entirely invalid batch is a hard error.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;

use crate::backend::{CompletionRequest, TextCompletionBackend};

use super::models::{
    Difficulty, GeneratedItem, GenerationBatch, PersonalizationSignals, QuestionType, StyleProfile,
};
use super::parse::extract_json;
use super::{AgentError, Result};

/// Bounded prefix of the source content sent to the model (characters).
/// Keeps prompts inside provider context limits for typical chapter uploads.
const MAX_SOURCE_CHARS: usize = 7500;

/// Batch size bounds
const MIN_COUNT: usize = 1;
const MAX_COUNT: usize = 50;

/// Request for one generation batch
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Source text to generate from; truncated to a bounded prefix
    pub content: String,
    /// Desired number of items, clamped to 1..=50
    pub count: usize,
    pub difficulty: Difficulty,
    pub question_type: QuestionType,
    /// Free-text instructions appended verbatim
    pub custom_directions: Option<String>,
    /// Style profile to imitate, if one exists for the category
    pub style: Option<StyleProfile>,
    /// Learner signals to bias topic and style selection
    pub signals: Option<PersonalizationSignals>,
}

impl GenerationRequest {
    pub fn new(content: impl Into<String>, count: usize, question_type: QuestionType) -> Self {
        Self {
            content: content.into(),
            count,
            difficulty: Difficulty::default(),
            question_type,
            custom_directions: None,
            style: None,
            signals: None,
        }
    }
}

pub struct ContentGenerator {
    backend: Arc<dyn TextCompletionBackend>,
}

/// Item shape inside the `{"questions": [...]}` envelope
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    #[serde(default, alias = "question")]
    text: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct_answer: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    source_ref: Option<String>,
}

impl ContentGenerator {
    pub fn new(backend: Arc<dyn TextCompletionBackend>) -> Self {
        Self { backend }
    }

    /// Generate a batch of items. Returns the valid subset; zero valid
    /// items is an error, fewer than requested is a shortfall the caller
    /// can inspect on the batch.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationBatch> {
        let count = request.count.clamp(MIN_COUNT, MAX_COUNT);
        let prompt = build_generation_prompt(request, count);

        log::info!(
            "Generating {} {} items at {} difficulty",
            count,
            request.question_type.as_str(),
            request.difficulty.as_str()
        );

        let raw = self
            .backend
            .complete(CompletionRequest::new(prompt))
            .await?;

        let value = extract_json(&raw)?;
        let raw_items = value
            .get("questions")
            .and_then(|q| q.as_array())
            .cloned()
            .ok_or_else(|| {
                AgentError::MalformedResponse("missing \"questions\" array".to_string())
            })?;

        let mut items = Vec::new();
        for raw_item in raw_items {
            let Ok(item) = serde_json::from_value::<RawItem>(raw_item) else {
                continue;
            };
            if let Some(valid) = validate_item(item, request.question_type, request.difficulty) {
                items.push(valid);
            }
        }

        if items.is_empty() {
            return Err(AgentError::EmptyBatch);
        }

        if items.len() < count {
            log::warn!(
                "Generation shortfall: {} of {} items survived validation",
                items.len(),
                count
            );
        }

        Ok(GenerationBatch {
            items,
            requested: count,
        })
    }
}

/// Drop items missing required fields or violating the option/answer
/// invariant for choice types.
fn validate_item(
    raw: RawItem,
    question_type: QuestionType,
    difficulty: Difficulty,
) -> Option<GeneratedItem> {
    let text = raw.text.trim().to_string();
    let correct_answer = raw.correct_answer.trim().to_string();

    if text.is_empty() || correct_answer.is_empty() {
        return None;
    }

    if question_type.is_choice() {
        if raw.options.is_empty() {
            return None;
        }
        // Correct answer must be a letter addressing one of the options
        let letter = correct_answer.chars().next()?.to_ascii_uppercase();
        let index = (letter as i32) - ('A' as i32);
        if index < 0 || index as usize >= raw.options.len() {
            return None;
        }
    }

    Some(GeneratedItem {
        text,
        question_type,
        difficulty,
        options: if question_type.is_choice() {
            raw.options
        } else {
            Vec::new()
        },
        correct_answer,
        explanation: raw.explanation,
        topics: raw.topics,
        source_ref: raw.source_ref,
    })
}

/// Per-type formatting instructions with a worked example shape.
/// Data-driven lookup: every type maps to one fixed template.
fn format_instructions(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => {
            "Each question has exactly four options prefixed \"A) \", \"B) \", \
             \"C) \", \"D) \". The correctAnswer field is the single letter of \
             the right option.\n\
             Example item: {\"text\": \"Which gas do plants absorb?\", \
             \"options\": [\"A) Oxygen\", \"B) Carbon dioxide\", \"C) Nitrogen\", \
             \"D) Helium\"], \"correctAnswer\": \"B\", \
             \"explanation\": \"Photosynthesis consumes CO2.\", \
             \"topics\": [\"photosynthesis\"]}"
        }
        QuestionType::TrueFalse => {
            "Each question is a statement with options [\"A) True\", \"B) False\"]. \
             The correctAnswer field is \"A\" or \"B\".\n\
             Example item: {\"text\": \"Water boils at 100C at sea level.\", \
             \"options\": [\"A) True\", \"B) False\"], \"correctAnswer\": \"A\", \
             \"explanation\": \"Standard atmospheric pressure.\", \
             \"topics\": [\"states of matter\"]}"
        }
        QuestionType::Written => {
            "Each question requires a free-form written answer. Leave options \
             empty. The correctAnswer field holds a model answer.\n\
             Example item: {\"text\": \"Explain why the sky appears blue.\", \
             \"options\": [], \"correctAnswer\": \"Rayleigh scattering disperses \
             shorter blue wavelengths more than longer ones.\", \
             \"topics\": [\"optics\"]}"
        }
        QuestionType::FillBlank => {
            "Each question contains a blank written as \"_____\". Leave options \
             empty. The correctAnswer field holds the text that fills the blank.\n\
             Example item: {\"text\": \"The powerhouse of the cell is the _____.\", \
             \"options\": [], \"correctAnswer\": \"mitochondrion\", \
             \"topics\": [\"cell biology\"]}"
        }
    }
}

fn build_generation_prompt(request: &GenerationRequest, count: usize) -> String {
    let source: String = request.content.chars().take(MAX_SOURCE_CHARS).collect();

    let mut prompt = format!(
        "Generate exactly {} {} questions at {} difficulty from the source \
         content below.\n\n{}\n",
        count,
        request.question_type.as_str(),
        request.difficulty.as_str(),
        format_instructions(request.question_type),
    );

    if let Some(ref style) = request.style {
        let _ = write!(
            prompt,
            "\nMatch the question-writing style of this class:\n\
             - Language style: {}\n\
             - Structure: {}\n",
            style.language_style, style.structural_patterns
        );
        if let Some(pattern) = style.type_patterns.get(&request.question_type) {
            let _ = writeln!(prompt, "- {} conventions: {}", request.question_type.as_str(), pattern);
        }
        for recommendation in &style.recommendations {
            let _ = writeln!(prompt, "- {}", recommendation);
        }
    }

    if let Some(ref signals) = request.signals {
        if !signals.is_empty() {
            prompt.push_str("\nPersonalize for this learner:\n");
            if !signals.weak_topics.is_empty() {
                prompt.push_str("Favor topics where accuracy is low:\n");
                for weak in &signals.weak_topics {
                    let _ = writeln!(
                        prompt,
                        "- {} {} questions: {:.0}% correct",
                        weak.difficulty.as_str(),
                        weak.question_type.as_str(),
                        weak.accuracy * 100.0
                    );
                }
            }
            if !signals.exemplars.is_empty() {
                prompt.push_str("Questions this learner rated highly:\n");
                for exemplar in &signals.exemplars {
                    let _ = writeln!(prompt, "- {}", exemplar);
                }
            }
            if let Some(accuracy) = signals.overall_accuracy {
                let _ = writeln!(prompt, "Overall accuracy: {:.0}%", accuracy * 100.0);
            }
        }
    }

    if let Some(ref directions) = request.custom_directions {
        let _ = write!(prompt, "\nAdditional instructions: {}\n", directions);
    }

    let _ = write!(
        prompt,
        "\nSource content:\n---\n{}\n---\n\n\
         Respond with ONLY a JSON object: {{\"questions\": [ ... {} items ... ]}}",
        source, count
    );

    prompt
}
