//! Answer grading: exact match, normalized simple match, and AI-assisted
//! partial credit.
//!
//! Grading sits on the quiz-submission path, so the AI-backed route always
//! degrades to simple matching on provider failure instead of erroring.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{CompletionRequest, TextCompletionBackend};
use crate::storage::StudyStorage;

use super::models::{GeneratedItem, QuestionType};
use super::parse::extract_json;
use super::Result;

/// An answer earning at least this fraction of total points counts as
/// correct.
const CORRECT_THRESHOLD: f32 = 0.9;

/// Relative tolerance for numeric answer comparison.
const NUMERIC_TOLERANCE: f32 = 0.01;

/// Free-text answers longer than this get component-level grading.
const DETAILED_LENGTH_THRESHOLD: usize = 100;

/// Question-text keywords that indicate multi-step domain answers.
const DOMAIN_KEYWORDS: &[&str] = &[
    "calculate",
    "prove",
    "derive",
    "show work",
    "show your work",
    "solve",
    "equation",
    "formula",
    "theorem",
    "integral",
    "derivative",
    "math",
    "physics",
    "chemistry",
    "balance",
    "experiment",
    "hypothesis",
];

/// Score for one graded component of a decomposed answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScore {
    pub name: String,
    pub max_points: f32,
    pub earned_points: f32,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Grade for one (session, question) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub total_points: f32,
    pub earned_points: f32,
    pub is_correct: bool,
    /// Component breakdown; empty for binary grades
    #[serde(default)]
    pub components: Vec<ComponentScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// What the answer got right, as free-text highlights
    #[serde(default)]
    pub correct_points: Vec<String>,
    /// What the answer got wrong or missed
    #[serde(default)]
    pub incorrect_points: Vec<String>,
    /// Whether the AI partial-credit path produced this grade
    #[serde(default)]
    pub partial_credit: bool,
}

impl GradeResult {
    /// All-or-nothing grade worth one point
    pub fn binary(correct: bool, feedback: impl Into<String>) -> Self {
        Self {
            total_points: 1.0,
            earned_points: if correct { 1.0 } else { 0.0 },
            is_correct: correct,
            components: Vec::new(),
            feedback: Some(feedback.into()),
            correct_points: Vec::new(),
            incorrect_points: Vec::new(),
            partial_credit: false,
        }
    }
}

pub struct AnswerGrader {
    backend: Arc<dyn TextCompletionBackend>,
    storage: Arc<StudyStorage>,
}

/// Shape the partial-credit prompt asks the model to return
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrade {
    #[serde(default)]
    total_points: f32,
    #[serde(default)]
    earned_points: f32,
    #[serde(default)]
    components: Vec<RawComponent>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    correct_points: Vec<String>,
    #[serde(default)]
    incorrect_points: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComponent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    max_points: f32,
    #[serde(default)]
    earned_points: f32,
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    feedback: Option<String>,
}

impl AnswerGrader {
    pub fn new(backend: Arc<dyn TextCompletionBackend>, storage: Arc<StudyStorage>) -> Self {
        Self { backend, storage }
    }

    /// Grade an answer and persist the result keyed by (session, question).
    /// Repeated grading overwrites the stored grade.
    pub async fn grade(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        question: &GeneratedItem,
        answer: &str,
    ) -> Result<GradeResult> {
        let result = match question.question_type {
            QuestionType::MultipleChoice => {
                let correct = answer.trim() == question.correct_answer.trim();
                GradeResult::binary(
                    correct,
                    if correct {
                        "Correct.".to_string()
                    } else {
                        format!("The correct answer is {}.", question.correct_answer)
                    },
                )
            }
            QuestionType::TrueFalse => {
                let correct = answer
                    .trim()
                    .eq_ignore_ascii_case(question.correct_answer.trim());
                GradeResult::binary(
                    correct,
                    if correct {
                        "Correct.".to_string()
                    } else {
                        format!("The correct answer is {}.", question.correct_answer)
                    },
                )
            }
            QuestionType::Written | QuestionType::FillBlank => {
                if needs_detailed_grading(question, answer) {
                    match self.grade_partial_credit(question, answer).await {
                        Ok(result) => result,
                        Err(e) => {
                            log::warn!(
                                "Partial-credit grading failed ({}), falling back to simple match",
                                e
                            );
                            simple_match(&question.correct_answer, answer)
                        }
                    }
                } else {
                    simple_match(&question.correct_answer, answer)
                }
            }
        };

        self.storage.put_grade(session_id, question_id, &result)?;
        Ok(result)
    }

    /// One model call decomposing the expected answer into weighted
    /// components and grading each independently.
    async fn grade_partial_credit(
        &self,
        question: &GeneratedItem,
        answer: &str,
    ) -> Result<GradeResult> {
        let prompt = build_grading_prompt(question, answer);

        let raw = self
            .backend
            .complete(
                CompletionRequest::new(prompt)
                    .with_temperature(0.2)
                    .with_max_tokens(2048),
            )
            .await?;

        let value = extract_json(&raw)?;
        let grade: RawGrade = serde_json::from_value(value)
            .map_err(|e| super::AgentError::MalformedResponse(e.to_string()))?;

        Ok(repair_grade(grade))
    }
}

/// Normalize model-reported numbers into a consistent grade.
///
/// Components are the finer-grained signal, so when they disagree with the
/// stated total, the total is recomputed from them. Earned points always
/// end up clamped into [0, total].
fn repair_grade(raw: RawGrade) -> GradeResult {
    let mut components: Vec<ComponentScore> = raw
        .components
        .into_iter()
        .map(|c| {
            let max_points = c.max_points.max(0.0);
            ComponentScore {
                earned_points: c.earned_points.clamp(0.0, max_points),
                max_points,
                name: c.name,
                correct: c.correct,
                feedback: c.feedback,
            }
        })
        .collect();
    components.retain(|c| c.max_points > 0.0);

    let (total, earned) = if components.is_empty() {
        let total = if raw.total_points > 0.0 {
            raw.total_points
        } else {
            1.0
        };
        (total, raw.earned_points.clamp(0.0, total))
    } else {
        let total: f32 = components.iter().map(|c| c.max_points).sum();
        let earned: f32 = components.iter().map(|c| c.earned_points).sum();
        (total, earned.clamp(0.0, total))
    };

    GradeResult {
        total_points: total,
        earned_points: earned,
        is_correct: earned >= CORRECT_THRESHOLD * total,
        components,
        feedback: raw.feedback,
        correct_points: raw.correct_points,
        incorrect_points: raw.incorrect_points,
        partial_credit: true,
    }
}

/// Route to partial-credit grading when the question or answer looks like
/// a multi-part or domain-notation response.
fn needs_detailed_grading(question: &GeneratedItem, answer: &str) -> bool {
    let question_text = question.text.to_lowercase();
    let has_keyword = DOMAIN_KEYWORDS.iter().any(|k| question_text.contains(k))
        || question
            .topics
            .iter()
            .any(|t| DOMAIN_KEYWORDS.iter().any(|k| t.to_lowercase().contains(k)));
    if has_keyword {
        return true;
    }

    if has_math_notation(answer) {
        return true;
    }

    if sentence_mark_count(answer) >= 2 {
        return true;
    }

    answer.chars().count() > DETAILED_LENGTH_THRESHOLD
}

/// Count sentence-ending punctuation. A mark only counts when followed by
/// whitespace or end of text, so decimals like "9.99" stay one sentence.
fn sentence_mark_count(text: &str) -> usize {
    let chars: Vec<char> = text.trim_end().chars().collect();
    let mut count = 0;
    for (i, c) in chars.iter().enumerate() {
        if matches!(*c, '.' | '!' | '?')
            && chars.get(i + 1).map_or(true, |n| n.is_whitespace())
        {
            count += 1;
        }
    }
    count
}

fn has_math_notation(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(
            c,
            '=' | '^' | '√' | '∫' | '∑' | 'π' | '×' | '÷' | '≤' | '≥' | '≈' | '±'
        )
    })
}

/// Exact-ish comparison after normalization, with notation-equivalence
/// rewriting and numeric tolerance.
fn simple_match(expected: &str, answer: &str) -> GradeResult {
    let expected_norm = normalize_answer(expected);
    let answer_norm = normalize_answer(answer);

    let correct = if let (Ok(a), Ok(b)) = (
        answer_norm.parse::<f32>(),
        expected_norm.parse::<f32>(),
    ) {
        numbers_match(a, b)
    } else {
        expected_norm == answer_norm
    };

    GradeResult::binary(
        correct,
        if correct {
            "Correct.".to_string()
        } else {
            format!("Expected: {}", expected)
        },
    )
}

fn numbers_match(answer: f32, expected: f32) -> bool {
    if expected == 0.0 {
        return answer.abs() < 1e-9;
    }
    ((answer - expected) / expected).abs() <= NUMERIC_TOLERANCE
}

/// Lowercase, rewrite common notation variants, strip punctuation that
/// carries no meaning, collapse whitespace.
fn normalize_answer(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.trim().to_lowercase().chars() {
        match c {
            '×' => out.push('*'),
            '÷' => out.push('/'),
            '√' => out.push_str("sqrt"),
            'π' => out.push_str("pi"),
            '⁰' => out.push_str("^0"),
            '¹' => out.push_str("^1"),
            '²' => out.push_str("^2"),
            '³' => out.push_str("^3"),
            '⁴' => out.push_str("^4"),
            '⁵' => out.push_str("^5"),
            '⁶' => out.push_str("^6"),
            '⁷' => out.push_str("^7"),
            '⁸' => out.push_str("^8"),
            '⁹' => out.push_str("^9"),
            ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '(' | ')' => {}
            _ => out.push(c),
        }
    }

    // Trailing sentence period is noise; interior periods may be decimals
    let out = out.trim_end_matches('.');

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_grading_prompt(question: &GeneratedItem, answer: &str) -> String {
    let mut prompt = format!(
        "Grade a student's answer with partial credit.\n\n\
         Question: {}\n\
         Model answer: {}\n\
         Student answer: {}\n",
        question.text, question.correct_answer, answer
    );

    if !question.topics.is_empty() {
        let _ = writeln!(prompt, "Topics: {}", question.topics.join(", "));
    }

    prompt.push_str(
        "\nDecompose the model answer into weighted components summing to the \
         total points, grade each component of the student answer \
         independently, and respond with ONLY a JSON object:\n\
         {\n\
         \"totalPoints\": 1.0,\n\
         \"earnedPoints\": 0.0,\n\
         \"components\": [{\"name\": \"...\", \"maxPoints\": 0.0, \
         \"earnedPoints\": 0.0, \"correct\": false, \"feedback\": \"...\"}],\n\
         \"feedback\": \"overall feedback for the student\",\n\
         \"correctPoints\": [\"things the answer got right\"],\n\
         \"incorrectPoints\": [\"things missing or wrong\"]\n\
         }",
    );

    prompt
}
