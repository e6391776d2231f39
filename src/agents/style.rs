//! Style analysis of user-supplied sample questions.
//!
//! Derives a reusable per-category [`StyleProfile`] that the content
//! generator can use to mimic a teacher's question-writing conventions.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::backend::{CompletionRequest, TextCompletionBackend};
use crate::storage::StudyStorage;

use super::models::{QuestionType, SampleQuestion, StyleAnalysis, StyleProfile};
use super::parse::extract_json;
use super::{AgentError, Result};

/// Analysis is extraction, not creation — keep the model conservative.
const ANALYSIS_TEMPERATURE: f64 = 0.3;

pub struct StyleAnalyzer {
    backend: Arc<dyn TextCompletionBackend>,
    storage: Arc<StudyStorage>,
}

/// Fixed schema the model is instructed to return.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    language_style: String,
    structural_patterns: String,
    #[serde(default)]
    type_patterns: HashMap<QuestionType, String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

impl StyleAnalyzer {
    pub fn new(backend: Arc<dyn TextCompletionBackend>, storage: Arc<StudyStorage>) -> Self {
        Self { backend, storage }
    }

    /// Analyze sample questions and store the derived profile for the
    /// category, replacing any existing one.
    pub async fn analyze(
        &self,
        category_id: Uuid,
        samples: &[SampleQuestion],
    ) -> Result<StyleAnalysis> {
        if samples.is_empty() {
            return Err(AgentError::InsufficientSamples);
        }

        let prompt = build_analysis_prompt(samples);
        log::info!(
            "Analyzing {} sample questions for category {}",
            samples.len(),
            category_id
        );

        let raw = self
            .backend
            .complete(
                CompletionRequest::new(prompt)
                    .with_temperature(ANALYSIS_TEMPERATURE)
                    .with_max_tokens(2048),
            )
            .await?;

        let value = extract_json(&raw)?;
        let response: ProfileResponse = serde_json::from_value(value)
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        let profile = StyleProfile {
            category_id,
            language_style: response.language_style,
            structural_patterns: response.structural_patterns,
            type_patterns: response.type_patterns,
            recommendations: response.recommendations,
            sample_count: samples.len(),
            updated_at: Utc::now(),
        };

        self.storage.upsert_style_profile(&profile)?;

        Ok(StyleAnalysis {
            profile,
            samples_analyzed: samples.len(),
        })
    }
}

/// Build the analysis prompt: samples grouped by type, then the schema.
fn build_analysis_prompt(samples: &[SampleQuestion]) -> String {
    let mut by_type: HashMap<QuestionType, Vec<&SampleQuestion>> = HashMap::new();
    for sample in samples {
        by_type.entry(sample.question_type).or_default().push(sample);
    }

    let mut prompt = String::from(
        "You are analyzing a teacher's existing quiz questions to learn their \
         question-writing style.\n\nSample questions by type:\n",
    );

    // Stable section order for reproducible prompts
    for question_type in [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::Written,
        QuestionType::FillBlank,
    ] {
        let Some(group) = by_type.get(&question_type) else {
            continue;
        };

        let _ = writeln!(prompt, "\n## {} ({} samples)", question_type.as_str(), group.len());
        for sample in group {
            let _ = writeln!(prompt, "- Question: {}", sample.text);
            if !sample.options.is_empty() {
                let _ = writeln!(prompt, "  Options: {}", sample.options.join(" | "));
            }
            let _ = writeln!(prompt, "  Answer: {}", sample.correct_answer);
            if let Some(ref explanation) = sample.explanation {
                let _ = writeln!(prompt, "  Explanation: {}", explanation);
            }
        }
    }

    prompt.push_str(
        "\nDescribe the style so another writer could imitate it. Respond with \
         ONLY a JSON object in this exact shape:\n\
         {\n\
         \"languageStyle\": \"tone, vocabulary, and phrasing conventions\",\n\
         \"structuralPatterns\": \"how stems, options, and blanks are structured\",\n\
         \"typePatterns\": {\"multipleChoice\": \"...\", \"trueFalse\": \"...\", \
         \"written\": \"...\", \"fillBlank\": \"...\"},\n\
         \"recommendations\": [\"guideline for future questions\", ...]\n\
         }\n\
         Include typePatterns keys only for types present in the samples.",
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

    fn samples() -> Vec<SampleQuestion> {
        vec![
            SampleQuestion {
                text: "Which planet is closest to the sun?".to_string(),
                question_type: QuestionType::MultipleChoice,
                options: vec![
                    "A) Mercury".to_string(),
                    "B) Venus".to_string(),
                    "C) Mars".to_string(),
                ],
                correct_answer: "A".to_string(),
                explanation: Some("Mercury orbits at 0.39 AU.".to_string()),
            },
            SampleQuestion {
                text: "The sun is a star.".to_string(),
                question_type: QuestionType::TrueFalse,
                options: vec!["A) True".to_string(), "B) False".to_string()],
                correct_answer: "true".to_string(),
                explanation: None,
            },
        ]
    }

    const PROFILE_JSON: &str = r#"{
        "languageStyle": "short, direct stems",
        "structuralPatterns": "three options, correct answer first drafted",
        "typePatterns": {"multipleChoice": "single-fact recall"},
        "recommendations": ["keep options parallel in length"]
    }"#;

    #[tokio::test]
    async fn test_empty_samples_rejected() {
        let (_dir, storage) = storage();
        let backend = Arc::new(FakeBackend::new(vec![PROFILE_JSON]));
        let analyzer = StyleAnalyzer::new(backend, storage);

        let err = analyzer.analyze(Uuid::new_v4(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::InsufficientSamples));
    }

    #[tokio::test]
    async fn test_analysis_stores_profile() {
        let (_dir, storage) = storage();
        let backend = Arc::new(FakeBackend::new(vec![PROFILE_JSON]));
        let analyzer = StyleAnalyzer::new(backend.clone(), storage.clone());
        let category = Uuid::new_v4();

        let analysis = analyzer.analyze(category, &samples()).await.unwrap();
        assert_eq!(analysis.samples_analyzed, 2);
        assert_eq!(analysis.profile.language_style, "short, direct stems");

        let stored = storage.get_style_profile(category).unwrap().unwrap();
        assert_eq!(stored.sample_count, 2);
        assert_eq!(
            stored.type_patterns[&QuestionType::MultipleChoice],
            "single-fact recall"
        );

        // Prompt contains both type sections
        let prompt = backend.last_prompt();
        assert!(prompt.contains("multiple choice"));
        assert!(prompt.contains("true/false"));
    }

    #[tokio::test]
    async fn test_reanalysis_replaces_profile() {
        let (_dir, storage) = storage();
        let second = r#"{"languageStyle": "formal", "structuralPatterns": "long stems"}"#;
        let backend = Arc::new(FakeBackend::new(vec![PROFILE_JSON, second]));
        let analyzer = StyleAnalyzer::new(backend, storage.clone());
        let category = Uuid::new_v4();

        analyzer.analyze(category, &samples()).await.unwrap();
        analyzer.analyze(category, &samples()).await.unwrap();

        let stored = storage.get_style_profile(category).unwrap().unwrap();
        assert_eq!(stored.language_style, "formal");
    }

    #[tokio::test]
    async fn test_fenced_response_repaired() {
        let (_dir, storage) = storage();
        let fenced = format!("```json\n{}\n```", PROFILE_JSON);
        let backend = Arc::new(FakeBackend::new(vec![fenced.as_str()]));
        let analyzer = StyleAnalyzer::new(backend, storage);

        let analysis = analyzer.analyze(Uuid::new_v4(), &samples()).await.unwrap();
        assert_eq!(analysis.profile.structural_patterns, "three options, correct answer first drafted");
    }

    #[tokio::test]
    async fn test_unparseable_response_is_malformed_error() {
        let (_dir, storage) = storage();
        let backend = Arc::new(FakeBackend::new(vec!["not json at all"]));
        let analyzer = StyleAnalyzer::new(backend, storage.clone());
        let category = Uuid::new_v4();

        let err = analyzer.analyze(category, &samples()).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
        // Nothing persisted on failure
        assert!(storage.get_style_profile(category).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let (_dir, storage) = storage();
        let analyzer = StyleAnalyzer::new(Arc::new(FailingBackend), storage);

        let err = analyzer.analyze(Uuid::new_v4(), &samples()).await.unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
    }
}
