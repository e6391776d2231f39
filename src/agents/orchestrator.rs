//! Entry point sequencing style analysis and content generation.
//!
//! Callers talk to the orchestrator instead of wiring the agents together
//! themselves: `generate` lazily materializes a style profile when one is
//! requested but missing, and every operation leaves an audit trail of
//! agent messages. The audit log is observability only — a failed append
//! is logged and never blocks the operation it records.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::backend::TextCompletionBackend;
use crate::storage::StudyStorage;

use super::generator::{ContentGenerator, GenerationRequest};
use super::models::{
    AgentMessage, Difficulty, GenerationBatch, PersonalizationSignals, QuestionType, StyleAnalysis,
    StyleProfile,
};
use super::style::StyleAnalyzer;
use super::{AgentError, Result};

/// Learner-preferences collaborator supplying optional generation bias.
pub trait PreferenceSource: Send + Sync {
    fn signals_for(&self, category_id: Uuid) -> Option<PersonalizationSignals>;
}

/// Options for one orchestrated generation call
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub content: String,
    pub count: usize,
    pub difficulty: Difficulty,
    pub question_type: QuestionType,
    pub custom_directions: Option<String>,
    /// Condition generation on the category's style profile, deriving it
    /// on demand if samples exist but no profile does yet
    pub use_analysis: bool,
}

/// Read-only projection of a category's analysis state, for UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatus {
    pub has_profile: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<StyleProfile>,
    pub sample_counts: HashMap<QuestionType, usize>,
    pub total_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct Orchestrator {
    analyzer: StyleAnalyzer,
    generator: ContentGenerator,
    storage: Arc<StudyStorage>,
    preferences: Option<Arc<dyn PreferenceSource>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn TextCompletionBackend>, storage: Arc<StudyStorage>) -> Self {
        Self {
            analyzer: StyleAnalyzer::new(backend.clone(), storage.clone()),
            generator: ContentGenerator::new(backend),
            storage,
            preferences: None,
        }
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Append an audit message, swallowing failures.
    fn audit(
        &self,
        category_id: Uuid,
        from_agent: &str,
        to_agent: &str,
        message_type: &str,
        payload: serde_json::Value,
        processed: bool,
    ) {
        let mut message = AgentMessage::new(from_agent, to_agent, message_type, payload);
        if processed {
            message.mark_processed();
        }
        if let Err(e) = self.storage.append_message(category_id, &message) {
            log::warn!("Audit append failed for {}: {}", category_id, e);
        }
    }

    /// Analyze the category's stored samples into a style profile.
    /// Re-running replaces the prior profile.
    pub async fn trigger_analysis(&self, category_id: Uuid) -> Result<StyleAnalysis> {
        let samples = self.storage.list_samples(category_id)?;
        if samples.is_empty() {
            return Err(AgentError::NoSamples(category_id));
        }

        self.audit(
            category_id,
            "orchestrator",
            "style-analyzer",
            "analysis-requested",
            json!({ "sampleCount": samples.len() }),
            false,
        );

        let analysis = self.analyzer.analyze(category_id, &samples).await?;

        self.audit(
            category_id,
            "style-analyzer",
            "orchestrator",
            "analysis-completed",
            json!({ "samplesAnalyzed": analysis.samples_analyzed }),
            true,
        );

        Ok(analysis)
    }

    /// Generate a batch of items, materializing the style profile first if
    /// requested and derivable.
    pub async fn generate(
        &self,
        category_id: Uuid,
        options: GenerateOptions,
    ) -> Result<GenerationBatch> {
        let style = if options.use_analysis {
            match self.storage.get_style_profile(category_id)? {
                Some(profile) => Some(profile),
                None => {
                    let samples = self.storage.list_samples(category_id)?;
                    if samples.is_empty() {
                        log::info!(
                            "No profile and no samples for {}; generating without style",
                            category_id
                        );
                        None
                    } else {
                        Some(self.trigger_analysis(category_id).await?.profile)
                    }
                }
            }
        } else {
            None
        };

        let signals = self
            .preferences
            .as_ref()
            .and_then(|p| p.signals_for(category_id))
            .filter(|s| !s.is_empty());

        self.audit(
            category_id,
            "orchestrator",
            "content-generator",
            "generate-requested",
            json!({
                "count": options.count,
                "questionType": options.question_type,
                "withStyle": style.is_some(),
                "withSignals": signals.is_some(),
            }),
            false,
        );

        let request = GenerationRequest {
            content: options.content,
            count: options.count,
            difficulty: options.difficulty,
            question_type: options.question_type,
            custom_directions: options.custom_directions,
            style,
            signals,
        };

        let batch = self.generator.generate(&request).await?;

        self.audit(
            category_id,
            "content-generator",
            "orchestrator",
            "generate-completed",
            json!({ "requested": batch.requested, "returned": batch.items.len() }),
            true,
        );

        Ok(batch)
    }

    /// Snapshot of analysis state for the category
    pub fn status(&self, category_id: Uuid) -> Result<AnalysisStatus> {
        let profile = self.storage.get_style_profile(category_id)?;
        let sample_counts = self.storage.sample_counts(category_id)?;
        let total_samples: usize = sample_counts.values().sum();

        self.audit(
            category_id,
            "orchestrator",
            "style-analyzer",
            "status-requested",
            json!({ "hasProfile": profile.is_some(), "totalSamples": total_samples }),
            true,
        );

        Ok(AnalysisStatus {
            has_profile: profile.is_some(),
            last_updated: profile.as_ref().map(|p| p.updated_at),
            profile,
            sample_counts,
            total_samples,
        })
    }

    /// Delete the stored profile so the next `generate` recomputes it
    pub fn clear_analysis(&self, category_id: Uuid) -> Result<()> {
        self.storage.delete_style_profile(category_id)?;
        self.audit(
            category_id,
            "orchestrator",
            "style-analyzer",
            "analysis-cleared",
            json!({}),
            true,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::models::SampleQuestion;
    use crate::agents::testutil::FakeBackend;
    use tempfile::TempDir;

    const PROFILE_JSON: &str = r#"{
        "languageStyle": "short stems",
        "structuralPatterns": "four options",
        "recommendations": ["keep it concrete"]
    }"#;

    const MC_BATCH: &str = r#"{"questions": [
        {"text": "Q", "options": ["A) x", "B) y"], "correctAnswer": "A"}
    ]}"#;

    fn setup(responses: Vec<&str>) -> (TempDir, Arc<StudyStorage>, Arc<FakeBackend>, Orchestrator) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StudyStorage::new(dir.path().to_path_buf()));
        storage.init().unwrap();
        let backend = Arc::new(FakeBackend::new(responses));
        let orchestrator = Orchestrator::new(backend.clone(), storage.clone());
        (dir, storage, backend, orchestrator)
    }

    fn seed_samples(storage: &StudyStorage, category_id: Uuid) {
        let sample = SampleQuestion {
            text: "What is H2O?".to_string(),
            question_type: QuestionType::MultipleChoice,
            options: vec!["A) Water".to_string(), "B) Salt".to_string()],
            correct_answer: "A".to_string(),
            explanation: None,
        };
        storage.add_sample(category_id, &sample).unwrap();
    }

    fn options() -> GenerateOptions {
        GenerateOptions {
            content: "Water is H2O.".to_string(),
            count: 1,
            difficulty: Difficulty::Easy,
            question_type: QuestionType::MultipleChoice,
            custom_directions: None,
            use_analysis: true,
        }
    }

    #[tokio::test]
    async fn test_trigger_analysis_without_samples_fails() {
        let (_dir, _storage, _backend, orchestrator) = setup(vec![PROFILE_JSON]);

        let err = orchestrator
            .trigger_analysis(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoSamples(_)));
    }

    #[tokio::test]
    async fn test_trigger_analysis_stores_profile_and_audits() {
        let (_dir, storage, _backend, orchestrator) = setup(vec![PROFILE_JSON]);
        let category = Uuid::new_v4();
        seed_samples(&storage, category);

        let analysis = orchestrator.trigger_analysis(category).await.unwrap();
        assert_eq!(analysis.samples_analyzed, 1);
        assert!(storage.get_style_profile(category).unwrap().is_some());

        let messages = storage.list_messages(category, 10).unwrap();
        let types: Vec<&str> = messages.iter().map(|m| m.message_type.as_str()).collect();
        assert_eq!(types, vec!["analysis-requested", "analysis-completed"]);
    }

    #[tokio::test]
    async fn test_generate_lazily_materializes_profile() {
        // First response feeds analysis, second feeds generation
        let (_dir, storage, backend, orchestrator) = setup(vec![PROFILE_JSON, MC_BATCH]);
        let category = Uuid::new_v4();
        seed_samples(&storage, category);

        let batch = orchestrator.generate(category, options()).await.unwrap();
        assert_eq!(batch.items.len(), 1);

        // Analysis ran implicitly and was stored
        assert!(storage.get_style_profile(category).unwrap().is_some());

        // The generation prompt carried the derived style
        let prompt = backend.last_prompt();
        assert!(prompt.contains("short stems"));
    }

    #[tokio::test]
    async fn test_generate_skips_analysis_when_no_samples() {
        let (_dir, _storage, backend, orchestrator) = setup(vec![MC_BATCH]);
        let category = Uuid::new_v4();

        let batch = orchestrator.generate(category, options()).await.unwrap();
        assert_eq!(batch.items.len(), 1);
        assert!(!backend.last_prompt().contains("question-writing style"));
    }

    #[tokio::test]
    async fn test_generate_reuses_existing_profile() {
        let (_dir, storage, _backend, orchestrator) = setup(vec![PROFILE_JSON, MC_BATCH]);
        let category = Uuid::new_v4();
        seed_samples(&storage, category);

        orchestrator.trigger_analysis(category).await.unwrap();
        // Only one response remains; generation must not re-run analysis
        let batch = orchestrator.generate(category, options()).await.unwrap();
        assert_eq!(batch.items.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_analysis_forces_recompute() {
        let (_dir, storage, _backend, orchestrator) =
            setup(vec![PROFILE_JSON, PROFILE_JSON, MC_BATCH]);
        let category = Uuid::new_v4();
        seed_samples(&storage, category);

        orchestrator.trigger_analysis(category).await.unwrap();
        orchestrator.clear_analysis(category).unwrap();
        assert!(storage.get_style_profile(category).unwrap().is_none());

        // Next generate re-derives the profile
        orchestrator.generate(category, options()).await.unwrap();
        assert!(storage.get_style_profile(category).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_status_projection() {
        let (_dir, storage, _backend, orchestrator) = setup(vec![PROFILE_JSON]);
        let category = Uuid::new_v4();

        let empty = orchestrator.status(category).unwrap();
        assert!(!empty.has_profile);
        assert_eq!(empty.total_samples, 0);

        seed_samples(&storage, category);
        seed_samples(&storage, category);
        orchestrator.trigger_analysis(category).await.unwrap();

        let status = orchestrator.status(category).unwrap();
        assert!(status.has_profile);
        assert_eq!(status.total_samples, 2);
        assert_eq!(status.sample_counts[&QuestionType::MultipleChoice], 2);
        assert!(status.last_updated.is_some());

        // Status reads leave an audit entry like every other operation
        let messages = storage.list_messages(category, 10).unwrap();
        let status_entries: Vec<_> = messages
            .iter()
            .filter(|m| m.message_type == "status-requested")
            .collect();
        assert_eq!(status_entries.len(), 2);
        assert_eq!(status_entries[1].payload["totalSamples"], 2);
    }

    #[tokio::test]
    async fn test_preferences_feed_generation() {
        struct FixedPreferences;
        impl PreferenceSource for FixedPreferences {
            fn signals_for(&self, _category_id: Uuid) -> Option<PersonalizationSignals> {
                Some(PersonalizationSignals {
                    exemplars: vec!["What is osmosis?".to_string()],
                    weak_topics: Vec::new(),
                    overall_accuracy: Some(0.55),
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StudyStorage::new(dir.path().to_path_buf()));
        storage.init().unwrap();
        let backend = Arc::new(FakeBackend::new(vec![MC_BATCH]));
        let orchestrator = Orchestrator::new(backend.clone(), storage)
            .with_preferences(Arc::new(FixedPreferences));

        let mut opts = options();
        opts.use_analysis = false;
        orchestrator.generate(Uuid::new_v4(), opts).await.unwrap();

        let prompt = backend.last_prompt();
        assert!(prompt.contains("What is osmosis?"));
        assert!(prompt.contains("55%"));
    }
}
