//! Query orchestrator: sequences the whole answer pipeline.
//!
//! validate → window → project detection → embed → cache → search + rank →
//! quota gate → prompt + inference + shaping → cache write.
//!
//! Only validation, the window and search failures surface as errors. Quota
//! exhaustion and inference failures degrade the reply and are flagged on the
//! response.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use skill_embeddings::{embed_on_blocking_pool, EmbeddingModel};
use skill_llm::{complete_and_drain, CompletionModel};
use skill_storage::{KeyValueStore, SkillRepository};
use skill_types::{ResponseConfig, Settings, SkillError, SkillRecord};
use skill_vector::{CompositeVectorStore, Ranker, ScoredMatch, SearchFilter};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::classifier::{inference_kind, ShapeClassifier};
use crate::error::QueryError;
use crate::project::{ProjectContext, ProjectRegistry};
use crate::prompt::{format_years, PromptBuilder};
use crate::quota::QuotaBreaker;
use crate::shaper::ReplyShaper;
use crate::types::{Confidence, QueryResponse, SkillMatch};
use crate::validation::InputValidator;
use crate::window::{AvailabilityWindow, WindowDecision};

/// Candidates fetched per returned match, so boosting can reorder
const CANDIDATE_FACTOR: usize = 2;

const NO_DATA_REPLY: &str = "I don't have any records that match that question.";

/// External collaborators the pipeline runs against.
pub struct PipelineParts {
    pub embedder: Arc<dyn EmbeddingModel>,
    pub vectors: Arc<CompositeVectorStore>,
    pub repo: Arc<dyn SkillRepository>,
    pub kv: Arc<dyn KeyValueStore>,
    pub completer: Arc<dyn CompletionModel>,
}

pub struct QueryOrchestrator {
    validator: InputValidator,
    window: AvailabilityWindow,
    projects: ProjectRegistry,
    classifier: ShapeClassifier,
    ranker: Ranker,
    cache: ResponseCache,
    quota: QuotaBreaker,
    prompts: PromptBuilder,
    shaper: ReplyShaper,
    response: ResponseConfig,
    inference_timeout: Duration,
    embedder: Arc<dyn EmbeddingModel>,
    vectors: Arc<CompositeVectorStore>,
    repo: Arc<dyn SkillRepository>,
    completer: Arc<dyn CompletionModel>,
}

impl QueryOrchestrator {
    pub fn new(settings: &Settings, parts: PipelineParts) -> Result<Self, SkillError> {
        let validator = InputValidator::new(settings.validation.clone())
            .map_err(|e| SkillError::Config(format!("validation.injection_patterns: {e}")))?;
        let projects = ProjectRegistry::from_entries(&settings.projects)
            .map_err(|e| SkillError::Config(format!("projects: {e}")))?;

        Ok(Self {
            validator,
            window: AvailabilityWindow::new(&settings.window)?,
            projects,
            classifier: ShapeClassifier::new(),
            ranker: Ranker::new(settings.ranking.clone()),
            cache: ResponseCache::new(parts.kv.clone(), settings.cache.clone()),
            quota: QuotaBreaker::new(parts.kv, settings.quota.clone()),
            prompts: PromptBuilder::new(settings.response.clone()),
            shaper: ReplyShaper::new(&settings.response),
            response: settings.response.clone(),
            inference_timeout: Duration::from_secs(settings.llm.inference_timeout_secs.max(1)),
            embedder: parts.embedder,
            vectors: parts.vectors,
            repo: parts.repo,
            completer: parts.completer,
        })
    }

    /// Override the inference deadline
    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn projects(&self) -> &ProjectRegistry {
        &self.projects
    }

    pub fn quota(&self) -> &QuotaBreaker {
        &self.quota
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn vectors(&self) -> &CompositeVectorStore {
        &self.vectors
    }

    /// Answer one question.
    pub async fn answer_query(
        &self,
        raw_text: &str,
        bypass_token: Option<&str>,
    ) -> Result<QueryResponse, QueryError> {
        self.answer_query_at(raw_text, bypass_token, Utc::now()).await
    }

    /// Answer as of `now` (window evaluation only).
    #[instrument(skip(self, raw_text, bypass_token), fields(chars = raw_text.len()))]
    pub async fn answer_query_at(
        &self,
        raw_text: &str,
        bypass_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueryResponse, QueryError> {
        let query = self.validator.validate(raw_text)?;

        if let WindowDecision::Closed { reopens_at } = self.window.evaluate(now, bypass_token) {
            debug!(?reopens_at, "Outside availability window");
            return Err(QueryError::WindowClosed {
                message: self.window.deferral_message().to_string(),
                reopens_at,
            });
        }

        let project = self.projects.detect(&query);
        let filter = match &project.project_name {
            Some(name) => SearchFilter::for_project(name.clone()),
            None => SearchFilter::default(),
        };

        let embedding = embed_on_blocking_pool(self.embedder.clone(), project.clean_query.clone())
            .await
            .map_err(|e| {
                warn!(error = %e, "Query embedding failed");
                QueryError::SearchUnavailable
            })?;

        if let Some(hit) = self.cache.get(&query) {
            return Ok(hit);
        }

        let shape = self.classifier.classify(&query);
        let top_k = self.ranker.top_k(shape);
        let outcome = self
            .vectors
            .search(embedding.as_slice(), top_k * CANDIDATE_FACTOR, &filter)
            .await
            .map_err(|e| {
                warn!(error = %e, "Vector search failed");
                QueryError::SearchUnavailable
            })?;

        let ranked = self.ranker.rank(outcome.matches, top_k);
        let matches = self.hydrate(ranked).await;

        let mut response = QueryResponse {
            query: query.clone(),
            matches,
            reply: String::new(),
            cached: false,
            quota_exceeded: false,
            inference_failed: false,
            confidence: None,
            project: project.project_name.clone(),
            provenance: Some(outcome.provenance),
        };

        let Some(top_score) = response.top_match().map(|m| m.score) else {
            info!(backend = %outcome.provenance, "No matching records");
            response.reply = NO_DATA_REPLY.to_string();
            return Ok(response);
        };
        let confidence = Confidence::from_score(top_score, &self.response);
        response.confidence = Some(confidence);

        let status = self.quota.check();
        if !status.is_open() {
            info!(consumed = status.consumed, limit = status.limit, "Quota exhausted, using fallback reply");
            response.quota_exceeded = true;
            response.reply = fallback_reply(
                "I've reached today's limit for written answers.",
                &response.matches,
            );
            return Ok(response);
        }

        match self.generate(&query, &project, &response.matches, confidence).await {
            Some(reply) => {
                if let Err(e) = self.quota.record(inference_kind(shape)) {
                    warn!(error = %e, "Failed to record inference cost");
                }
                response.reply = reply;
                self.cache.put(&query, &response);
            }
            None => {
                response.inference_failed = true;
                response.reply = fallback_reply(
                    "I couldn't write a summary right now.",
                    &response.matches,
                );
            }
        }

        Ok(response)
    }

    /// Prompt, drain and shape. `None` when inference fails or yields nothing usable.
    async fn generate(
        &self,
        query: &str,
        project: &ProjectContext,
        matches: &[SkillMatch],
        confidence: Confidence,
    ) -> Option<String> {
        let request = self.prompts.build(query, project, matches, confidence);

        let raw = match complete_and_drain(self.completer.clone(), &request, self.inference_timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, model = self.completer.name(), "Inference failed");
                return None;
            }
        };

        let reply = self.shaper.shape(&raw);
        if reply.is_empty() {
            warn!(model = self.completer.name(), "Reply empty after shaping");
            return None;
        }
        Some(reply)
    }

    /// Attach full records; fall back to the stored snapshot when a record is missing.
    /// Lookups run on the blocking pool.
    async fn hydrate(&self, ranked: Vec<ScoredMatch>) -> Vec<SkillMatch> {
        let repo = Arc::clone(&self.repo);
        let ids: Vec<String> = ranked.iter().map(|m| m.id.clone()).collect();
        let lookups = tokio::task::spawn_blocking(move || {
            ids.iter()
                .map(|id| match repo.get_skill(id) {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(error = %e, id = %id, "Record lookup failed, using snapshot");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Record lookup task failed, using snapshots");
            Vec::new()
        });

        let mut lookups = lookups.into_iter();
        ranked
            .into_iter()
            .map(|m| {
                let record = lookups
                    .next()
                    .flatten()
                    .unwrap_or_else(|| snapshot_record(&m));
                SkillMatch {
                    record,
                    score: m.score,
                    raw_score: m.raw_score,
                    boost: m.boost,
                }
            })
            .collect()
    }
}

fn snapshot_record(m: &ScoredMatch) -> SkillRecord {
    let meta = &m.metadata;
    let mut record = SkillRecord::new(
        m.id.clone(),
        meta.name.clone(),
        meta.category.clone(),
        meta.years_of_experience,
        meta.proficiency_level,
    );
    record.related_project = meta.related_project.clone();
    record.employer = meta.employer.clone();
    record
}

/// Templated reply naming the top matches.
fn fallback_reply(lead: &str, matches: &[SkillMatch]) -> String {
    let names: Vec<String> = matches
        .iter()
        .take(3)
        .map(|m| {
            format!(
                "{} ({} years)",
                m.record.name,
                format_years(m.record.years_of_experience)
            )
        })
        .collect();
    format!("{lead} Top matches: {}.", names.join(", "))
}
