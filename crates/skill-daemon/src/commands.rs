//! Command implementations for skill-engine.
//!
//! Every command loads configuration, initializes logging, opens storage
//! and wires only the components it needs.

use std::fmt::Write as _;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use skill_embeddings::{create_embedder, EmbeddingModel};
use skill_indexing::{ReindexJob, ReindexOptions, ReindexReport};
use skill_llm::create_completer;
use skill_query::{
    PipelineParts, QueryOrchestrator, QueryResponse, QuotaBreaker, QuotaStatus, ResponseCache,
};
use skill_storage::{KeyValueStore, SkillRepository, Storage};
use skill_types::{ItemType, Settings};
use skill_vector::{CompositeVectorStore, IndexedStoreConfig, IndexedVectorStore, LinearScanStore, VectorStore};

use crate::cli::{CacheCommands, Cli, Commands, QuotaCommands};

/// Exit code for a query the pipeline refused (bad input, closed window, search down)
pub const QUERY_ERROR_EXIT: u8 = 2;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Opened storage plus the vector stores built on it.
pub struct Engine {
    settings: Settings,
    storage: Arc<Storage>,
    vectors: Arc<CompositeVectorStore>,
}

impl Engine {
    pub fn open(settings: Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open storage")?);

        let dimension = settings.vector.dimension;
        let index_config =
            IndexedStoreConfig::from_settings(&settings.vector, settings.expanded_index_path());
        let primary = match IndexedVectorStore::open(index_config) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Vector index unavailable, queries will use the linear scan");
                IndexedVectorStore::open(IndexedStoreConfig::unconfigured(dimension))
                    .context("Failed to create vector store")?
            }
        };

        let primary: Arc<dyn VectorStore> = Arc::new(primary);
        let secondary: Arc<dyn VectorStore> =
            Arc::new(LinearScanStore::new(storage.clone(), dimension));
        let vectors = Arc::new(CompositeVectorStore::new(
            primary,
            secondary,
            Duration::from_millis(settings.vector.primary_timeout_ms),
            Duration::from_millis(settings.vector.fallback_timeout_ms),
        ));

        Ok(Self {
            settings,
            storage,
            vectors,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    fn embedder(&self) -> Result<Arc<dyn EmbeddingModel>> {
        create_embedder(&self.settings.embedding, self.settings.vector.dimension)
            .context("Failed to create embedding model")
    }

    pub fn orchestrator(&self) -> Result<QueryOrchestrator> {
        let completer = create_completer(&self.settings.llm).context("Failed to create completion model")?;
        let parts = PipelineParts {
            embedder: self.embedder()?,
            vectors: self.vectors.clone(),
            repo: self.storage.clone(),
            kv: self.storage.clone(),
            completer,
        };
        QueryOrchestrator::new(&self.settings, parts).context("Invalid query configuration")
    }

    pub fn reindex_job(&self) -> Result<ReindexJob> {
        Ok(ReindexJob::new(
            self.storage.clone(),
            self.storage.clone(),
            self.embedder()?,
            self.vectors.clone(),
            self.settings.indexing.clone(),
        ))
    }

    pub fn quota(&self) -> QuotaBreaker {
        QuotaBreaker::new(self.storage.clone(), self.settings.quota.clone())
    }
}

/// Run a parsed command line. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<u8> {
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;
    let engine = Engine::open(settings)?;

    match cli.command {
        Commands::Ask {
            query,
            bypass_token,
            json,
        } => handle_ask(&engine, &query, bypass_token.as_deref(), json).await,
        Commands::Reindex {
            item_type,
            batch_size,
            max_batches,
            fresh,
        } => {
            let item_type: ItemType = item_type.parse().map_err(anyhow::Error::msg)?;
            let options = ReindexOptions {
                item_type,
                batch_size,
                max_batches,
                fresh,
            };
            handle_reindex(&engine, options).await?;
            Ok(0)
        }
        Commands::Quota { command } => {
            handle_quota(&engine, command)?;
            Ok(0)
        }
        Commands::Health => {
            handle_health(&engine).await?;
            Ok(0)
        }
        Commands::Cache { command } => {
            handle_cache(&engine, command)?;
            Ok(0)
        }
    }
}

pub async fn handle_ask(
    engine: &Engine,
    query: &str,
    bypass_token: Option<&str>,
    json: bool,
) -> Result<u8> {
    let orchestrator = engine.orchestrator()?;

    match orchestrator.answer_query(query, bypass_token).await {
        Ok(response) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", format_response(&response));
            }
            Ok(0)
        }
        Err(e) => {
            info!(category = e.category(), error = %e, "Query refused");
            eprintln!("error[{}]: {}", e.category(), e.user_message());
            Ok(QUERY_ERROR_EXIT)
        }
    }
}

pub async fn handle_reindex(engine: &Engine, options: ReindexOptions) -> Result<ReindexReport> {
    let job = engine.reindex_job()?;
    let report = job.run(options).await.context("Reindex failed")?;

    println!(
        "Reindex {} (version {}): {} batches, {} indexed, {} skipped, {} failed batches",
        report.job_id,
        report.version,
        report.batches_run,
        report.items_indexed,
        report.items_skipped,
        report.failed_batches
    );
    if report.completed {
        println!("Completed: {} items", report.total_items);
    } else {
        println!(
            "Paused at offset {} of {}; run again to resume",
            report.next_offset, report.total_items
        );
    }
    Ok(report)
}

pub fn handle_quota(engine: &Engine, command: QuotaCommands) -> Result<QuotaStatus> {
    let breaker = engine.quota();
    let status = match command {
        QuotaCommands::Status => breaker.check(),
        QuotaCommands::Reset => breaker.reset().context("Failed to reset quota")?,
        QuotaCommands::Resync { consumed, count } => breaker
            .resync(consumed, count)
            .context("Failed to resync quota")?,
    };
    print!("{}", format_quota(&status));
    Ok(status)
}

pub async fn handle_health(engine: &Engine) -> Result<()> {
    let report = engine.vectors.health_report().await;
    let label = |healthy: bool| if healthy { "healthy" } else { "unavailable" };

    println!("Vector index:  {}", label(report.primary));
    println!("Linear scan:   {}", label(report.secondary));
    println!("Skills stored: {}", engine.storage.count_skills()?);
    if !report.healthy() {
        anyhow::bail!("No vector backend is healthy");
    }
    Ok(())
}

pub fn handle_cache(engine: &Engine, command: CacheCommands) -> Result<usize> {
    match command {
        CacheCommands::Purge => {
            let removed = engine
                .storage
                .purge_expired()
                .context("Failed to purge expired entries")?;
            println!("Removed {removed} expired entries");
            Ok(removed)
        }
        CacheCommands::Invalidate { query } => {
            let cache = ResponseCache::new(engine.storage.clone(), engine.settings.cache.clone());
            let removed = usize::from(cache.invalidate(&query));
            if removed == 0 {
                println!("No cached reply for {query:?}");
            } else {
                println!("Dropped cached reply for {query:?}");
            }
            Ok(removed)
        }
    }
}

/// Human-readable rendering of a response.
pub fn format_response(response: &QueryResponse) -> String {
    let mut out = format!("{}\n", response.reply);

    if !response.matches.is_empty() {
        out.push_str("\nMatches:\n");
        for (i, m) in response.matches.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({} years, {}) score {:.2}",
                i + 1,
                m.record.name,
                m.record.years_of_experience,
                m.record.proficiency_level,
                m.score
            );
        }
    }

    let mut notes = Vec::new();
    if let Some(project) = &response.project {
        notes.push(format!("project: {project}"));
    }
    if let Some(confidence) = response.confidence {
        notes.push(format!("confidence: {}", confidence.as_str()));
    }
    if let Some(backend) = response.provenance {
        notes.push(format!("source: {backend}"));
    }
    if response.cached {
        notes.push("cached".to_string());
    }
    if response.quota_exceeded {
        notes.push("daily limit reached".to_string());
    }
    if response.inference_failed {
        notes.push("summary unavailable".to_string());
    }
    if !notes.is_empty() {
        let _ = writeln!(out, "\n[{}]", notes.join(", "));
    }
    out
}

fn format_quota(status: &QuotaStatus) -> String {
    format!(
        "Quota {} ({:?}): {} / {} units, {} inferences, resets {}\n",
        status.day,
        status.state,
        status.consumed,
        status.limit,
        status.inference_count,
        status.resets_at.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_query::{Confidence, SkillMatch};
    use skill_types::{ProficiencyLevel, SkillRecord};
    use skill_vector::Backend;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_settings(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.storage.db_path = dir.join("db").to_string_lossy().into_owned();
        settings.vector.index_path = None;
        settings.vector.dimension = 64;
        settings.embedding.provider = "hash".to_string();
        settings.llm.provider = "mock".to_string();
        settings
    }

    fn seed(engine: &Engine) {
        for record in [
            SkillRecord::new("python", "Python", "Languages", 12.0, ProficiencyLevel::Advanced)
                .with_summary("Python services and Python tooling")
                .with_employer("Acme"),
            SkillRecord::new("go", "Go", "Languages", 4.0, ProficiencyLevel::Intermediate)
                .with_summary("Go command-line tools"),
        ] {
            engine.storage().put_skill(&record).unwrap();
        }
    }

    #[test]
    fn test_format_response() {
        let response = QueryResponse {
            query: "python?".to_string(),
            matches: vec![SkillMatch {
                record: SkillRecord::new("python", "Python", "Languages", 12.0, ProficiencyLevel::Advanced),
                score: 0.8612,
                raw_score: 0.7829,
                boost: 1.1,
            }],
            reply: "Twelve years of Python at Acme.".to_string(),
            cached: true,
            quota_exceeded: false,
            inference_failed: false,
            confidence: Some(Confidence::High),
            project: None,
            provenance: Some(Backend::LinearScan),
        };

        let text = format_response(&response);
        assert!(text.starts_with("Twelve years of Python at Acme.\n"));
        assert!(text.contains("  1. Python (12 years, Advanced) score 0.86"));
        assert!(text.contains("[confidence: high, source: linear_scan, cached]"));
    }

    #[tokio::test]
    async fn test_rejected_query_exit_code() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(test_settings(temp.path())).unwrap();
        let code = handle_ask(&engine, "??", None, false).await.unwrap();
        assert_eq!(code, QUERY_ERROR_EXIT);
    }

    #[tokio::test]
    async fn test_reindex_then_ask() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(test_settings(temp.path())).unwrap();
        seed(&engine);

        let report = handle_reindex(&engine, ReindexOptions::default()).await.unwrap();
        assert!(report.completed);
        assert_eq!(report.items_indexed, 2);

        let code = handle_ask(&engine, "How much Python experience do you have?", None, true)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(engine.quota().check().inference_count, 1);
    }

    #[test]
    fn test_quota_commands() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(test_settings(temp.path())).unwrap();

        let status = handle_quota(&engine, QuotaCommands::Resync { consumed: 120, count: 7 }).unwrap();
        assert_eq!(status.consumed, 120);
        assert_eq!(handle_quota(&engine, QuotaCommands::Status).unwrap().inference_count, 7);
        assert_eq!(handle_quota(&engine, QuotaCommands::Reset).unwrap().consumed, 0);
        assert_eq!(engine.quota().check().consumed, 0);
    }

    #[tokio::test]
    async fn test_health_with_linear_scan_only() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(test_settings(temp.path())).unwrap();
        assert!(handle_health(&engine).await.is_ok());
    }

    #[test]
    fn test_cache_purge_on_empty_store() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(test_settings(temp.path())).unwrap();
        assert_eq!(handle_cache(&engine, CacheCommands::Purge).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_invalidate_drops_cached_reply() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(test_settings(temp.path())).unwrap();
        seed(&engine);
        handle_reindex(&engine, ReindexOptions::default()).await.unwrap();

        let orchestrator = engine.orchestrator().unwrap();
        let question = "How much Python experience do you have?";
        assert!(!orchestrator.answer_query(question, None).await.unwrap().cached);
        assert!(orchestrator.answer_query(question, None).await.unwrap().cached);

        let invalidate = |query: &str| CacheCommands::Invalidate {
            query: query.to_string(),
        };
        assert_eq!(handle_cache(&engine, invalidate("how much python experience do you have")).unwrap(), 1);
        assert_eq!(handle_cache(&engine, invalidate(question)).unwrap(), 0);
        assert!(!orchestrator.answer_query(question, None).await.unwrap().cached);
    }
}
