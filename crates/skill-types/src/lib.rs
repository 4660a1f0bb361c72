//! # skill-types
//!
//! Shared domain types for the skill query engine.
//!
//! This crate defines the data structures used throughout the system:
//! - Skill records: curated reference data about professional skills
//! - Item snapshots: denormalized metadata stored next to each embedding
//! - Settings: layered configuration and every tunable constant of the pipeline
//!
//! ## Usage
//!
//! ```rust
//! use skill_types::{ProficiencyLevel, SkillRecord};
//!
//! let record = SkillRecord::new("py", "Python", "Languages", 12.0, ProficiencyLevel::Advanced);
//! assert_eq!(record.snapshot().name, "Python");
//! ```

pub mod config;
pub mod error;
pub mod skill;
pub mod tuning;

pub use config::{
    EmbeddingSettings, LlmSettings, ProjectEntry, Settings, StorageSettings, VectorSettings,
};
pub use error::SkillError;
pub use skill::{ItemSnapshot, ItemType, LevelTier, ProficiencyLevel, SkillRecord};
pub use tuning::{
    BoostConfig, BoostShelf, CacheConfig, IndexingConfig, InferenceCosts, QuotaConfig,
    RankingConfig, ResponseConfig, ValidationConfig, WindowConfig,
};
