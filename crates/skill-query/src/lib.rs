//! # skill-query
//!
//! The question-answering pipeline.
//!
//! ## Stages
//! - `InputValidator`: normalization and rejection rules
//! - `AvailabilityWindow`: UTC opening hours with a bypass token
//! - `ProjectRegistry`: project phrase detection and query cleanup
//! - `ResponseCache`: normalized-query response cache with TTL
//! - `ShapeClassifier` + `Ranker`: direct vs. synthesis retrieval
//! - `QuotaBreaker`: daily inference budget that degrades to templated replies
//! - `PromptBuilder` + `ReplyShaper`: prompt construction and deterministic cleanup
//! - `QueryOrchestrator`: runs the stages in order

pub mod cache;
pub mod classifier;
pub mod error;
pub mod orchestrator;
pub mod project;
pub mod prompt;
pub mod quota;
pub mod shaper;
pub mod types;
pub mod validation;
pub mod window;

pub use cache::ResponseCache;
pub use classifier::{inference_kind, ShapeClassifier};
pub use error::QueryError;
pub use orchestrator::{PipelineParts, QueryOrchestrator};
pub use project::{ProjectContext, ProjectRegistry};
pub use prompt::{attribution, seniority, PromptBuilder};
pub use quota::{BreakerState, InferenceKind, QuotaBreaker, QuotaStatus};
pub use shaper::ReplyShaper;
pub use types::{Confidence, QueryResponse, SkillMatch};
pub use validation::{InputValidator, RejectReason};
pub use window::{AvailabilityWindow, WindowDecision};
