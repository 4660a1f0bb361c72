//! Experience-weighted ranking E2E tests.
//!
//! A senior record must outrank a junior one for the same skill even when
//! raw cosine similarity slightly favors the junior record.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{sample_records, vector_with_similarity, TestHarness};
use skill_llm::MockCompleter;
use skill_query::Confidence;
use skill_types::{ProficiencyLevel, SkillRecord};

const QUERY: &str = "What is your experience with Python?";

fn python(id: &str, years: f32, employer: &str) -> SkillRecord {
    SkillRecord::new(id, "Python", "Languages", years, ProficiencyLevel::Advanced)
        .with_summary("Backend services")
        .with_employer(employer)
}

#[tokio::test]
async fn test_senior_record_outranks_closer_junior_record() {
    let harness = TestHarness::new();
    let query = harness.embed(QUERY);
    harness.seed_with_vector(&python("python-3y", 3.0, "Globex"), &vector_with_similarity(&query, 0.82));
    harness.seed_with_vector(&python("python-12y", 12.0, "Acme"), &vector_with_similarity(&query, 0.78));

    let completer = Arc::new(MockCompleter::default());
    let orchestrator = harness.orchestrator(completer.clone());
    let response = orchestrator.answer_query(QUERY, None).await.unwrap();

    let ids: Vec<&str> = response.matches.iter().map(|m| m.record.id.as_str()).collect();
    assert_eq!(ids, vec!["python-12y", "python-3y"]);

    let top = &response.matches[0];
    assert!((top.raw_score - 0.78).abs() < 1e-3);
    assert_eq!(top.boost, 1.10);
    assert!((top.score - 0.858).abs() < 1e-3);
    assert_eq!(response.matches[1].boost, 1.0);
    assert_eq!(response.confidence, Some(Confidence::High));

    // The reply is attributed to the top match's employer
    let request = completer.last_request().unwrap();
    assert!(request.system.contains("attribution to Acme"));
    assert!(request.user.contains("1. Python (Languages): 12 years, Advanced (senior)"));
}

#[tokio::test]
async fn test_boost_holds_across_small_raw_margins() {
    for margin in [0.0, 0.01, 0.03, 0.05] {
        let harness = TestHarness::new();
        let query = harness.embed(QUERY);
        harness.seed_with_vector(
            &python("python-3y", 3.0, "Globex"),
            &vector_with_similarity(&query, 0.78 + margin),
        );
        harness.seed_with_vector(&python("python-12y", 12.0, "Acme"), &vector_with_similarity(&query, 0.78));

        let response = harness
            .orchestrator(Arc::new(MockCompleter::default()))
            .answer_query(QUERY, None)
            .await
            .unwrap();
        assert_eq!(response.matches[0].record.id, "python-12y", "margin {margin}");
    }
}

#[tokio::test]
async fn test_scores_stay_in_unit_range() {
    let harness = TestHarness::new();
    let query = harness.embed(QUERY);
    // Exact match on an expert record would exceed 1.0 without the clamp
    let expert = SkillRecord::new("python-16y", "Python", "Languages", 16.0, ProficiencyLevel::Expert);
    harness.seed_with_vector(&expert, &vector_with_similarity(&query, 1.0));
    // Opposite direction: negative cosine
    let unrelated = SkillRecord::new("cobol", "COBOL", "Languages", 1.0, ProficiencyLevel::Beginner);
    let opposite: Vec<f32> = query.iter().map(|x| -x).collect();
    harness.seed_with_vector(&unrelated, &opposite);

    let response = harness
        .orchestrator(Arc::new(MockCompleter::default()))
        .answer_query(QUERY, None)
        .await
        .unwrap();

    assert_eq!(response.matches.len(), 2);
    assert_eq!(response.matches[0].score, 1.0);
    assert_eq!(response.matches[1].score, 0.0);
    assert!(response.matches[1].raw_score < -0.99);
}

#[tokio::test]
async fn test_query_shape_sets_match_count_and_cost() {
    let harness = TestHarness::new();
    harness.seed_and_embed(&sample_records());
    let orchestrator = harness.orchestrator(Arc::new(MockCompleter::default()));

    let direct = orchestrator
        .answer_query("What is your experience with Python?", None)
        .await
        .unwrap();
    let synthesis = orchestrator
        .answer_query("Summarize your strongest skills", None)
        .await
        .unwrap();

    // Direct questions get the top 5, synthesis up to 10 (only 5 records exist)
    assert_eq!(direct.matches.len(), 5);
    assert_eq!(synthesis.matches.len(), 5);
    // 10 for the direct answer, 25 for the synthesis
    assert_eq!(orchestrator.quota().check().consumed, 35);
}
