use std::sync::Arc;

use panel_harness::config::PanelConfig;
use panel_harness::events::{EvalEvent, MemoryEventSink};
use panel_harness::gateway::NoopUsageSink;
use panel_harness::judge::{JudgeConfidence, JudgeError};
use panel_harness::panel::{Panel, PanelError};
use panel_harness::rubric::{JudgeKind, PerJudge};
use panel_harness::submission::SubmissionContent;
use panel_harness::{ConfidenceLevel, ScoreCategory};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn envelope(content: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "panel-test",
        "message": { "role": "assistant", "content": content },
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 100,
        "eval_count": 50
    }))
}

/// Every criterion at 80% of its maximum.
fn technical_answer() -> String {
    json!({
        "technical_scores": {
            "architecture_quality": 24,
            "algorithm_justification": 12,
            "trade_offs": 8,
            "engineering_realism": 4
        },
        "total_technical_score": 48,
        "technical_reasoning": {
            "architecture_analysis": "Clear service split.",
            "algorithm_analysis": "Uses BM25 with a reranker.",
            "scalability_assessment": "Horizontal scaling is plausible.",
            "critical_gaps": ["No load testing"],
            "technical_strengths": ["Clean retrieval pipeline"],
            "improvements": ["Add a caching layer"]
        }
    })
    .to_string()
}

fn product_answer() -> String {
    // Fenced, with prose around it: recovered on the first attempt.
    let body = json!({
        "product_scores": {
            "problem_definition": 16,
            "solution_innovation": 20,
            "market_potential": "12"
        },
        "total_product_score": 48,
        "product_reasoning": {
            "problem_assessment": "Real pain point.",
            "innovation_analysis": "Novel combination.",
            "market_analysis": "Clinics first.",
            "differentiation_summary": "Offline-first.",
            "product_gaps": ["Pricing unclear"],
            "product_strengths": ["Strong user research"],
            "improvements": ["Run a pilot"]
        }
    });
    format!("Here is my evaluation:\n```json\n{body}\n```\nThanks!")
}

fn execution_answer() -> String {
    json!({
        "execution_scores": {
            "implementation_feasibility": 12,
            "demo_quality": 16,
            "execution_risks": 4
        },
        "total_execution_score": 32,
        "execution_reasoning": {
            "deployment_assessment": "Docker compose exists.",
            "demo_analysis": "Working end-to-end demo.",
            "feasibility_summary": "Shippable in a quarter.",
            "practical_concerns": ["Single region"],
            "execution_strengths": ["Live demo"],
            "risk_factors": ["Vendor lock-in"],
            "improvements": ["Add monitoring"]
        }
    })
    .to_string()
}

async fn mount_judge(server: &MockServer, schema_key: &str, answer: String) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains(schema_key))
        .respond_with(envelope(answer))
        .mount(server)
        .await;
}

async fn mount_all(server: &MockServer) {
    mount_judge(server, "technical_scores", technical_answer()).await;
    mount_judge(server, "product_scores", product_answer()).await;
    mount_judge(server, "execution_scores", execution_answer()).await;
}

fn config_for(server_uri: &str, cache_dir: Option<&TempDir>) -> PanelConfig {
    let mut config = PanelConfig::default();
    config.backend.base_url = server_uri.to_string();
    config.backend.model = "panel-test".to_string();
    config.backend.timeout_secs = 5;
    match cache_dir {
        Some(dir) => {
            config.cache.enabled = true;
            config.cache.path = dir.path().join("cache.sqlite");
        }
        None => config.cache.enabled = false,
    }
    config
}

fn submission() -> SubmissionContent {
    SubmissionContent::new(
        "Rural clinics lose patient records.",
        "Slide 1: offline-first EHR sync. Slide 2: architecture. Slide 3: demo.",
        "Visual:11/15 clean layout",
    )
}

#[tokio::test]
async fn full_panel_scores_and_aggregates() {
    let server = MockServer::start().await;
    mount_all(&server).await;

    let events = Arc::new(MemoryEventSink::new());
    let panel = Panel::from_config(&config_for(&server.uri(), None), Arc::new(NoopUsageSink))
        .unwrap()
        .with_events(events.clone());

    let result = panel.evaluate_content(&submission()).await.unwrap();

    assert!(result.excluded_judges.is_empty());
    assert_eq!(result.final_score, 112.0);
    assert_eq!(result.max_score, 140);
    assert_eq!(result.score_category, ScoreCategory::StrongContender);
    assert_eq!(*result.raw_judge_scores.get(JudgeKind::Technical), 48);
    assert_eq!(*result.raw_judge_scores.get(JudgeKind::Product), 48);
    assert_eq!(*result.raw_judge_scores.get(JudgeKind::Execution), 32);
    assert_eq!(*result.judge_scores.get(JudgeKind::Technical), 67.2);
    assert_eq!(*result.judge_scores.get(JudgeKind::Product), 28.0);
    assert_eq!(*result.judge_scores.get(JudgeKind::Execution), 16.8);

    // Recovered on the first attempt, so still full confidence.
    let product = result.judge_details.get(JudgeKind::Product);
    assert_eq!(product.judge_confidence, JudgeConfidence::High);
    assert_eq!(product.score("market_potential"), Some(12));

    let insights = &result.aggregated_insights;
    assert!(insights
        .top_strengths
        .contains(&"Clean retrieval pipeline".to_string()));
    assert!(insights.critical_weaknesses.contains(&"Pricing unclear".to_string()));

    // One call per judge, nothing retried.
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    let recorded = events.events();
    assert!(recorded.iter().any(|e| matches!(
        e,
        EvalEvent::ParseRecovered {
            judge: JudgeKind::Product,
            ..
        }
    )));
    assert!(recorded
        .iter()
        .any(|e| matches!(e, EvalEvent::AggregateCompleted { excluded: 0, .. })));
}

#[tokio::test]
async fn identical_submissions_score_identically() {
    let server = MockServer::start().await;
    mount_all(&server).await;

    let panel =
        Panel::from_config(&config_for(&server.uri(), None), Arc::new(NoopUsageSink)).unwrap();

    let a = panel.evaluate_content(&submission()).await.unwrap();
    let b = panel.evaluate_content(&submission()).await.unwrap();

    assert_eq!(a.final_score, b.final_score);
    assert_eq!(a.score_category, b.score_category);
    assert_eq!(a.judge_scores, b.judge_scores);
    assert_eq!(a.confidence, b.confidence);
    assert_eq!(a.aggregated_insights, b.aggregated_insights);
}

#[tokio::test]
async fn unparseable_judge_is_excluded_after_correction() {
    let server = MockServer::start().await;
    mount_judge(&server, "technical_scores", technical_answer()).await;
    mount_judge(&server, "product_scores", product_answer()).await;
    mount_judge(
        &server,
        "execution_scores",
        "I would rather talk about the weather.".to_string(),
    )
    .await;

    let events = Arc::new(MemoryEventSink::new());
    let panel = Panel::from_config(&config_for(&server.uri(), None), Arc::new(NoopUsageSink))
        .unwrap()
        .with_events(events.clone());

    let result = panel.evaluate_content(&submission()).await.unwrap();

    assert_eq!(result.excluded_judges, vec![JudgeKind::Execution]);
    assert_eq!(*result.raw_judge_scores.get(JudgeKind::Execution), 0);
    assert!(!result.weights_used.contains_key(&JudgeKind::Execution));
    let weight_sum: f64 = result.weights_used.values().sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
    // The two remaining judges are both at 80%.
    assert_eq!(result.final_score, 112.0);
    assert!(result.confidence.level <= ConfidenceLevel::Medium);
    assert!(result.confidence.reasoning.contains("execution"));

    let execution = result.judge_details.get(JudgeKind::Execution);
    assert_eq!(execution.judge_confidence, JudgeConfidence::Low);
    assert_eq!(execution.total(), 0);

    // Three first attempts plus one correction.
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
    assert!(events.events().iter().any(|e| matches!(
        e,
        EvalEvent::RetryingWithCorrection {
            judge: JudgeKind::Execution
        }
    )));
}

#[tokio::test]
async fn backend_error_fails_the_evaluation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "out of memory" })))
        .mount(&server)
        .await;

    let panel =
        Panel::from_config(&config_for(&server.uri(), None), Arc::new(NoopUsageSink)).unwrap();
    let err = panel.evaluate_content(&submission()).await.unwrap_err();

    assert!(matches!(
        err,
        PanelError::Judge(JudgeError::BackendUnavailable {
            judge: JudgeKind::Technical,
            ..
        })
    ));
    // Fail fast: no correction attempt, no further judges.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_backend_fails_the_evaluation() {
    // Unpooled, so dropping it closes the port.
    let server = MockServer::builder().start().await;
    let uri = server.uri();
    drop(server);

    let panel = Panel::from_config(&config_for(&uri, None), Arc::new(NoopUsageSink)).unwrap();
    let err = panel.evaluate_content(&submission()).await.unwrap_err();
    assert!(matches!(
        err,
        PanelError::Judge(JudgeError::BackendUnavailable { .. })
    ));
}

#[tokio::test]
async fn complete_results_are_served_from_cache() {
    let server = MockServer::start().await;
    mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let events = Arc::new(MemoryEventSink::new());
    let panel = Panel::from_config(&config_for(&server.uri(), Some(&dir)), Arc::new(NoopUsageSink))
        .unwrap()
        .with_events(events.clone());

    let first = panel.evaluate_content(&submission()).await.unwrap();
    let second = panel.evaluate_content(&submission()).await.unwrap();

    assert_eq!(first.final_score, second.final_score);
    assert_eq!(first.judge_scores, second.judge_scores);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(events
        .events()
        .iter()
        .any(|e| matches!(e, EvalEvent::CacheHit { .. })));

    // Different content is a different key.
    let other = SubmissionContent::new("Other problem", "Other slides", "");
    panel.evaluate_content(&other).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn changed_weights_bypass_earlier_cached_results() {
    let server = MockServer::start().await;
    mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let defaults = config_for(&server.uri(), Some(&dir));
    let panel = Panel::from_config(&defaults, Arc::new(NoopUsageSink)).unwrap();
    let first = panel.evaluate_content(&submission()).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    let mut reweighted = config_for(&server.uri(), Some(&dir));
    reweighted.weights = PerJudge::new(0.2, 0.4, 0.4);
    let panel = Panel::from_config(&reweighted, Arc::new(NoopUsageSink)).unwrap();
    let second = panel.evaluate_content(&submission()).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 6);
    assert_ne!(first.weights_used, second.weights_used);
    assert_eq!(second.weights_used[&JudgeKind::Technical], 0.2);
    assert_eq!(second.weights_used[&JudgeKind::Execution], 0.4);
}

#[tokio::test]
async fn incomplete_results_are_not_cached() {
    let server = MockServer::start().await;
    mount_judge(&server, "technical_scores", technical_answer()).await;
    mount_judge(&server, "product_scores", "nope".to_string()).await;
    mount_judge(&server, "execution_scores", execution_answer()).await;
    let dir = tempfile::tempdir().unwrap();

    let panel =
        Panel::from_config(&config_for(&server.uri(), Some(&dir)), Arc::new(NoopUsageSink))
            .unwrap();

    panel.evaluate_content(&submission()).await.unwrap();
    panel.evaluate_content(&submission()).await.unwrap();

    // 3 + 1 correction, twice.
    assert_eq!(server.received_requests().await.unwrap().len(), 8);
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let server = MockServer::start().await;
    mount_all(&server).await;

    let panel =
        Panel::from_config(&config_for(&server.uri(), None), Arc::new(NoopUsageSink)).unwrap();

    let outcomes = panel
        .evaluate_batch(
            vec![
                ("alpha".to_string(), submission()),
                ("beta".to_string(), SubmissionContent::new("p", "c", "")),
            ],
            2,
        )
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].team, "alpha");
    assert_eq!(outcomes[1].team, "beta");
    assert!(outcomes.iter().all(|o| o.result.is_some() && o.error.is_none()));
}
