use std::process::Command;

use panel_harness::aggregate::{AggregateResult, Aggregator};
use panel_harness::judge::{JudgeConfidence, JudgeReasoning, JudgeResult};
use panel_harness::panel::BatchOutcome;
use panel_harness::rubric::{JudgeKind, PerJudge, RubricScore};
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn judged(kind: JudgeKind, fraction: f64) -> JudgeResult {
    let scores = kind
        .rubric()
        .criteria
        .iter()
        .map(|c| {
            let raw = (f64::from(c.max) * fraction).round() as u64;
            RubricScore::clamped(c.name, raw, c.max)
        })
        .collect();
    let reasoning = JudgeReasoning {
        strengths: vec![format!("{kind} strength")],
        gaps: vec![format!("{kind} gap")],
        ..Default::default()
    };
    JudgeResult::new(kind, "llama3.1", scores, reasoning, JudgeConfidence::High)
}

fn result(fraction: f64) -> AggregateResult {
    Aggregator::default().aggregate(PerJudge::new(
        judged(JudgeKind::Technical, fraction),
        judged(JudgeKind::Product, fraction),
        judged(JudgeKind::Execution, fraction),
    ))
}

fn panel() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_panel"));
    // Keep the host environment from steering the runs below.
    for key in [
        "OLLAMA_HOST",
        "PANEL_MODEL",
        "OLLAMA_TIMEOUT_SECONDS",
        "PANEL_MIN_REQUEST_INTERVAL_MS",
        "PANEL_ENABLE_CACHE",
        "PANEL_CACHE_PATH",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn cli_report_renders_markdown() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("result.json");
    let out = dir.path().join("report.md");
    std::fs::write(&input, serde_json::to_string_pretty(&result(1.0)).unwrap()).unwrap();

    let status = panel()
        .args(["report", "--team", "Team Rocket"])
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let md = std::fs::read_to_string(&out).unwrap();
    assert!(md.starts_with("# Evaluation Report: Team Rocket"));
    assert!(md.contains("- Final score: 140.0 / 140"));
    assert!(md.contains("- technical strength"));
}

#[test]
fn cli_leaderboard_ranks_outcomes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("outcomes.json");
    let outcomes = vec![
        BatchOutcome {
            team: "middle".into(),
            result: Some(result(0.5)),
            error: None,
        },
        BatchOutcome::failed("broken", "backend unavailable"),
        BatchOutcome {
            team: "winner".into(),
            result: Some(result(1.0)),
            error: None,
        },
    ];
    std::fs::write(&input, serde_json::to_string(&outcomes).unwrap()).unwrap();

    let output = panel()
        .args(["leaderboard", "--json"])
        .arg("--input")
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let board: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let teams: Vec<&str> = board["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["team"].as_str().unwrap())
        .collect();
    assert_eq!(teams, vec!["winner", "middle", "broken"]);
    assert_eq!(board["entries"][0]["total_score"], 100.0);
    assert_eq!(board["entries"][2]["reason"], "Evaluation failed");
}

#[test]
fn cli_rejects_malformed_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.json");
    std::fs::write(&input, "{ not json").unwrap();

    let output = panel()
        .arg("report")
        .arg("--input")
        .arg(&input)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid JSON"));
}

#[test]
fn cli_judges_lists_seats_and_weights() {
    let output = panel().arg("judges").output().unwrap();
    assert!(output.status.success());

    let seats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(seats.as_array().unwrap().len(), 3);
    assert_eq!(seats[0]["judge"], "technical");
    assert_eq!(seats[0]["weight"], 0.6);
    assert_eq!(seats[2]["max_score"], 40);
}

fn envelope(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "message": { "role": "assistant", "content": content.to_string() },
        "done": true,
        "done_reason": "stop"
    }))
}

#[tokio::test]
async fn cli_evaluate_against_mock_backend() {
    let server = MockServer::start().await;
    let answers = [
        (
            "technical_scores",
            json!({"technical_scores": {"architecture_quality": 30, "algorithm_justification": 15, "trade_offs": 10, "engineering_realism": 5}}),
        ),
        (
            "product_scores",
            json!({"product_scores": {"problem_definition": 20, "solution_innovation": 25, "market_potential": 15}}),
        ),
        (
            "execution_scores",
            json!({"execution_scores": {"implementation_feasibility": 15, "demo_quality": 20, "execution_risks": 5}}),
        ),
    ];
    for (key, answer) in answers {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains(key))
            .respond_with(envelope(answer))
            .mount(&server)
            .await;
    }

    let dir = tempdir().unwrap();
    let slides = dir.path().join("slides.txt");
    let out = dir.path().join("result.json");
    let events = dir.path().join("events.jsonl");
    std::fs::write(&slides, "Slide 1: architecture\nSlide 2: demo").unwrap();

    let uri = server.uri();
    let status = tokio::task::spawn_blocking(move || {
        panel()
            .env("OLLAMA_HOST", uri)
            .args(["evaluate", "--problem", "Records get lost", "--no-cache"])
            .arg("--content-file")
            .arg(&slides)
            .arg("--out")
            .arg(&out)
            .arg("--events")
            .arg(&events)
            .status()
            .map(|status| (status, out, events))
    })
    .await
    .unwrap();
    let (status, out, events) = status.unwrap();
    assert!(status.success());

    let result: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(result["final_score"], 140.0);
    assert_eq!(result["score_category"], "Top-tier / Likely Winner");

    let log = std::fs::read_to_string(&events).unwrap();
    assert!(log.lines().any(|l| l.contains("\"aggregate_completed\"")));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
