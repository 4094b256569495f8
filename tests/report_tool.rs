//! Synthesis report tool: credentials, agent failures and HTML artifacts.

mod common;

use common::{FakeAgent, TestHarness};
use pretty_assertions::assert_eq;
use serde_json::json;
use sky_gateway::collaborators::CollaboratorError;
use sky_gateway::ErrorType;

#[tokio::test]
async fn test_missing_key() {
    let harness = TestHarness::new();
    let envelope = harness
        .registry()
        .dispatch("discover_synthesis_report", json!({"query": "Fe2O3"}))
        .await;
    assert_eq!(envelope.error_type(), Some(ErrorType::MissingEnv));
    assert_eq!(
        envelope.error().unwrap().message,
        "OPENAI_API_KEY or OPENAI_MDG_API_KEY not found in environment."
    );
    assert_eq!(envelope.meta()["warnings"], json!([]));
}

#[tokio::test]
async fn test_text_only_report() {
    let harness = TestHarness::new().with_var("OPENAI_API_KEY", "k");
    let envelope = harness
        .registry()
        .dispatch("discover_synthesis_report", json!({"query": "Fe2O3"}))
        .await;
    assert!(envelope.is_ok(), "{:?}", envelope.error());
    assert!(envelope.data()["analysis_text"]
        .as_str()
        .unwrap()
        .contains("calcination"));
    assert!(envelope.data()["report_path"].is_null());
    assert_eq!(
        envelope.meta()["warnings"],
        json!(["networked", "nondeterministic", "may incur cost"])
    );
    assert_eq!(envelope.provenance()["source"], json!("openai"));
    assert_eq!(envelope.provenance()["outputs"], json!([]));
    assert!(!harness.root().join("sky_reports").exists());
}

#[tokio::test]
async fn test_html_report_is_written_under_reports_dir() {
    let harness = TestHarness::new().with_var("OPENAI_MDG_API_KEY", "k");
    let envelope = harness
        .registry()
        .dispatch(
            "discover_synthesis_report",
            json!({"query": "Fe2O3 <synthesis>", "html": true}),
        )
        .await;
    assert!(envelope.is_ok(), "{:?}", envelope.error());

    let rel = envelope.data()["report_path"].as_str().unwrap().to_string();
    assert!(rel.starts_with("sky_reports"), "{rel}");
    assert!(rel.ends_with(".html"), "{rel}");
    assert_eq!(envelope.provenance()["outputs"], json!([rel]));

    let html = std::fs::read_to_string(harness.root().join(&rel)).unwrap();
    assert!(html.contains("calcination"));
    assert!(!html.contains("<synthesis>"));

    let leftovers: Vec<_> = std::fs::read_dir(harness.root().join("sky_reports"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().ends_with(".html"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_blank_query() {
    let harness = TestHarness::new().with_var("OPENAI_API_KEY", "k");
    let envelope = harness
        .registry()
        .dispatch("discover_synthesis_report", json!({"query": "  "}))
        .await;
    assert_eq!(envelope.error_type(), Some(ErrorType::InvalidInput));
}

#[tokio::test]
async fn test_agent_failures() {
    for (error, expected) in [
        (
            CollaboratorError::Timeout("OpenAI".into()),
            ErrorType::UpstreamTimeout,
        ),
        (
            CollaboratorError::RateLimited("OpenAI".into()),
            ErrorType::UpstreamRateLimited,
        ),
        (
            CollaboratorError::Upstream("HTTP 502".into()),
            ErrorType::RuntimeError,
        ),
    ] {
        let harness = TestHarness::new()
            .with_var("OPENAI_API_KEY", "k")
            .with_agent(FakeAgent { reply: Err(error) });
        let envelope = harness
            .registry()
            .dispatch(
                "discover_synthesis_report",
                json!({"query": "Fe2O3", "html": true}),
            )
            .await;
        assert_eq!(envelope.error_type(), Some(expected));
        assert_eq!(
            envelope.error().unwrap().message,
            "Synthesis report generation failed."
        );
        assert!(!harness.root().join("sky_reports").exists());
    }
}
