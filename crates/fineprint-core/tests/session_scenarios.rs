use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fineprint_core::analyzer::USER_FACING_ERROR;
use fineprint_core::{
    AnalysisError, AnalysisStatus, Analyzer, GenerationRequest, ModelBackend, RiskBuckets,
    Session, Severity, SubmitRejected, MAX_DOCUMENT_CHARS,
};
use insta::assert_json_snapshot;
use serde_json::json;

enum Reply {
    Text(&'static str),
    Empty,
    Fail,
    Hang,
}

/// Backend that plays back canned replies and records every request.
struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.requests.lock().unwrap().last().unwrap().prompt.clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(Some(text.to_string())),
            Some(Reply::Empty) | None => Ok(None),
            Some(Reply::Fail) => Err(anyhow!("connection reset by peer")),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }
}

fn analyzer(replies: Vec<Reply>) -> Analyzer<ScriptedBackend> {
    Analyzer::new(Box::new(ScriptedBackend::new(replies)))
}

fn document(len: usize) -> String {
    "x".repeat(len)
}

const EMPTY_RECOMMENDED: &str = r#"{"score":85,"verdict":"RECOMMENDED","recommendation":"Safe to use","summary":"Nothing alarming.","items":[]}"#;

const FENCED_HIGH: &str = "```json\n{\"score\":20,\"verdict\":\"AVOID\",\"recommendation\":\"Do not agree\",\"summary\":\"Sells your data.\",\"companyName\":\"Acme\",\"items\":[{\"originalText\":\"WE MAY SELL YOUR DATA.\",\"simplifiedTranslation\":\"They sell your data.\",\"severity\":\"HIGH\",\"category\":\"Privacy\",\"explanation\":\"Your information becomes their product.\"}]}\n```";

const TWO_ITEMS: &str = r#"{"score":60,"verdict":"CAUTION","recommendation":"Read carefully","summary":"Mixed.","items":[{"originalText":"a","simplifiedTranslation":"b","severity":"LOW","category":"Billing","explanation":"c"},{"originalText":"d","simplifiedTranslation":"e","severity":"MEDIUM","category":"Billing","explanation":"f"}]}"#;

#[tokio::test(flavor = "current_thread")]
async fn scenario_a_empty_result_completes() {
    let analyzer = analyzer(vec![Reply::Text(EMPTY_RECOMMENDED)]);
    let mut session = Session::new();

    let status = session.run(&analyzer, &document(60), true).await.unwrap();

    assert_eq!(status, AnalysisStatus::Complete);
    assert_eq!(
        session.transitions(),
        &[
            AnalysisStatus::Idle,
            AnalysisStatus::Analyzing,
            AnalysisStatus::Complete
        ]
    );
    let result = session.state().result().unwrap();
    assert_eq!(result.score, 85);
    assert!(result.items.is_empty());
    let buckets = RiskBuckets::from_result(result);
    assert!(buckets.high.is_empty() && buckets.medium.is_empty() && buckets.good.is_empty());
    assert_eq!(analyzer.backend().calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_b_fenced_high_item_is_a_concern() {
    let analyzer = analyzer(vec![Reply::Text(FENCED_HIGH)]);
    let mut session = Session::new();

    session.run(&analyzer, &document(120), true).await.unwrap();

    let result = session.state().result().unwrap();
    assert_eq!(result.items.len(), 1);
    assert!(result.items[0].id.starts_with("risk-0-"));
    assert_eq!(result.items[0].severity, Severity::High);
    let buckets = RiskBuckets::from_result(result);

    let summary = json!({
        "status": session.status(),
        "company": result.company_name,
        "concerns": buckets.concern_count(),
        "good": buckets.good.len(),
        "severities": result.items.iter().map(|i| i.severity).collect::<Vec<_>>(),
    });
    assert_json_snapshot!(summary, @r###"
    {
      "company": "Acme",
      "concerns": 1,
      "good": 0,
      "severities": [
        "HIGH"
      ],
      "status": "complete"
    }
    "###);
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_c_non_json_reply_surfaces_generic_message() {
    let analyzer = analyzer(vec![Reply::Text("Sorry, I can't analyze this document.")]);
    let mut session = Session::new();

    let status = session.run(&analyzer, &document(80), true).await.unwrap();

    assert_eq!(status, AnalysisStatus::Error);
    let message = session.state().error_message().unwrap();
    assert_eq!(message, USER_FACING_ERROR);
    assert!(!message.contains("Sorry"));
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_c_analyzer_reports_malformed_response() {
    let analyzer = analyzer(vec![Reply::Text("not json at all")]);
    let err = analyzer.analyze(&document(80)).await.unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedResponse { ref raw, .. } if raw == "not json at all"));
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_d_transport_failure_replaces_prior_result() {
    let analyzer = analyzer(vec![Reply::Text(FENCED_HIGH), Reply::Fail]);
    let mut session = Session::new();

    session.run(&analyzer, &document(100), true).await.unwrap();
    assert!(session.state().result().is_some());
    assert!(session.reset());

    let status = session.run(&analyzer, &document(100), true).await.unwrap();
    assert_eq!(status, AnalysisStatus::Error);
    assert!(session.state().result().is_none());
    assert_eq!(session.state().error_message(), Some(USER_FACING_ERROR));
    assert_eq!(analyzer.backend().calls(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_e_unacknowledged_submit_is_noop() {
    let analyzer = analyzer(vec![Reply::Text(EMPTY_RECOMMENDED)]);
    let mut session = Session::new();

    let rejected = session.run(&analyzer, &document(200), false).await.unwrap_err();

    assert_eq!(rejected, SubmitRejected::NotAcknowledged);
    assert_eq!(session.status(), AnalysisStatus::Idle);
    assert_eq!(session.transitions(), &[AnalysisStatus::Idle]);
    assert_eq!(analyzer.backend().calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn short_documents_never_reach_the_backend() {
    let analyzer = analyzer(vec![Reply::Text(EMPTY_RECOMMENDED)]);
    let mut session = Session::new();

    for len in [0, 1, 49, 50] {
        let rejected = session.run(&analyzer, &document(len), true).await.unwrap_err();
        assert_eq!(rejected, SubmitRejected::TooShort);
    }
    let err = analyzer.analyze("   too short   ").await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));
    assert_eq!(analyzer.backend().calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn long_documents_are_truncated_before_the_call() {
    let analyzer = analyzer(vec![Reply::Text(EMPTY_RECOMMENDED)]);
    let mut doc = "a".repeat(MAX_DOCUMENT_CHARS);
    doc.push_str(&"Z".repeat(500));

    analyzer.analyze(&doc).await.unwrap();

    let prompt = analyzer.backend().last_prompt();
    assert!(prompt.contains(&"a".repeat(MAX_DOCUMENT_CHARS)));
    assert!(!prompt.contains('Z'));
}

#[tokio::test(flavor = "current_thread")]
async fn missing_payload_is_no_response() {
    let analyzer = analyzer(vec![Reply::Empty]);
    let err = analyzer.analyze(&document(80)).await.unwrap_err();
    assert!(matches!(err, AnalysisError::NoResponse));
    assert_eq!(analyzer.backend().calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn transport_failure_is_not_retried() {
    let analyzer = analyzer(vec![Reply::Fail, Reply::Text(EMPTY_RECOMMENDED)]);
    let err = analyzer.analyze(&document(80)).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Transport(_)));
    assert_eq!(analyzer.backend().calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn every_item_gets_a_distinct_id() {
    let analyzer = analyzer(vec![Reply::Text(TWO_ITEMS)]);
    let result = analyzer.analyze(&document(80)).await.unwrap();
    let ids: HashSet<_> = result.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids.len(), result.items.len());
    assert_eq!(result.items[0].severity, Severity::Low);
    assert_eq!(result.items[1].severity, Severity::Medium);
}

#[tokio::test(flavor = "current_thread")]
async fn deadline_turns_hang_into_timeout() {
    let analyzer = analyzer(vec![Reply::Hang, Reply::Hang]).with_timeout(Duration::from_millis(20));
    let mut session = Session::new();

    let status = session.run(&analyzer, &document(80), true).await.unwrap();

    assert_eq!(status, AnalysisStatus::Error);
    let err = analyzer.analyze(&document(80)).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Timeout(_)));
}

#[test]
fn request_carries_schema_and_instructions() {
    let analyzer = analyzer(vec![]).with_model("gemini-test");
    let request = analyzer.build_request("Terms go here.");
    assert_eq!(request.model, "gemini-test");
    assert!(request.system_instruction.contains("cynical but fair"));
    assert!(request.prompt.contains("Terms go here."));
    assert_eq!(request.response_schema["type"], "object");
}
