use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::llm::{GenerationRequest, ModelBackend};
use crate::schema::{response_schema, AnalysisResult, ModelAnalysis};

/// Shortest document (in characters, after trimming) worth sending.
pub const MIN_DOCUMENT_CHARS: usize = 50;
/// Documents are cut to this many characters before they reach the model.
pub const MAX_DOCUMENT_CHARS: usize = 100_000;
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Shown to the user for every failure; details only go to the logs.
pub const USER_FACING_ERROR: &str = "Failed to analyze the text. The AI might be busy or the text format is invalid. Please try again.";

const SYSTEM_INSTRUCTION: &str = "You are an expert consumer rights lawyer and privacy advocate. Your goal is to protect users from predatory legal terms. Be cynical but fair. Translate legalese into blunt, simple English. Your 'recommendation' must be a clear directive on whether it is okay to use the service.";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?").expect("valid fence regex"));

/// Failure modes of a single analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("model returned no response")]
    NoResponse,
    /// `raw` holds the payload for diagnostics; it is not part of the
    /// display string.
    #[error("model response is malformed: {reason}")]
    MalformedResponse { reason: String, raw: String },
    #[error("model request failed")]
    Transport(#[source] anyhow::Error),
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
}

impl AnalysisError {
    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NoResponse => "no_response",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
        }
    }

    pub fn user_message(&self) -> &'static str {
        USER_FACING_ERROR
    }
}

/// Turns a document into an [`AnalysisResult`] through exactly one call to
/// the injected model backend.
pub struct Analyzer<B: ?Sized> {
    model: String,
    timeout: Option<Duration>,
    backend: Box<B>,
}

impl<B: ModelBackend + ?Sized> Analyzer<B> {
    pub fn new(backend: Box<B>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
            backend,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Race the backend call against a deadline. Without one the call may
    /// wait indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Build the outbound request for a document, applying the length cap.
    pub fn build_request(&self, document: &str) -> GenerationRequest {
        let (text, _) = truncate_document(document);
        GenerationRequest {
            model: self.model.clone(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            prompt: task_prompt(text),
            response_schema: response_schema(),
        }
    }

    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn analyze(&self, document: &str) -> Result<AnalysisResult, AnalysisError> {
        let usable = document.trim().chars().count();
        if usable < MIN_DOCUMENT_CHARS {
            return Err(AnalysisError::InvalidInput(format!(
                "document has {usable} usable characters, at least {MIN_DOCUMENT_CHARS} required"
            )));
        }

        let (_, truncated) = truncate_document(document);
        info!(chars = usable, truncated, "starting analysis");
        let request = self.build_request(document);

        let call = self.backend.generate(&request);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AnalysisError::Timeout(limit))?,
            None => call.await,
        };
        let payload = outcome
            .map_err(AnalysisError::Transport)?
            .filter(|text| !text.trim().is_empty())
            .ok_or(AnalysisError::NoResponse)?;
        debug!(payload = %payload, "raw model payload");

        let result = parse_payload(&payload, current_stamp())?;
        info!(
            score = result.score,
            verdict = result.verdict.as_str(),
            items = result.items.len(),
            "analysis complete"
        );
        Ok(result)
    }
}

/// Strip markdown fences, parse, validate and attach identifiers.
pub fn parse_payload(payload: &str, stamp: u128) -> Result<AnalysisResult, AnalysisError> {
    let cleaned = strip_code_fences(payload);
    let malformed = |reason: String| {
        warn!(%reason, "rejecting model payload");
        AnalysisError::MalformedResponse {
            reason,
            raw: payload.to_string(),
        }
    };
    let model: ModelAnalysis =
        serde_json::from_str(&cleaned).map_err(|err| malformed(err.to_string()))?;
    model
        .validate(|index| item_id(index, stamp))
        .map_err(|err| malformed(err.to_string()))
}

/// Remove every ```` ``` ```` / ```` ```json ```` marker and trim.
pub fn strip_code_fences(payload: &str) -> String {
    CODE_FENCE.replace_all(payload, "").trim().to_string()
}

/// Returns the first [`MAX_DOCUMENT_CHARS`] characters and whether anything
/// was dropped.
pub fn truncate_document(document: &str) -> (&str, bool) {
    match document.char_indices().nth(MAX_DOCUMENT_CHARS) {
        Some((byte_idx, _)) => (&document[..byte_idx], true),
        None => (document, false),
    }
}

/// Position plus call stamp is unique within a batch; results from different
/// calls are never merged.
pub fn item_id(index: usize, stamp: u128) -> String {
    format!("risk-{index}-{stamp}")
}

fn current_stamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

fn task_prompt(text: &str) -> String {
    format!(
        "Analyze the following Terms of Service / Privacy Policy text.\n\
         Identify \"Red Flags\" (scary clauses like selling data, waiving rights, hard cancellation) \
         and \"Green Flags\" (user-friendly terms).\n\n\
         Determine a final verdict (RECOMMENDED, ACCEPTABLE, CAUTION, AVOID) based on how predatory the terms are.\n\n\
         Text to analyze:\n\"{text}\"\n\n\
         (Truncated if over {MAX_DOCUMENT_CHARS} characters, focus on the available text.)"
    )
}
