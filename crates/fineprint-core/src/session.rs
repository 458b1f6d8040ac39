use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analyzer::{AnalysisError, Analyzer, MIN_DOCUMENT_CHARS};
use crate::llm::ModelBackend;
use crate::schema::AnalysisResult;

/// Coarse status of a session, as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Idle,
    Analyzing,
    Complete,
    Error,
}

/// Session state; each variant carries only the data valid for it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Analyzing,
    Complete(AnalysisResult),
    Error {
        message: String,
    },
}

impl SessionState {
    pub fn status(&self) -> AnalysisStatus {
        match self {
            Self::Idle => AnalysisStatus::Idle,
            Self::Analyzing => AnalysisStatus::Analyzing,
            Self::Complete(_) => AnalysisStatus::Complete,
            Self::Error { .. } => AnalysisStatus::Error,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Complete(result) => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Why a submit did not start an analysis. The state is left untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    #[error("an analysis is already in progress")]
    Busy,
    #[error("reset the session before starting a new analysis")]
    NotIdle,
    #[error("paste more than {} characters to analyze", MIN_DOCUMENT_CHARS)]
    TooShort,
    #[error("acknowledge that this is an AI analysis, not legal advice")]
    NotAcknowledged,
}

/// Token for the single in-flight analysis; consumed by [`Session::resolve`].
#[derive(Debug)]
#[must_use = "an accepted submission must be resolved"]
pub struct Submission {
    text: String,
}

impl Submission {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Drives one user's flow through idle → analyzing → complete/error.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    transitions: Vec<AnalysisStatus>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            transitions: vec![AnalysisStatus::Idle],
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> AnalysisStatus {
        self.state.status()
    }

    /// Every status the session has entered, oldest first.
    pub fn transitions(&self) -> &[AnalysisStatus] {
        &self.transitions
    }

    /// `idle --submit--> analyzing`.
    pub fn submit(&mut self, text: &str, acknowledged: bool) -> Result<Submission, SubmitRejected> {
        self.check_submit(text, acknowledged)?;
        self.enter(SessionState::Analyzing);
        Ok(Submission {
            text: text.to_string(),
        })
    }

    /// `analyzing --success/failure--> complete/error`. Replaces whatever the
    /// session held before.
    pub fn resolve(
        &mut self,
        _submission: Submission,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> AnalysisStatus {
        let next = match outcome {
            Ok(result) => SessionState::Complete(result),
            Err(err) => {
                warn!(kind = err.kind(), error = ?err, "analysis failed");
                SessionState::Error {
                    message: err.user_message().to_string(),
                }
            }
        };
        self.enter(next);
        self.status()
    }

    /// `complete/error --reset--> idle`. Returns false when there was
    /// nothing to reset.
    pub fn reset(&mut self) -> bool {
        match self.state {
            SessionState::Complete(_) | SessionState::Error { .. } => {
                self.enter(SessionState::Idle);
                true
            }
            SessionState::Idle | SessionState::Analyzing => false,
        }
    }

    /// Submit, run the analyzer once and resolve.
    pub async fn run<B>(
        &mut self,
        analyzer: &Analyzer<B>,
        text: &str,
        acknowledged: bool,
    ) -> Result<AnalysisStatus, SubmitRejected>
    where
        B: ModelBackend + ?Sized,
    {
        let submission = self.submit(text, acknowledged)?;
        let outcome = analyzer.analyze(submission.text()).await;
        Ok(self.resolve(submission, outcome))
    }

    /// Run the submit guards without changing state.
    pub fn check_submit(&self, text: &str, acknowledged: bool) -> Result<(), SubmitRejected> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Analyzing => return Err(SubmitRejected::Busy),
            SessionState::Complete(_) | SessionState::Error { .. } => {
                return Err(SubmitRejected::NotIdle)
            }
        }
        if text.trim().chars().count() <= MIN_DOCUMENT_CHARS {
            return Err(SubmitRejected::TooShort);
        }
        if !acknowledged {
            return Err(SubmitRejected::NotAcknowledged);
        }
        Ok(())
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = ?self.state.status(), to = ?next.status(), "session transition");
        self.transitions.push(next.status());
        self.state = next;
    }
}
