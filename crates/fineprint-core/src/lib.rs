pub mod analyzer;
pub mod llm;
pub mod report;
pub mod schema;
pub mod session;

pub use analyzer::{AnalysisError, Analyzer, MAX_DOCUMENT_CHARS, MIN_DOCUMENT_CHARS};
pub use llm::{build_backend, GenerationRequest, LlmSettings, ModelBackend, ProviderKind};
pub use report::{render_session, CardExpansion, OutputFormat, RenderOptions, RiskBuckets};
pub use schema::{AnalysisItem, AnalysisResult, Severity, Verdict};
pub use session::{AnalysisStatus, Session, SessionState, SubmitRejected};
