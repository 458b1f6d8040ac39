use std::fmt::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::analyzer::MAX_DOCUMENT_CHARS;
use crate::schema::{AnalysisItem, AnalysisResult, Severity, SeverityGroup, Verdict};
use crate::session::{AnalysisStatus, SessionState};

/// Format styles supported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

const DISCLAIMER: &str = "Not legal advice. This tool uses AI to summarize text and may make mistakes. Always consult a qualified attorney for serious matters.";

/// Items split into dashboard columns, borrowing from the result so the
/// original order stays untouched.
#[derive(Debug, Default)]
pub struct RiskBuckets<'a> {
    pub high: Vec<&'a AnalysisItem>,
    pub medium: Vec<&'a AnalysisItem>,
    pub good: Vec<&'a AnalysisItem>,
}

impl<'a> RiskBuckets<'a> {
    pub fn from_result(result: &'a AnalysisResult) -> Self {
        let mut buckets = Self::default();
        for item in &result.items {
            match (item.severity.group(), item.severity) {
                (SeverityGroup::GoodStuff, _) => buckets.good.push(item),
                (SeverityGroup::Concern, Severity::High) => buckets.high.push(item),
                (SeverityGroup::Concern, _) => buckets.medium.push(item),
            }
        }
        buckets
    }

    /// High items first, then medium.
    pub fn concerns(&self) -> impl Iterator<Item = &'a AnalysisItem> + '_ {
        self.high.iter().chain(self.medium.iter()).copied()
    }

    pub fn concern_count(&self) -> usize {
        self.high.len() + self.medium.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concern_count() == 0 && self.good.is_empty()
    }
}

/// Gauge colour band for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    Safe,
    Caution,
    Danger,
}

impl ScoreBand {
    pub fn from_score(score: u8) -> Self {
        if score < 50 {
            Self::Danger
        } else if score < 80 {
            Self::Caution
        } else {
            Self::Safe
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Safe => "Safe",
            Self::Caution => "Caution",
            Self::Danger => "Danger",
        }
    }
}

/// Which risk card, if any, is showing its details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardExpansion {
    expanded: Option<String>,
}

impl CardExpansion {
    pub fn expanded(id: impl Into<String>) -> Self {
        Self {
            expanded: Some(id.into()),
        }
    }

    /// Expand `id`, collapsing any other card; collapse it if already open.
    pub fn toggle(&mut self, id: &str) {
        if self.is_expanded(id) {
            self.expanded = None;
        } else {
            self.expanded = Some(id.to_string());
        }
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.as_deref() == Some(id)
    }
}

/// Knobs for the human renderer.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub expansion: CardExpansion,
    /// Show details for every card regardless of `expansion`.
    pub expand_all: bool,
}

impl RenderOptions {
    fn shows_details(&self, item: &AnalysisItem) -> bool {
        self.expand_all || self.expansion.is_expanded(&item.id)
    }
}

/// Render the view for the current session state.
pub fn render_session(
    state: &SessionState,
    options: &RenderOptions,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(state, options),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonView::from(state))?),
    }
}

fn render_human(state: &SessionState, options: &RenderOptions) -> anyhow::Result<String> {
    let mut out = String::new();
    match state {
        SessionState::Idle => {
            writeln!(out, "{}", "Don't click \"Agree\" until you know the truth.".bold())?;
            writeln!(
                out,
                "Paste a Terms of Service or privacy policy to flag data selling, hidden fees and rights waivers."
            )?;
            writeln!(
                out,
                "Documents longer than {MAX_DOCUMENT_CHARS} characters are analyzed only up to that length."
            )?;
        }
        SessionState::Analyzing => {
            writeln!(out, "{}", "Reading the Fine Print...".bold())?;
            writeln!(out, "Scanning for traps.")?;
        }
        SessionState::Error { message } => {
            writeln!(out, "{}", message.red())?;
            writeln!(out, "Reset and try again.")?;
        }
        SessionState::Complete(result) => render_dashboard(&mut out, result, options)?,
    }
    writeln!(out)?;
    writeln!(out, "{}", DISCLAIMER.dimmed())?;
    Ok(out)
}

fn render_dashboard(
    out: &mut String,
    result: &AnalysisResult,
    options: &RenderOptions,
) -> anyhow::Result<()> {
    let band = ScoreBand::from_score(result.score);
    writeln!(
        out,
        "Safety Score: {} {}/100 ({})",
        gauge(result.score),
        result.score,
        band_colored(band)
    )?;
    if let Some(company) = &result.company_name {
        writeln!(out, "Company: {}", company)?;
    }
    writeln!(out, "Verdict: {}", verdict_colored(result.verdict))?;
    writeln!(out)?;
    writeln!(out, "{}", result.recommendation.bold())?;
    writeln!(out, "{}", result.summary)?;

    let buckets = RiskBuckets::from_result(result);
    writeln!(
        out,
        "\n{} critical • {} warnings • {} good signs",
        buckets.high.len(),
        buckets.medium.len(),
        buckets.good.len()
    )?;

    writeln!(out, "\n{}", "Red Flags & Concerns".bold())?;
    if buckets.concern_count() == 0 {
        writeln!(out, "  No major issues found!")?;
    }
    for item in buckets.concerns() {
        render_card(out, item, options)?;
    }

    writeln!(out, "\n{}", "Good Stuff & Notes".bold())?;
    if buckets.good.is_empty() {
        writeln!(out, "  No specific positive clauses highlighted.")?;
    }
    for item in &buckets.good {
        render_card(out, item, options)?;
    }
    Ok(())
}

fn render_card(out: &mut String, item: &AnalysisItem, options: &RenderOptions) -> anyhow::Result<()> {
    writeln!(
        out,
        "  [{}] {} ({}) #{}",
        severity_colored(item.severity),
        item.simplified_translation,
        item.category,
        item.id
    )?;
    if options.shows_details(item) {
        writeln!(out, "      Original: \"{}\"", single_line(&item.original_text))?;
        writeln!(out, "      Why it matters: {}", single_line(&item.explanation))?;
    }
    Ok(())
}

fn gauge(score: u8) -> String {
    let filled = usize::from(score.min(100)) / 10;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(10 - filled))
}

fn band_colored(band: ScoreBand) -> ColoredString {
    match band {
        ScoreBand::Safe => band.label().green(),
        ScoreBand::Caution => band.label().yellow(),
        ScoreBand::Danger => band.label().red(),
    }
}

fn verdict_colored(verdict: Verdict) -> ColoredString {
    match verdict {
        Verdict::Recommended => verdict.label().green().bold(),
        Verdict::Acceptable => verdict.label().blue().bold(),
        Verdict::Caution => verdict.label().yellow().bold(),
        Verdict::Avoid => verdict.label().red().bold(),
    }
}

fn severity_colored(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => severity.card_label().red(),
        Severity::Medium => severity.card_label().yellow(),
        Severity::Low | Severity::Safe => severity.card_label().green(),
    }
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct JsonView<'a> {
    status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_band: Option<ScoreBand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buckets: Option<BucketIds<'a>>,
}

#[derive(Debug, Serialize)]
struct BucketIds<'a> {
    high: Vec<&'a str>,
    medium: Vec<&'a str>,
    good: Vec<&'a str>,
}

impl<'a> From<&RiskBuckets<'a>> for BucketIds<'a> {
    fn from(buckets: &RiskBuckets<'a>) -> Self {
        let ids = |items: &[&'a AnalysisItem]| -> Vec<&'a str> {
            items.iter().map(|i| i.id.as_str()).collect()
        };
        Self {
            high: ids(&buckets.high),
            medium: ids(&buckets.medium),
            good: ids(&buckets.good),
        }
    }
}

impl<'a> From<&'a SessionState> for JsonView<'a> {
    fn from(state: &'a SessionState) -> Self {
        let result = state.result();
        Self {
            status: state.status(),
            message: state.error_message(),
            result,
            score_band: result.map(|r| ScoreBand::from_score(r.score)),
            buckets: result.map(|r| BucketIds::from(&RiskBuckets::from_result(r))),
        }
    }
}
