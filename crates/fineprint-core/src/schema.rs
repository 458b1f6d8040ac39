use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Risk level the model assigns to a single clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    High,
    Medium,
    Low,
    Safe,
}

/// Layout groups used by the dashboard columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityGroup {
    Concern,
    GoodStuff,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::High, Self::Medium, Self::Low, Self::Safe];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Safe => "SAFE",
        }
    }

    pub fn group(self) -> SeverityGroup {
        match self {
            Self::High | Self::Medium => SeverityGroup::Concern,
            Self::Low | Self::Safe => SeverityGroup::GoodStuff,
        }
    }

    /// Badge text shown on a risk card.
    pub fn card_label(self) -> &'static str {
        match self {
            Self::High => "Red Flag",
            Self::Medium => "Caution",
            Self::Low | Self::Safe => "Good Stuff",
        }
    }
}

/// Overall advice on whether the terms should be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Recommended,
    Acceptable,
    Caution,
    Avoid,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Self::Recommended,
        Self::Acceptable,
        Self::Caution,
        Self::Avoid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recommended => "RECOMMENDED",
            Self::Acceptable => "ACCEPTABLE",
            Self::Caution => "CAUTION",
            Self::Avoid => "AVOID",
        }
    }

    /// Headline shown next to the score gauge.
    pub fn label(self) -> &'static str {
        match self {
            Self::Recommended => "Safe to Use",
            Self::Acceptable => "Acceptable",
            Self::Caution => "Use with Caution",
            Self::Avoid => "DO NOT USE",
        }
    }
}

/// One flagged clause, translated into plain language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisItem {
    /// Display identity, assigned locally after parsing.
    pub id: String,
    pub original_text: String,
    pub simplified_translation: String,
    pub severity: Severity,
    pub category: String,
    pub explanation: String,
}

/// A completed analysis of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Safety score, 0 (predatory) to 100 (safest).
    pub score: u8,
    pub verdict: Verdict,
    pub recommendation: String,
    pub summary: String,
    /// Clauses in the order the model returned them.
    pub items: Vec<AnalysisItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

/// Clause as emitted by the model, before an identifier is attached.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelItem {
    pub original_text: String,
    pub simplified_translation: String,
    pub severity: Severity,
    pub category: String,
    pub explanation: String,
}

/// Wire contract of the model reply. Unknown enum members and missing
/// required fields fail deserialization; range and emptiness checks live in
/// [`ModelAnalysis::validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnalysis {
    pub score: i64,
    pub verdict: Verdict,
    pub recommendation: String,
    pub summary: String,
    pub items: Vec<ModelItem>,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl ModelAnalysis {
    /// Check the constraints serde cannot express and convert into a result,
    /// naming each item through `make_id(index)`.
    pub fn validate<F>(self, mut make_id: F) -> Result<AnalysisResult, SchemaViolation>
    where
        F: FnMut(usize) -> String,
    {
        let score = u8::try_from(self.score)
            .ok()
            .filter(|score| *score <= 100)
            .ok_or(SchemaViolation::ScoreOutOfRange(self.score))?;

        let mut items = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.into_iter().enumerate() {
            item.check_non_empty(index)?;
            items.push(AnalysisItem {
                id: make_id(index),
                original_text: item.original_text,
                simplified_translation: item.simplified_translation,
                severity: item.severity,
                category: item.category,
                explanation: item.explanation,
            });
        }

        let company_name = self
            .company_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(AnalysisResult {
            score,
            verdict: self.verdict,
            recommendation: self.recommendation,
            summary: self.summary,
            items,
            company_name,
        })
    }
}

impl ModelItem {
    fn check_non_empty(&self, index: usize) -> Result<(), SchemaViolation> {
        let fields = [
            ("originalText", &self.original_text),
            ("simplifiedTranslation", &self.simplified_translation),
            ("category", &self.category),
            ("explanation", &self.explanation),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(SchemaViolation::EmptyItemField { index, field });
            }
        }
        Ok(())
    }
}

/// Constraint failures detected after the reply deserialized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("score must be within 0..=100 (got {0})")]
    ScoreOutOfRange(i64),
    #[error("item {index} has an empty `{field}`")]
    EmptyItemField { index: usize, field: &'static str },
}

/// Structured-output schema handed to the model, in plain JSON Schema
/// dialect. Backends translate it to their provider's flavour.
pub fn response_schema() -> Value {
    let severities: Vec<_> = Severity::ALL.iter().map(|s| s.as_str()).collect();
    let verdicts: Vec<_> = Verdict::ALL.iter().map(|v| v.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "score": {
                "type": "integer",
                "description": "A safety score from 0 to 100. 100 is extremely safe/user-friendly, 0 is predatory."
            },
            "verdict": {
                "type": "string",
                "enum": verdicts,
                "description": "Final verdict on whether the user should accept these terms."
            },
            "recommendation": {
                "type": "string",
                "description": "A definitive yes/no style directive, e.g. 'Safe to use', 'Use with extreme caution', 'Do not agree'."
            },
            "summary": {
                "type": "string",
                "description": "A short, punchy summary of the terms. Mention the biggest red flag or green flag."
            },
            "companyName": {
                "type": "string",
                "description": "The name of the company or service inferred from the text."
            },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "originalText": {
                            "type": "string",
                            "description": "The exact short excerpt from the text that contains the issue."
                        },
                        "simplifiedTranslation": {
                            "type": "string",
                            "description": "A plain English translation of what this actually means for the user."
                        },
                        "severity": {
                            "type": "string",
                            "enum": severities,
                            "description": "The risk level of this clause."
                        },
                        "category": {
                            "type": "string",
                            "description": "Category of the issue, e.g. 'Privacy', 'Billing', 'Liability', 'Content Ownership'."
                        },
                        "explanation": {
                            "type": "string",
                            "description": "Why this is good or bad."
                        }
                    },
                    "required": ["originalText", "simplifiedTranslation", "severity", "category", "explanation"]
                }
            }
        },
        "required": ["score", "verdict", "recommendation", "summary", "items"]
    })
}
