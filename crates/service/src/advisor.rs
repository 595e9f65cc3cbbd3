//! Advisory security analysis.
//!
//! A [`SecurityAdvisor`] receives the finalized symbol table and returns
//! findings. The bundled [`LlmAdvisor`] asks a language model through the
//! [`LlmClient`] trait; its output is free text and is parsed leniently.

use crate::error::{AdvisorError, LlmError};
use async_trait::async_trait;
use rpl_core::pass3_emit;
use rpl_core::{Finding, SymbolTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Analyze a compiled policy for security risks.
#[async_trait]
pub trait SecurityAdvisor: Send + Sync {
    async fn analyze(&self, table: &SymbolTable) -> Result<Vec<Finding>, AdvisorError>;
}

/// A message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for calling an LLM to get a text completion.
///
/// Implementations handle the specifics of the provider API. The advisor
/// handles prompt construction and response parsing.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: Vec<Message>, model: &str) -> Result<String, LlmError>;
}

const SYSTEM_PROMPT: &str = r#"You are a static security analyzer for RPL, a role and policy language.
You receive a compiled policy as JSON: roles with their permission blocks and parents,
users with their effective roles and validity periods, resources, groups, and the
flattened ALLOW/DENY policies with source line numbers.

Respond only with a JSON array. Each element must have exactly these fields:
  "line":           source line number of the issue, or 0 if not applicable
  "risk_score":     integer from 1 (informational) to 10 (critical)
  "category":       short category name
  "description":    what is wrong
  "recommendation": how to fix it
Respond with [] if there are no issues. Do not include markdown fences or other text."#;

/// Advisor backed by a language model.
pub struct LlmAdvisor {
    pub client: Box<dyn LlmClient>,
    pub model: String,
    /// System prompt override. If empty, the default prompt is used.
    pub system_prompt: String,
}

impl LlmAdvisor {
    pub fn new(client: Box<dyn LlmClient>, model: impl Into<String>) -> Self {
        LlmAdvisor {
            client,
            model: model.into(),
            system_prompt: String::new(),
        }
    }

    fn build_user_message(table: &SymbolTable) -> String {
        format!(
            r#"Analyze the following access control policy for security risks:

{policy}

Please identify:
1. Overly Permissive Policies
2. Privilege Escalation Risks
3. Logical Contradictions
4. Least Privilege Violations
5. Missing Restrictions
6. Temporal Vulnerabilities"#,
            policy = pass3_emit::emit_string(table)
        )
    }
}

#[async_trait]
impl SecurityAdvisor for LlmAdvisor {
    async fn analyze(&self, table: &SymbolTable) -> Result<Vec<Finding>, AdvisorError> {
        let system_prompt = if self.system_prompt.is_empty() {
            SYSTEM_PROMPT.to_string()
        } else {
            self.system_prompt.clone()
        };
        let messages = vec![
            Message::system(system_prompt),
            Message::user(Self::build_user_message(table)),
        ];
        let response = self.client.complete(messages, &self.model).await?;
        let findings = parse_findings(&response);
        debug!(event = "Advisory", phase = "Parsed", model = %self.model, findings = findings.len());
        Ok(findings)
    }
}

/// Strip markdown code fences if present.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    // Handle ```json ... ``` or ``` ... ```
    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }

    trimmed
}

/// Lenient shape of one finding as the model writes it.
#[derive(Deserialize)]
struct RawFinding {
    #[serde(default)]
    line: Option<serde_json::Value>,
    #[serde(default, alias = "risk")]
    risk_score: Option<serde_json::Value>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    recommendation: String,
}

fn as_number(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a model response into findings. Scores are clamped to 1..=10.
///
/// A response that is not a JSON array of findings yields a single
/// "Analysis Error" finding carrying the raw text.
pub fn parse_findings(response: &str) -> Vec<Finding> {
    let body = strip_code_fences(response);
    match serde_json::from_str::<Vec<RawFinding>>(body) {
        Ok(raw) => raw
            .into_iter()
            .map(|f| Finding {
                line: as_number(f.line.as_ref())
                    .filter(|n| *n >= 0.0)
                    .map(|n| n as u32)
                    .unwrap_or(0),
                risk_score: as_number(f.risk_score.as_ref())
                    .map(|n| n.round().clamp(1.0, 10.0) as u8)
                    .unwrap_or(5),
                category: f.category.unwrap_or_else(|| "General".to_string()),
                description: f.description,
                recommendation: f.recommendation,
                raw_output: None,
            })
            .collect(),
        Err(e) => {
            warn!(event = "Advisory", phase = "Unparseable", error = %e);
            vec![Finding {
                line: 0,
                risk_score: 5,
                category: "Analysis Error".to_string(),
                description: "Could not parse structured response".to_string(),
                recommendation: "Review raw LLM output".to_string(),
                raw_output: Some(response.to_string()),
            }]
        }
    }
}
