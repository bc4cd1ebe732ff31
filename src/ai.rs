//! Optional generative-AI pass over a finished explanation.
//!
//! The pass is time-boxed and can never fail a request: every outcome maps to an
//! [`AiStatus`] and the pre-AI explanation is kept on anything but success.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::format::{SUI_SHORT, short_address};
use crate::models::{AiStatus, EnhancedExplanation, Explanation};

const MODEL_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const PREFERRED_MODELS: &[&str] = &[
    "gemini-1.0-pro",
    "gemini-1.5-pro",
    "gemini-pro",
    "gemini-1.5-flash",
    "gemini-1.0-pro-latest",
];
const FALLBACK_MODELS: &[&str] = &["gemini-1.0-pro", "gemini-pro", "gemini-1.5-pro"];

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI enhancement timeout")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("no Gemini model available")]
    NoModel,

    #[error("malformed model reply: {0}")]
    Malformed(String),
}

/// What a successful enhancement adds on top of the explanation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enhancement {
    pub summary: String,
    pub insights: Vec<String>,
    pub risks: Vec<String>,
}

#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, explanation: &Explanation) -> Result<Enhancement, AiError>;
}

/// Runs the enhancer under `budget` and folds the outcome into the response shape.
pub async fn enhance_with_budget(
    enhancer: Option<&dyn Enhancer>,
    use_ai: bool,
    explanation: Explanation,
    budget: Duration,
) -> EnhancedExplanation {
    let enhancer = match (use_ai, enhancer) {
        (false, _) => {
            return degraded(
                explanation,
                AiStatus::Disabled,
                "AI enhancement disabled by user. Using default explanation.".to_string(),
            );
        }
        (true, None) => {
            return degraded(
                explanation,
                AiStatus::NoKey,
                "AI enhancement disabled: No API key configured. Using default explanation."
                    .to_string(),
            );
        }
        (true, Some(enhancer)) => enhancer,
    };

    // Dropping the future on deadline abandons any in-flight model call
    let outcome = match tokio::time::timeout(budget, enhancer.enhance(&explanation)).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout),
    };

    match outcome {
        Ok(enhancement) => {
            info!("AI enhancement successful");
            let mut explanation = explanation;
            if !enhancement.summary.trim().is_empty() {
                explanation.summary = enhancement.summary;
            }
            EnhancedExplanation {
                explanation,
                ai_enhanced: true,
                ai_insights: enhancement.insights,
                ai_risks: enhancement.risks,
                ai_status: AiStatus::Enabled,
                ai_status_message: "AI enhancement successful".to_string(),
            }
        }
        Err(AiError::Timeout) => {
            warn!(budget_secs = budget.as_secs_f64(), "AI enhancement timed out, using default explanation");
            degraded(
                explanation,
                AiStatus::Timeout,
                "AI enhancement timed out (request took too long). Using default explanation."
                    .to_string(),
            )
        }
        Err(e) => {
            warn!("AI enhancement failed, using default explanation: {}", e);
            degraded(
                explanation,
                AiStatus::Error,
                format!("AI enhancement failed: {}. Using default explanation.", e),
            )
        }
    }
}

fn degraded(explanation: Explanation, status: AiStatus, message: String) -> EnhancedExplanation {
    EnhancedExplanation {
        explanation,
        ai_enhanced: false,
        ai_insights: Vec::new(),
        ai_risks: Vec::new(),
        ai_status: status,
        ai_status_message: message,
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Analysis {
    #[serde(default)]
    insights: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
}

/// Gemini over its REST API.
pub struct GeminiEnhancer {
    http: Client,
    base_url: String,
    api_key: String,
    models: RwLock<Option<(Instant, Vec<String>)>>,
}

impl GeminiEnhancer {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        GeminiEnhancer {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            models: RwLock::new(None),
        }
    }

    /// Candidate models, preferred ones first. Cached for five minutes.
    pub async fn available_models(&self) -> Vec<String> {
        if let Some((fetched, models)) = self.models.read().await.as_ref() {
            if fetched.elapsed() < MODEL_CACHE_TTL {
                return models.clone();
            }
        }

        let models = match self.discover().await {
            Ok(found) if !found.is_empty() => rank_models(found),
            Ok(_) => {
                debug!("Model list had no usable Gemini models");
                rank_models(vec!["gemini-1.0-pro".to_string(), "gemini-pro".to_string()])
            }
            Err(e) => {
                warn!("Failed to list Gemini models, using fallback list: {}", e);
                return FALLBACK_MODELS.iter().map(|m| m.to_string()).collect();
            }
        };

        info!(count = models.len(), "Discovered Gemini models");
        *self.models.write().await = Some((Instant::now(), models.clone()));
        models
    }

    async fn discover(&self) -> Result<Vec<String>, AiError> {
        let list: ModelList = self
            .http
            .get(format!("{}/models", self.base_url))
            .query(&[("key", &self.api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(list
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .filter(|name| name.starts_with("gemini"))
            .collect())
    }

    async fn generate_with(&self, model: &str, prompt: &str) -> Result<String, AiError> {
        let body: Value = self
            .http
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .query(&[("key", &self.api_key)])
            .json(&json!({"contents": [{"parts": [{"text": prompt}]}]}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let parts = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| AiError::Malformed("reply has no candidates".to_string()))?;
        Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .concat())
    }

    /// Tries each model in order until one answers.
    pub async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        for model in self.available_models().await {
            match self.generate_with(&model, prompt).await {
                Ok(text) => {
                    debug!(%model, "Gemini model answered");
                    return Ok(text);
                }
                Err(e) => debug!(%model, "Gemini model failed: {}", e),
            }
        }
        Err(AiError::NoModel)
    }
}

#[async_trait]
impl Enhancer for GeminiEnhancer {
    async fn enhance(&self, explanation: &Explanation) -> Result<Enhancement, AiError> {
        let (rewrite_prompt, analysis_prompt) =
            (rewrite_prompt(explanation), analysis_prompt(explanation));
        let (rewrite, analysis) = futures::try_join!(
            self.generate(&rewrite_prompt),
            self.generate(&analysis_prompt),
        )?;
        let analysis = parse_analysis(&analysis);

        Ok(Enhancement {
            summary: rewrite.trim().to_string(),
            insights: analysis.insights,
            risks: analysis.risks,
        })
    }
}

// Preferred models in preference order, then the rest as discovered
fn rank_models(found: Vec<String>) -> Vec<String> {
    let mut ranked: Vec<String> = PREFERRED_MODELS
        .iter()
        .filter(|p| found.iter().any(|m| m == *p))
        .map(|p| p.to_string())
        .collect();
    ranked.extend(
        found
            .into_iter()
            .filter(|m| !PREFERRED_MODELS.contains(&m.as_str())),
    );
    ranked
}

// First {...} block in the reply; anything unparsable yields no insights
fn parse_analysis(reply: &str) -> Analysis {
    JSON_BLOCK
        .find(reply)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
        .unwrap_or_default()
}

fn rewrite_prompt(explanation: &Explanation) -> String {
    let accounts: Vec<String> = explanation
        .involved_addresses
        .iter()
        .take(10)
        .map(|address| match explanation.account_names.get(address) {
            Some(name) => format!("{} ({})", name, address),
            None => short_address(address, SUI_SHORT),
        })
        .collect();
    let accounts = if accounts.is_empty() {
        "No account names available - use addresses directly from transaction data".to_string()
    } else {
        accounts.join("\n")
    };

    let mut functions = String::new();
    if !explanation.move_calls.is_empty() {
        let calls: Vec<String> = explanation
            .move_calls
            .iter()
            .take(5)
            .map(|c| format!("{}::{}", c.module, c.function))
            .collect();
        functions = format!(
            "- Functions Called: {}{}\n",
            calls.join(", "),
            if explanation.move_calls.len() > 5 { " and more" } else { "" }
        );
    }

    let mut actions: Vec<String> = explanation
        .actions
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a.description))
        .collect();
    if explanation.actions.len() > 10 {
        actions.push(format!("... and {} more actions", explanation.actions.len() - 10));
    }

    format!(
        "You explain blockchain transactions in simple, friendly language for people who are not technical.

Rules:
1. Use the exact account names or addresses from the transaction data below.
2. If an entry reads \"Name (0x1234...)\", refer to it as \"Name\".
3. If an entry reads \"0x1234...5678 (account name not available)\", use the address \"0x1234...5678\".
4. Never invent names or use vague references such as \"someone\".

Transaction data:
{summary}

Accounts:
{accounts}

Technical details:
- Gas Used: {gas}
- Objects Created: {created}
- Objects Transferred: {transferred}
- Objects Mutated: {mutated}
{functions}
Actions:
{actions}

Write 2-4 sentences saying what type of transaction this was and what happened, mentioning amounts and participants where relevant. Avoid jargon such as \"mutated\" or \"Move calls\".",
        summary = explanation.summary,
        accounts = accounts,
        gas = explanation.total_gas_cost,
        created = explanation.objects_created,
        transferred = explanation.objects_transferred,
        mutated = explanation.objects_mutated,
        functions = functions,
        actions = actions.join("\n"),
    )
}

fn analysis_prompt(explanation: &Explanation) -> String {
    let calls: Vec<String> = explanation
        .move_calls
        .iter()
        .map(|c| format!("{}::{}::{}", c.package, c.module, c.function))
        .collect();
    format!(
        "Analyze this blockchain transaction and provide:

1. A clear summary (2-3 sentences)
2. Key insights
3. Potential risks or concerns (if any)

Transaction data:
- Summary: {}
- Gas: {}
- Objects Created: {}
- Objects Transferred: {}
- Move Calls: {}

Respond in JSON format:
{{
  \"summary\": \"clear explanation\",
  \"insights\": [\"insight 1\", \"insight 2\"],
  \"risks\": [\"risk 1 if any\"]
}}",
        explanation.summary,
        explanation.total_gas_cost,
        explanation.objects_created,
        explanation.objects_transferred,
        if calls.is_empty() { "None".to_string() } else { calls.join(", ") },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Enhancement, ()>);

    #[async_trait]
    impl Enhancer for Fixed {
        async fn enhance(&self, _: &Explanation) -> Result<Enhancement, AiError> {
            self.0.clone().map_err(|_| AiError::NoModel)
        }
    }

    fn explanation() -> Explanation {
        Explanation {
            summary: "Alice transferred 1 SUI to Bob".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn opted_out_is_disabled() {
        let out = enhance_with_budget(None, false, explanation(), Duration::from_secs(1)).await;
        assert_eq!(out.ai_status, AiStatus::Disabled);
        assert!(!out.ai_enhanced);
        assert_eq!(
            out.ai_status_message,
            "AI enhancement disabled by user. Using default explanation."
        );
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let out = enhance_with_budget(None, true, explanation(), Duration::from_secs(1)).await;
        assert_eq!(out.ai_status, AiStatus::NoKey);
        assert_eq!(out.explanation.summary, "Alice transferred 1 SUI to Bob");
    }

    #[tokio::test]
    async fn success_replaces_summary() {
        let enhancer = Fixed(Ok(Enhancement {
            summary: "Alice paid Bob.".to_string(),
            insights: vec!["simple payment".to_string()],
            risks: Vec::new(),
        }));
        let out =
            enhance_with_budget(Some(&enhancer), true, explanation(), Duration::from_secs(1)).await;
        assert_eq!(out.ai_status, AiStatus::Enabled);
        assert!(out.ai_enhanced);
        assert_eq!(out.explanation.summary, "Alice paid Bob.");
        assert_eq!(out.ai_insights, vec!["simple payment".to_string()]);
    }

    #[tokio::test]
    async fn blank_rewrite_keeps_generated_summary() {
        let enhancer = Fixed(Ok(Enhancement::default()));
        let out =
            enhance_with_budget(Some(&enhancer), true, explanation(), Duration::from_secs(1)).await;
        assert!(out.ai_enhanced);
        assert_eq!(out.explanation.summary, "Alice transferred 1 SUI to Bob");
    }

    #[tokio::test]
    async fn failure_is_an_error_status() {
        let enhancer = Fixed(Err(()));
        let out =
            enhance_with_budget(Some(&enhancer), true, explanation(), Duration::from_secs(1)).await;
        assert_eq!(out.ai_status, AiStatus::Error);
        assert_eq!(
            out.ai_status_message,
            "AI enhancement failed: no Gemini model available. Using default explanation."
        );
    }

    #[test]
    fn preferred_models_rank_first() {
        let found = vec![
            "gemini-2.0-flash".to_string(),
            "gemini-1.5-flash".to_string(),
            "gemini-pro".to_string(),
        ];
        assert_eq!(
            rank_models(found),
            vec!["gemini-pro", "gemini-1.5-flash", "gemini-2.0-flash"]
        );
    }

    #[test]
    fn analysis_is_pulled_out_of_chatter() {
        let reply = "Sure! Here you go:\n```json\n{\"summary\": \"s\", \"insights\": [\"a\"], \"risks\": [\"b\"]}\n```";
        let analysis = parse_analysis(reply);
        assert_eq!(analysis.insights, vec!["a"]);
        assert_eq!(analysis.risks, vec!["b"]);

        let none = parse_analysis("I cannot answer in JSON.");
        assert!(none.insights.is_empty() && none.risks.is_empty());
    }

    #[test]
    fn rewrite_prompt_prefers_names() {
        let mut e = explanation();
        e.involved_addresses = vec![
            "0xaaaa000000000000000000000000000000000000000000000000000000000001".to_string(),
            "0xbbbb000000000000000000000000000000000000000000000000000000000002".to_string(),
        ];
        e.account_names.insert(e.involved_addresses[0].clone(), "Alice");
        let prompt = rewrite_prompt(&e);
        assert!(prompt.contains("Alice (0xaaaa000000000000000000000000000000000000000000000000000000000001)"));
        assert!(prompt.contains("0xbbbb...0002"));
    }
}
