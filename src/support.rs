//! Customer support assistant built on an external completion provider.
//!
//! The provider is only a contract here; callers plug in their own client.
//! Customer text is redacted before it leaves the process and provider
//! failures never reach the customer as raw errors.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

// Checked before PHONE so long digit runs are reported as cards.
static CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("card pattern is valid"));

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\d{3})[ .-]?\d{3}[ .-]?\d{4}\b")
        .expect("phone pattern is valid")
});

/// Errors a completion provider can report.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "RateLimited",
            ProviderError::Api { .. } => "Api",
            ProviderError::Unavailable(_) => "Unavailable",
        }
    }
}

/// Anything that turns a prompt into text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerTier {
    #[default]
    Standard,
    Premium,
    Enterprise,
}

impl CustomerTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerTier::Standard => "standard",
            CustomerTier::Premium => "premium",
            CustomerTier::Enterprise => "enterprise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportRequest {
    pub request_id: String,
    pub customer_message: String,
    #[serde(default)]
    pub customer_tier: CustomerTier,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportResponse {
    pub request_id: String,
    pub response_text: String,
    pub category: String,
    pub sentiment: String,
    pub requires_escalation: bool,
    pub confidence: f64,
    pub suggested_actions: Vec<String>,
    pub processing_time_ms: f64,
}

/// Shape the provider is asked to answer in. Every field is optional so a
/// partial answer still parses.
#[derive(Debug, Deserialize)]
struct ProviderAnswer {
    response: Option<String>,
    category: Option<String>,
    sentiment: Option<String>,
    requires_escalation: Option<bool>,
    confidence: Option<f64>,
    #[serde(default)]
    suggested_actions: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You are a helpful customer support assistant. \
Answer with ONLY valid JSON, no other text.\n\
Format: {\"response\": \"<reply to the customer>\", \"category\": \"<billing|technical|account|general>\", \
\"sentiment\": \"<positive|neutral|negative>\", \"requires_escalation\": <bool>, \
\"confidence\": <0.0-1.0>, \"suggested_actions\": [\"<action>\"]}";

const FALLBACK_REPLY: &str = "Thanks for reaching out. We could not process your request \
automatically, so a member of our support team will follow up shortly.";

/// Replace emails, card numbers and phone numbers with placeholders.
pub fn redact_pii(text: &str) -> String {
    let text = EMAIL.replace_all(text, "[EMAIL]");
    let text = CARD.replace_all(&text, "[CARD]");
    PHONE.replace_all(&text, "[PHONE]").into_owned()
}

pub struct SupportAssistant<P> {
    provider: P,
}

impl<P: CompletionProvider> SupportAssistant<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Answer a support request. Always produces a response; provider failures
    /// turn into an escalated fallback.
    pub async fn handle(&self, request: &SupportRequest) -> SupportResponse {
        let start = Instant::now();
        let prompt = build_prompt(request);

        let mut response = match self.provider.complete(&prompt, SYSTEM_PROMPT).await {
            Ok(text) => parse_answer(&request.request_id, &text),
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    error_kind = e.kind(),
                    "completion provider failed"
                );
                fallback(&request.request_id)
            }
        };

        // Critical requests from enterprise customers always reach a human.
        if request.urgency == Urgency::Critical && request.customer_tier == CustomerTier::Enterprise {
            response.requires_escalation = true;
        }
        response.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        response
    }
}

fn build_prompt(request: &SupportRequest) -> String {
    let mut prompt = format!(
        "Customer tier: {}\nUrgency: {}\nMessage: {}",
        request.customer_tier.as_str(),
        request.urgency.as_str(),
        redact_pii(&request.customer_message)
    );
    if !request.context.is_empty() {
        let context = Value::Object(request.context.clone()).to_string();
        prompt.push_str(&format!("\nContext: {}", redact_pii(&context)));
    }
    prompt
}

fn parse_answer(request_id: &str, text: &str) -> SupportResponse {
    let trimmed = text.trim();
    match serde_json::from_str::<ProviderAnswer>(trimmed) {
        Ok(answer) => SupportResponse {
            request_id: request_id.to_string(),
            response_text: answer.response.unwrap_or_else(|| FALLBACK_REPLY.to_string()),
            category: answer.category.unwrap_or_else(|| "general".to_string()),
            sentiment: answer.sentiment.unwrap_or_else(|| "neutral".to_string()),
            requires_escalation: answer.requires_escalation.unwrap_or(false),
            confidence: answer.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            suggested_actions: answer.suggested_actions,
            processing_time_ms: 0.0,
        },
        // Not JSON: use the text as the reply with low confidence.
        Err(_) => SupportResponse {
            request_id: request_id.to_string(),
            response_text: trimmed.to_string(),
            category: "general".to_string(),
            sentiment: "neutral".to_string(),
            requires_escalation: false,
            confidence: 0.3,
            suggested_actions: Vec::new(),
            processing_time_ms: 0.0,
        },
    }
}

fn fallback(request_id: &str) -> SupportResponse {
    SupportResponse {
        request_id: request_id.to_string(),
        response_text: FALLBACK_REPLY.to_string(),
        category: "general".to_string(),
        sentiment: "neutral".to_string(),
        requires_escalation: true,
        confidence: 0.0,
        suggested_actions: vec!["escalate_to_human".to_string()],
        processing_time_ms: 0.0,
    }
}
