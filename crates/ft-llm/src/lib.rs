//! Claude API integration for the focus tracker.
//!
//! Scores how well the foreground window matches the user's task. The
//! [`AlignmentClassifier`] adapts the HTTP [`Client`] to the core
//! [`Classifier`] capability; without an API key it reports "not configured".

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ft_core::{AlignmentResult, AlignmentScore, ClassificationRequest, Classifier, ClassifyError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ALIGNMENT_MAX_TOKENS: u32 = 200;
const ALIGNMENT_TEMPERATURE: f32 = 0.0;

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const ALIGNMENT_SYSTEM_PROMPT: &str = r#"You are a focus alignment classifier for a desktop productivity tool. The tool tracks the user's active (foreground) window and asks you whether it aligns with their current task.

You will receive:
- Task: what the user is trying to accomplish
- Context (optional): hints from the user about relevant apps, websites, or keywords
- Application: the process name of the active window (e.g. "firefox", "code", "kitty")
- Title: the title bar text of the active window

RULES:
1. User-provided context is authoritative. If it mentions specific websites, apps, locations, or keywords, look for ANY connection in the window title, including abbreviations, codes, partial matches, or domain-specific shorthand.
2. Apply domain knowledge liberally. Window titles often use abbreviated forms or shorthand that relate to the task even when not an exact match.
3. When in doubt and context was provided, favor a higher score; the user knows their task better than you do.
4. For browsers (firefox, chromium, chrome, brave, opera), the title shows the current page. Infer meaning even if the site name is not shown.

Respond with valid JSON only: {"score": N, "reason": "brief explanation"}

Score guidelines (1-10):
- 9-10: directly executing the task, or on a resource explicitly mentioned in context
- 7-8: strongly supports the task (related tools, research, reference material)
- 5-6: possibly related but the connection is unclear
- 3-4: unlikely to be related
- 1-2: clearly off-task (entertainment, social media unrelated to work)"#;

/// LLM client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Claude API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();

        // Validate API key
        if api_key.is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        // Build HTTP client with timeout
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self { http, api_key })
    }

    /// Scores the alignment of a window with a task using the Claude API.
    pub async fn classify_alignment(
        &self,
        model: &str,
        input: &ClassificationRequest,
    ) -> Result<AlignmentResult, LlmError> {
        let request = MessageRequest {
            model: model.to_string(),
            max_tokens: ALIGNMENT_MAX_TOKENS,
            temperature: ALIGNMENT_TEMPERATURE,
            system: ALIGNMENT_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: build_alignment_message(input),
            }],
        };

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        let payload: MessageResponse = serde_json::from_str(&body)
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        let text = extract_text(payload.content)?;
        parse_alignment(&text)
    }
}

/// [`Classifier`] backed by the Claude API.
///
/// Holds no client when no API key is configured; every call then reports
/// [`ClassifyError::NotConfigured`] and scoring stays unknown.
#[derive(Debug, Clone)]
pub struct AlignmentClassifier {
    client: Option<Client>,
    model: String,
}

impl AlignmentClassifier {
    pub fn new(client: Option<Client>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Builds a classifier from an optional API key.
    ///
    /// A missing or blank key yields an unconfigured classifier rather than an error.
    pub fn from_api_key(api_key: Option<&str>, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = match api_key.map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => Some(Client::new(key)?),
            None => None,
        };
        Ok(Self::new(client, model))
    }

    pub const fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl Classifier for AlignmentClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<AlignmentResult, ClassifyError> {
        let Some(client) = &self.client else {
            return Err(ClassifyError::NotConfigured);
        };
        client
            .classify_alignment(&self.model, request)
            .await
            .map_err(ClassifyError::failed)
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: &'static str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

fn extract_text(blocks: Vec<ContentBlock>) -> Result<String, LlmError> {
    let mut pieces = Vec::new();
    for block in blocks {
        let ContentBlock::Text { text } = block;
        pieces.push(text);
    }
    let text = pieces.join("\n");
    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse(
            "missing text content".to_string(),
        ));
    }
    Ok(text)
}

fn parse_api_error(body: &str) -> Option<LlmError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| LlmError::Api {
            message: payload.error.message,
        })
}

fn build_alignment_message(input: &ClassificationRequest) -> String {
    let window = format!(
        "Current window: Application = {}, Title = {}",
        input.process_name, input.window_title
    );
    match input
        .task_context
        .as_deref()
        .filter(|hint| !hint.trim().is_empty())
    {
        Some(hint) => format!(
            "Task: {}\n\nContext provided by the user: {hint}\n\n{window}",
            input.task_description
        ),
        None => format!("Task: {}\n\n{window}", input.task_description),
    }
}

/// Parses `{"score": N, "reason": "..."}`, tolerating a surrounding code fence.
///
/// A missing score counts as 0 before clamping into 1..=10; a missing reason is empty.
fn parse_alignment(text: &str) -> Result<AlignmentResult, LlmError> {
    let json = strip_code_fence(text);
    let payload: Value =
        serde_json::from_str(json).map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
    let Value::Object(fields) = payload else {
        return Err(LlmError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    };

    let score = match fields.get("score") {
        None | Some(Value::Null) => 0,
        Some(value) => score_value(value).ok_or_else(|| {
            LlmError::InvalidResponse(format!("score is not a number: {value}"))
        })?,
    };
    let reason = fields
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(AlignmentResult {
        score: AlignmentScore::clamped(score),
        reason,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn score_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") on the opening line
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
