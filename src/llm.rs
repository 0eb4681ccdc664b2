//! Blocking LLM client: the trait, the real Gemini-backed implementation,
//! and a scripted double for tests.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Model used for the cheap, high-volume passes (config extraction,
/// comparison, context summaries).
pub const FLASH_MODEL: &str = "gemini-2.0-flash";
/// Model used for the heavyweight passes (generation, repair, merge).
pub const REASONING_MODEL: &str = "gemini-2.5-flash-preview-04-17";

/// Environment variable holding the API key for the real client.
pub const API_KEY_ENV: &str = "AUTOFORGE_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Server-side failure (5xx) or throttling (429). Worth retrying.
    #[error("model API server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Transport failure before we got a response.
    #[error("model API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered but the request itself was rejected.
    #[error("model API rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// A 2xx response that did not carry any generated text.
    #[error("model response missing content: {0}")]
    MissingContent(String),

    /// The scripted client ran out of queued responses.
    #[error("no scripted response left (call #{0})")]
    ScriptExhausted(usize),
}

impl LlmError {
    /// Whether the caller-side retry policy should try again.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Server { .. } => true,
            LlmError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// A blocking text-completion endpoint. One prompt in, one response out.
pub trait LlmClient {
    fn complete(&self, prompt: &str, model: &str) -> Result<String, LlmError>;
}

// --- Gemini REST payloads ---

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize, Debug)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: String,
}

/// Client for the Google generative-language REST API.
pub struct GeminiClient {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        GeminiClient {
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Build a client from [`API_KEY_ENV`].
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV).ok().map(GeminiClient::new)
    }
}

impl LlmClient for GeminiClient {
    fn complete(&self, prompt: &str, model: &str) -> Result<String, LlmError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        let payload = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
                role: Some("user".to_string()),
            }],
        };

        let response = self
            .client
            .post(&url)
            // Generation calls on the large model can run for minutes.
            .timeout(Duration::from_secs(600))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let code = status.as_u16();
            if code == 429 || status.is_server_error() {
                return Err(LlmError::Server { status: code, body });
            }
            return Err(LlmError::Rejected { status: code, body });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::MissingContent(format!("unparseable body: {}", e)))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| LlmError::MissingContent("no candidates in response".to_string()))?;

        Ok(text)
    }
}

/// Test double that replays queued responses in order, ignoring the
/// prompt. An `Err` entry simulates a failed call.
pub struct ScriptedClient {
    responses: RefCell<Vec<Result<String, String>>>,
    next: Cell<usize>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        ScriptedClient {
            responses: RefCell::new(Vec::new()),
            next: Cell::new(0),
        }
    }

    pub fn push_ok(&self, response: impl Into<String>) {
        self.responses.borrow_mut().push(Ok(response.into()));
    }

    pub fn push_err(&self, message: impl Into<String>) {
        self.responses.borrow_mut().push(Err(message.into()));
    }

    /// How many completions have been served so far.
    pub fn calls(&self) -> usize {
        self.next.get()
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for ScriptedClient {
    fn complete(&self, _prompt: &str, _model: &str) -> Result<String, LlmError> {
        let index = self.next.get();
        self.next.set(index + 1);

        match self.responses.borrow().get(index) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(LlmError::Rejected {
                status: 400,
                body: message.clone(),
            }),
            None => Err(LlmError::ScriptExhausted(index + 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_client_replays_in_order() {
        let client = ScriptedClient::new();
        client.push_ok("first");
        client.push_ok("second");

        assert_eq!(client.complete("a", FLASH_MODEL).unwrap(), "first");
        assert_eq!(client.complete("b", FLASH_MODEL).unwrap(), "second");
        assert_eq!(client.calls(), 2);
    }

    #[test]
    fn test_scripted_client_exhaustion() {
        let client = ScriptedClient::new();
        let err = client.complete("a", FLASH_MODEL).unwrap_err();
        assert!(matches!(err, LlmError::ScriptExhausted(1)));
    }

    #[test]
    fn test_scripted_error_is_not_transient() {
        let client = ScriptedClient::new();
        client.push_err("malformed request");
        let err = client.complete("a", FLASH_MODEL).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = LlmError::Server {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert!(err.is_transient());

        let err = LlmError::Rejected {
            status: 401,
            body: "bad key".to_string(),
        };
        assert!(!err.is_transient());
    }
}
