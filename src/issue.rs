//! Fetches the change-request text from an issue tracker (Jira-style
//! REST API, basic auth).

use anyhow::Context;
use serde_json::Value;
use tracing::info;

/// Environment variables holding the tracker connection details.
pub const TRACKER_URL_ENV: &str = "TRACKER_URL";
pub const TRACKER_EMAIL_ENV: &str = "TRACKER_EMAIL";
pub const TRACKER_TOKEN_ENV: &str = "TRACKER_API_TOKEN";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub issue_key: String,
}

impl TrackerConfig {
    /// Read the connection details from the environment, reporting every
    /// missing variable at once.
    pub fn from_env(issue_key: &str) -> anyhow::Result<Self> {
        let base_url = std::env::var(TRACKER_URL_ENV).unwrap_or_default();
        let email = std::env::var(TRACKER_EMAIL_ENV).unwrap_or_default();
        let api_token = std::env::var(TRACKER_TOKEN_ENV).unwrap_or_default();

        let mut missing = Vec::new();
        if base_url.is_empty() {
            missing.push(TRACKER_URL_ENV);
        }
        if email.is_empty() {
            missing.push(TRACKER_EMAIL_ENV);
        }
        if api_token.is_empty() {
            missing.push(TRACKER_TOKEN_ENV);
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "missing required environment variables: {}",
                missing.join(", ")
            );
        }

        Ok(TrackerConfig {
            base_url,
            email,
            api_token,
            issue_key: issue_key.to_string(),
        })
    }
}

/// Fetch the issue and compose the request text the rest of the pipeline
/// consumes: `Feature: <summary>` followed by the description.
pub fn fetch_issue(config: &TrackerConfig) -> anyhow::Result<String> {
    info!("connecting to tracker to fetch issue {}", config.issue_key);

    let url = format!(
        "{}/rest/api/2/issue/{}",
        config.base_url.trim_end_matches('/'),
        config.issue_key
    );

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(&url)
        .basic_auth(&config.email, Some(&config.api_token))
        .send()
        .with_context(|| format!("failed to reach tracker at {}", url))?;

    let status = response.status();
    let body = response.text().context("failed to read tracker response")?;
    if !status.is_success() {
        anyhow::bail!(
            "failed to fetch issue {} (status {}): {}",
            config.issue_key,
            status,
            body
        );
    }

    let text = compose_request(&body)?;
    info!("fetched issue {}", config.issue_key);
    Ok(text)
}

/// Turn the tracker's JSON payload into request text.
fn compose_request(body: &str) -> anyhow::Result<String> {
    let json: Value = serde_json::from_str(body).context("tracker response is not JSON")?;
    let fields = json
        .get("fields")
        .context("tracker response has no fields object")?;

    let summary = fields
        .get("summary")
        .and_then(Value::as_str)
        .context("issue has no summary")?;
    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("");

    Ok(format!("Feature: {}\n\n{}", summary, description))
}
