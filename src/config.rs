//! Run configuration extracted from the free-text change request.
//!
//! The request (typically an issue body) names the repository to work on
//! and, optionally, how to verify it. An oracle pass normalizes the
//! free-form phrasing into canonical `Key: value` lines which are parsed
//! here.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::llm::LlmClient;
use crate::oracles;

const KEY_REPO_URL: &str = "Repo-URL";
const KEY_BASE_BRANCH: &str = "Base-Branch";
const KEY_REPO_NAME: &str = "Repo-Name";
const KEY_VERIFY_COMMAND: &str = "Verify-Command";
const KEY_MODULE_PREFIX: &str = "Module-Prefix";

/// Where the change lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub url: String,
    pub base_branch: String,
    pub name: String,
}

/// Everything the pipeline needs to know about the target project that
/// is not on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub repo: RepoConfig,
    /// Overrides the CLI verify command when the request names one.
    pub verify_command: Option<String>,
    /// Base package / module namespace for newly generated code.
    pub module_prefix: Option<String>,
}

static KEY_VALUE_LINE: Lazy<Regex> = Lazy::new(|| {
    // [ \t] rather than \s: the latter crosses newlines, which would let
    // a key with an empty value swallow the following line.
    Regex::new(r"(?im)^[ \t]*([A-Za-z][A-Za-z0-9-]*)[ \t]*:[ \t]*(.+)$").expect("kv pattern")
});

fn lookup(text: &str, key: &str) -> Option<String> {
    for captures in KEY_VALUE_LINE.captures_iter(text) {
        if captures[1].eq_ignore_ascii_case(key) {
            let value = captures[2].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Issue trackers decorate pasted links (`https://... |display text`);
/// keep only the link itself.
fn sanitize_url(raw: String) -> String {
    match raw.split_once('|') {
        Some((url, _)) => {
            warn!("malformed repository URL detected: '{}'; sanitizing", raw);
            url.trim().to_string()
        }
        None => raw,
    }
}

/// Parse canonical key-value lines into a [`RunConfig`], failing fast
/// when a mandatory key is absent.
pub fn parse_config_text(text: &str) -> anyhow::Result<RunConfig> {
    let url = lookup(text, KEY_REPO_URL).map(sanitize_url);
    let base_branch = lookup(text, KEY_BASE_BRANCH);
    let name = lookup(text, KEY_REPO_NAME);

    let mut missing = Vec::new();
    if url.is_none() {
        missing.push(KEY_REPO_URL);
    }
    if base_branch.is_none() {
        missing.push(KEY_BASE_BRANCH);
    }
    if name.is_none() {
        missing.push(KEY_REPO_NAME);
    }

    if let (Some(url), Some(base_branch), Some(name)) = (url, base_branch, name) {
        Ok(RunConfig {
            repo: RepoConfig {
                url,
                base_branch,
                name,
            },
            verify_command: lookup(text, KEY_VERIFY_COMMAND),
            module_prefix: lookup(text, KEY_MODULE_PREFIX),
        })
    } else {
        anyhow::bail!(
            "could not extract mandatory configuration keys: {}. \
             Ensure they are present in the change-request description.",
            missing.join(", ")
        )
    }
}

/// Run the config-extraction oracle over the request and parse its
/// answer.
pub fn extract_run_config(client: &dyn LlmClient, request: &str) -> anyhow::Result<RunConfig> {
    let text = oracles::extract_config_text(client, request)?;
    parse_config_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = "Repo-URL: https://github.com/acme/shop\n\
                    Base-Branch: main\n\
                    Repo-Name: shop\n\
                    Verify-Command: make check\n\
                    Module-Prefix: com.acme.shop";
        let config = parse_config_text(text).unwrap();
        assert_eq!(config.repo.url, "https://github.com/acme/shop");
        assert_eq!(config.repo.base_branch, "main");
        assert_eq!(config.repo.name, "shop");
        assert_eq!(config.verify_command.as_deref(), Some("make check"));
        assert_eq!(config.module_prefix.as_deref(), Some("com.acme.shop"));
    }

    #[test]
    fn test_optional_keys_may_be_absent() {
        let text = "Repo-URL: https://github.com/acme/shop\nBase-Branch: main\nRepo-Name: shop";
        let config = parse_config_text(text).unwrap();
        assert!(config.verify_command.is_none());
        assert!(config.module_prefix.is_none());
    }

    #[test]
    fn test_missing_mandatory_keys_are_all_reported() {
        let err = parse_config_text("Verify-Command: make").unwrap_err().to_string();
        assert!(err.contains("Repo-URL"));
        assert!(err.contains("Base-Branch"));
        assert!(err.contains("Repo-Name"));
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let text = "repo-url: https://x.example/r\nbase-branch: dev\nrepo-name: r";
        let config = parse_config_text(text).unwrap();
        assert_eq!(config.repo.base_branch, "dev");
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let text = "Repo-URL: https://x.example/r\nBase-Branch:\nRepo-Name: r";
        // "Base-Branch:" with no value does not match the value pattern,
        // so the key is reported missing.
        let err = parse_config_text(text).unwrap_err().to_string();
        assert!(err.contains("Base-Branch"));
    }

    #[test]
    fn test_tracker_decorated_url_is_sanitized() {
        let text =
            "Repo-URL: https://github.com/acme/shop|acme/shop\nBase-Branch: main\nRepo-Name: shop";
        let config = parse_config_text(text).unwrap();
        assert_eq!(config.repo.url, "https://github.com/acme/shop");
    }
}
