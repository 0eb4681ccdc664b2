//! Short-circuits the pipeline when the request has not meaningfully
//! changed since the last run.

use tracing::info;

use crate::llm::LlmClient;
use crate::oracles;

/// The comparison oracle's way of saying "nothing to do". Matched
/// exactly after trimming.
pub const NO_CHANGES_SENTINEL: &str = "No changes detected.";

/// Whether the pipeline should run, and with what changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Something changed; the oracle's output doubles as the changelog
    /// entry to persist.
    Proceed { changelog: String },
    /// The request is semantically unchanged.
    Skip,
}

/// Compare the previously stored request text against the new one.
///
/// Only the exact sentinel (trimmed) stops the pipeline; every other
/// oracle answer, including an empty one, means proceed.
pub fn evaluate(
    client: &dyn LlmClient,
    old_request: &str,
    new_request: &str,
) -> anyhow::Result<GateDecision> {
    let response = oracles::compare_requirements(client, old_request, new_request)?;
    Ok(decide(&response))
}

fn decide(response: &str) -> GateDecision {
    if response.trim() == NO_CHANGES_SENTINEL {
        info!("no functional changes detected in the request");
        GateDecision::Skip
    } else {
        GateDecision::Proceed {
            changelog: response.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedClient;

    #[test]
    fn test_exact_sentinel_skips() {
        assert_eq!(decide("No changes detected."), GateDecision::Skip);
        assert_eq!(decide("  No changes detected.\n"), GateDecision::Skip);
    }

    #[test]
    fn test_sentinel_is_case_sensitive() {
        let decision = decide("no changes detected.");
        assert!(matches!(decision, GateDecision::Proceed { .. }));
    }

    #[test]
    fn test_explanatory_text_proceeds_and_becomes_changelog() {
        let decision = decide("## Changes\n- added logout endpoint");
        match decision {
            GateDecision::Proceed { changelog } => {
                assert!(changelog.contains("logout"));
            }
            GateDecision::Skip => panic!("expected proceed"),
        }
    }

    #[test]
    fn test_empty_output_proceeds() {
        assert!(matches!(decide(""), GateDecision::Proceed { .. }));
    }

    #[test]
    fn test_sentinel_embedded_in_longer_text_proceeds() {
        let decision = decide("No changes detected. Well, except one thing.");
        assert!(matches!(decision, GateDecision::Proceed { .. }));
    }

    #[test]
    fn test_evaluate_uses_comparison_oracle() {
        let client = ScriptedClient::new();
        client.push_ok("No changes detected.");
        let decision = evaluate(&client, "old", "new").unwrap();
        assert_eq!(decision, GateDecision::Skip);
        assert_eq!(client.calls(), 1);
    }
}
