//! One thin wrapper per oracle role. Each renders its prompt template,
//! calls the model under the uniform retry policy, and hands back raw
//! text for the caller to interpret.

use anyhow::Context;
use tracing::info;

use crate::llm::{LlmClient, LlmError, FLASH_MODEL, REASONING_MODEL};
use crate::mutator::Merger;
use crate::parser;
use crate::retry::{retry_with_backoff, RetryPolicy};

fn call(client: &dyn LlmClient, role: &str, prompt: &str, model: &str) -> anyhow::Result<String> {
    retry_with_backoff(&RetryPolicy::default(), LlmError::is_transient, || {
        client.complete(prompt, model)
    })
    .with_context(|| format!("{} oracle call failed", role))
}

/// Prompt for the main generation pass. Public so the CLI debug flag can
/// print it without calling the model.
pub fn generation_prompt(
    request: &str,
    module_prefix: Option<&str>,
    context_summaries: &str,
    file_listing: &str,
    generate_tests: bool,
) -> String {
    let profile_note = match module_prefix {
        Some(prefix) => format!(
            "PROJECT NOTES:\nNew code lives under the module prefix `{}`.\n",
            prefix
        ),
        None => String::new(),
    };
    let test_instruction = if generate_tests {
        "\n6. Also generate relevant unit tests for the changes, in the project's test layout."
    } else {
        "\n6. Do NOT generate tests; test generation is disabled for this request."
    };
    format!(
        include_str!("prompts/generation.txt"),
        profile_note, test_instruction, context_summaries, file_listing, request
    )
}

/// Ask the generation oracle for a marker-formatted batch of file edits.
pub fn generate_changes(
    client: &dyn LlmClient,
    request: &str,
    module_prefix: Option<&str>,
    context_summaries: &str,
    file_listing: &str,
    generate_tests: bool,
) -> anyhow::Result<String> {
    let prompt = generation_prompt(
        request,
        module_prefix,
        context_summaries,
        file_listing,
        generate_tests,
    );
    info!("requesting code generation from the model");
    call(client, "generation", &prompt, REASONING_MODEL)
}

/// Ask for a root-cause analysis of a failed build. `previous` is the
/// analysis from the prior healing attempt, empty on the first pass.
pub fn diagnose_failure(
    client: &dyn LlmClient,
    transcript: &str,
    previous: &str,
) -> anyhow::Result<String> {
    let previous_block = if previous.is_empty() {
        String::new()
    } else {
        format!(
            "\nANALYSIS OF THE PREVIOUS ATTEMPT (the fix derived from it did not work):\n{}\n",
            previous
        )
    };
    let prompt = format!(
        include_str!("prompts/diagnosis.txt"),
        previous_block, transcript
    );
    call(client, "diagnosis", &prompt, FLASH_MODEL).map(|s| s.trim().to_string())
}

/// Ask for corrected files given the failure analysis and the whole-tree
/// source snapshot. Returns marker-formatted text.
pub fn repair_build(
    client: &dyn LlmClient,
    transcript: &str,
    diagnosis: &str,
    source_snapshot: &str,
) -> anyhow::Result<String> {
    let prompt = format!(
        include_str!("prompts/repair.txt"),
        transcript, diagnosis, source_snapshot
    );
    info!("requesting a build fix from the model");
    call(client, "repair", &prompt, REASONING_MODEL)
}

/// Merge a proposed new version of a file into its existing content.
/// Responses arrive as the raw merged file; stray fences are cleaned up.
pub fn merge_files(
    client: &dyn LlmClient,
    existing: &str,
    incoming: &str,
) -> anyhow::Result<String> {
    let prompt = format!(include_str!("prompts/merge.txt"), existing, incoming);
    call(client, "merge", &prompt, REASONING_MODEL).map(|s| parser::extract(&s))
}

/// Compare the previous and current request text. Returns the raw
/// changelog text (or the no-change sentinel) for the gate to interpret.
pub fn compare_requirements(
    client: &dyn LlmClient,
    old: &str,
    new: &str,
) -> anyhow::Result<String> {
    let prompt = format!(include_str!("prompts/compare.txt"), old, new);
    call(client, "comparison", &prompt, FLASH_MODEL)
}

/// Prompt for the config-extraction pass, exposed for the CLI debug flag.
pub fn config_prompt(request: &str) -> String {
    format!(include_str!("prompts/config.txt"), request)
}

/// Pull canonical `Key: value` config lines out of the request text.
pub fn extract_config_text(client: &dyn LlmClient, request: &str) -> anyhow::Result<String> {
    let prompt = config_prompt(request);
    call(client, "config extraction", &prompt, FLASH_MODEL).map(|s| parser::extract(&s))
}

/// Condense one existing source file into a short structured summary for
/// the generation prompt.
pub fn summarize_context(
    client: &dyn LlmClient,
    path: &str,
    content: &str,
) -> anyhow::Result<String> {
    let prompt = format!(include_str!("prompts/context.txt"), path, content);
    call(client, "context summary", &prompt, FLASH_MODEL)
}

/// Summarize the request into a commit-message line plus structured
/// requirements. Returns `(commit_message, summary)`.
pub fn summarize_request(client: &dyn LlmClient, request: &str) -> anyhow::Result<(String, String)> {
    const COMMIT_PREFIX: &str = "Commit-Summary: ";
    const DEFAULT_MESSAGE: &str = "feat: automated change by agent";

    let prompt = format!(include_str!("prompts/request_summary.txt"), request);
    let response = call(client, "request summary", &prompt, FLASH_MODEL)?;
    let response = response.trim();

    match response.split_once('\n') {
        Some((first, rest)) if first.starts_with(COMMIT_PREFIX) => Ok((
            first[COMMIT_PREFIX.len()..].trim().to_string(),
            rest.trim().to_string(),
        )),
        _ => {
            if let Some(stripped) = response.strip_prefix(COMMIT_PREFIX) {
                Ok((stripped.trim().to_string(), String::new()))
            } else {
                Ok((DEFAULT_MESSAGE.to_string(), response.to_string()))
            }
        }
    }
}

/// [`Merger`] implementation backed by the merge oracle.
pub struct OracleMerger<'a> {
    client: &'a dyn LlmClient,
}

impl<'a> OracleMerger<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        OracleMerger { client }
    }
}

impl Merger for OracleMerger<'_> {
    fn merge(&self, existing: &str, incoming: &str) -> anyhow::Result<String> {
        merge_files(self.client, existing, incoming)
    }
}
