//! The end-to-end pipeline: request in, verified (or annotated) commit
//! out.
//!
//! Stages run strictly in sequence, each blocking on the previous one:
//! acquire the request, extract run configuration, prepare the working
//! tree, gate on semantic change, generate and apply file edits, verify,
//! self-heal on failure, then persist the result. Per-run values travel
//! in an immutable [`RunContext`]; nothing is threaded through shared
//! mutable state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::cli::{Cli, PromptStage};
use crate::config::{self, RunConfig};
use crate::gate::{self, GateDecision};
use crate::healing::{self, HealingConfig, HealingOutcome};
use crate::issue::{self, TrackerConfig};
use crate::llm::LlmClient;
use crate::mutator;
use crate::oracles::{self, OracleMerger};
use crate::parser;
use crate::progress;
use crate::session::{RecordingClient, Session};
use crate::source;
use crate::state;
use crate::verify::{BuildRunner, CommandRunner};
use crate::git_ops;

/// At most this many files get a per-file context summary in the
/// generation prompt; larger trees fall back to the listing alone for
/// the rest.
const MAX_CONTEXT_FILES: usize = 16;

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Change generated, verified, and committed.
    Completed,
    /// The gate found no semantic change in the request; nothing was
    /// generated and no branch was created.
    SkippedNoChanges,
    /// The healing loop did not converge. The tree and a failure
    /// analysis were still committed for human review.
    HealingFailed,
    /// A debug flag printed a prompt instead of running the pipeline.
    PromptPrinted,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub root: PathBuf,
    pub branch: Option<String>,
    pub commit_message: Option<String>,
    pub pr_url: Option<String>,
}

/// Immutable per-run inputs, resolved once up front.
struct RunContext {
    request: String,
    root: PathBuf,
    /// Present in remote mode (tree cloned from an extracted repo).
    run_config: Option<RunConfig>,
    verify_command: String,
    branch_key: String,
    generate_tests: bool,
    max_heal_attempts: u32,
    push_and_pr: bool,
}

/// Run the whole pipeline. `runner_override` substitutes the build
/// runner (tests script outcomes); production passes `None` and the
/// verify command resolves from the request/CLI.
pub fn run(
    args: &Cli,
    client: &dyn LlmClient,
    runner_override: Option<&dyn BuildRunner>,
) -> anyhow::Result<RunSummary> {
    let request = resolve_request(args)?;

    if args.print_prompt == Some(PromptStage::Config) {
        println!("{}", oracles::config_prompt(&request));
        return Ok(debug_summary(args));
    }

    let session = Session::open(&Session::compute_hash(&request)[..12])?;
    let recording = RecordingClient::new(client, &session);
    let client: &dyn LlmClient = &recording;

    let ctx = prepare_context(args, client, request)?;

    if args.print_prompt == Some(PromptStage::Generation) {
        let listing = source::list_files(&ctx.root);
        println!(
            "{}",
            oracles::generation_prompt(
                &ctx.request,
                module_prefix(&ctx),
                "(context summaries elided)",
                &listing,
                ctx.generate_tests,
            )
        );
        return Ok(debug_summary(args));
    }

    // Gate on semantic change before touching branches or the tree.
    let previous_request = state::read_previous_requirements(&ctx.root);
    let changelog = match gate::evaluate(client, &previous_request, &ctx.request)? {
        GateDecision::Skip => {
            info!(
                "no functional changes detected; the working tree stays on the base branch \
                 and no feature branch is created"
            );
            return Ok(RunSummary {
                outcome: RunOutcome::SkippedNoChanges,
                root: ctx.root,
                branch: None,
                commit_message: None,
                pr_url: None,
            });
        }
        GateDecision::Proceed { changelog } => changelog,
    };

    let is_git_tree = ctx.root.join(".git").exists();
    let branch = if is_git_tree {
        Some(git_ops::create_feature_branch(&ctx.root, &ctx.branch_key)?)
    } else {
        warn!("working tree is not a git repository; skipping branch and commit steps");
        None
    };
    let branch_label = branch.clone().unwrap_or_else(|| "(no branch)".to_string());

    // Request summary: commit message + structured requirements.
    let (commit_message, request_summary) = oracles::summarize_request(client, &ctx.request)?;

    // Context for the generation prompt.
    let pb = progress::spinner("Gathering project context...");
    let listing = source::list_files(&ctx.root);
    let summaries = collect_context_summaries(client, &ctx.root)?;
    progress::finish(pb, "Project context gathered.");

    let pb = progress::spinner("Asking the model for code changes...");
    let generated = oracles::generate_changes(
        client,
        &ctx.request,
        module_prefix(&ctx),
        &summaries,
        &listing,
        ctx.generate_tests,
    )?;
    progress::clear(pb);

    let batch = parser::parse(&generated);
    if batch.is_empty() {
        anyhow::bail!("the generation oracle produced no applicable file operations");
    }
    info!("generation produced {} file operation(s)", batch.len());

    let merger = OracleMerger::new(client);
    let applied = mutator::apply_batch(&batch, &ctx.root, &merger);
    info!("applied {}/{} operation(s)", applied, batch.len());

    // Persist run artifacts before verification so even a failed build
    // leaves the history in place.
    state::append_changelog(&ctx.root, &changelog, &branch_label)?;
    state::record_requirements(&ctx.root, &ctx.request, &branch_label)?;
    if !request_summary.is_empty() {
        let readme_entry = format!("## Project Summary\n\n{}", request_summary);
        state::append_with_metadata(&ctx.root.join("README.md"), &readme_entry, &branch_label)?;
    }

    // Verify and self-heal.
    let command_runner;
    let runner: &dyn BuildRunner = match runner_override {
        Some(runner) => runner,
        None => {
            command_runner = CommandRunner::new(ctx.verify_command.clone());
            &command_runner
        }
    };

    let pb = progress::spinner(format!(
        "Verifying with `{}` (self-healing enabled)...",
        ctx.verify_command
    ));
    let healing = healing::run_healing_loop(
        client,
        runner,
        &merger,
        &ctx.root,
        &HealingConfig {
            max_attempts: ctx.max_heal_attempts,
        },
    )?;
    progress::clear(pb);

    match healing {
        HealingOutcome::Succeeded { attempts } => {
            if attempts > 0 {
                info!("build verified after {} repair attempt(s)", attempts);
            } else {
                info!("build verified on the first attempt");
            }

            git_ops::add_gitignore_entry(&ctx.root, "target/")?;

            let mut pr_url = None;
            if let Some(branch) = &branch {
                git_ops::commit_and_push(&ctx.root, &commit_message, branch, ctx.push_and_pr)?;
                if ctx.push_and_pr {
                    if let Some(config) = &ctx.run_config {
                        pr_url = git_ops::create_pull_request(
                            &ctx.root,
                            &config.repo.base_branch,
                            branch,
                            &commit_message,
                        );
                    }
                }
            }

            Ok(RunSummary {
                outcome: RunOutcome::Completed,
                root: ctx.root,
                branch,
                commit_message: Some(commit_message),
                pr_url,
            })
        }
        HealingOutcome::Aborted {
            reason,
            attempts,
            last_diagnosis,
            ..
        } => {
            warn!(
                "self-healing did not converge after {} attempt(s) ({:?}); committing the \
                 generated work with a failure analysis",
                attempts, reason
            );
            state::write_failure_analysis(&ctx.root, &last_diagnosis)?;

            let failed_message = format!("fix(auto): [build failed] {}", commit_message);
            if let Some(branch) = &branch {
                git_ops::commit_and_push(&ctx.root, &failed_message, branch, ctx.push_and_pr)?;
            }

            Ok(RunSummary {
                outcome: RunOutcome::HealingFailed,
                root: ctx.root,
                branch,
                commit_message: Some(failed_message),
                pr_url: None,
            })
        }
    }
}

fn debug_summary(args: &Cli) -> RunSummary {
    RunSummary {
        outcome: RunOutcome::PromptPrinted,
        root: args.project_root.clone().unwrap_or_else(|| PathBuf::from(".")),
        branch: None,
        commit_message: None,
        pr_url: None,
    }
}

fn module_prefix(ctx: &RunContext) -> Option<&str> {
    ctx.run_config
        .as_ref()
        .and_then(|c| c.module_prefix.as_deref())
}

/// Pick exactly one request source: inline words, a file, or the issue
/// tracker.
fn resolve_request(args: &Cli) -> anyhow::Result<String> {
    let inline = args.inline_request();
    let sources =
        [inline.is_some(), args.issue.is_some(), args.request_file.is_some()]
            .iter()
            .filter(|present| **present)
            .count();

    if sources == 0 {
        anyhow::bail!("no change request given; pass request text, --request-file or --issue");
    }
    if sources > 1 {
        anyhow::bail!("give the change request exactly one way: text, --request-file or --issue");
    }

    if let Some(text) = inline {
        Ok(text)
    } else if let Some(path) = &args.request_file {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request file {}", path.display()))
    } else if let Some(key) = &args.issue {
        let tracker = TrackerConfig::from_env(key).context("issue tracker is not configured")?;
        issue::fetch_issue(&tracker)
    } else {
        unreachable!("source count was checked above")
    }
}

/// Resolve where and how this run operates.
fn prepare_context(
    args: &Cli,
    client: &dyn LlmClient,
    request: String,
) -> anyhow::Result<RunContext> {
    let branch_key = args.issue.clone().unwrap_or_else(|| "change".to_string());

    if let Some(root) = &args.project_root {
        // Local mode: the caller owns the tree, no clone, no config
        // extraction.
        if !root.is_dir() {
            anyhow::bail!("project root {} does not exist", root.display());
        }
        return Ok(RunContext {
            request,
            root: root.clone(),
            run_config: None,
            verify_command: args.verify_with.clone(),
            branch_key,
            generate_tests: !args.no_test,
            max_heal_attempts: args.max_heal_attempts,
            push_and_pr: false,
        });
    }

    // Remote mode: the request itself names the repository.
    let mut run_config = config::extract_run_config(client, &request)
        .context("could not extract run configuration from the request")?;
    if let Some(base) = &args.base_branch {
        run_config.repo.base_branch = base.clone();
    }

    let root = git_ops::workspace_dir(&run_config.repo.name)?;
    git_ops::ensure_repository(&root, &run_config.repo.url, &run_config.repo.base_branch)
        .context("failed to prepare the repository for analysis")?;

    let verify_command = run_config
        .verify_command
        .clone()
        .unwrap_or_else(|| args.verify_with.clone());

    Ok(RunContext {
        request,
        root,
        run_config: Some(run_config),
        verify_command,
        branch_key,
        generate_tests: !args.no_test,
        max_heal_attempts: args.max_heal_attempts,
        push_and_pr: !args.no_pr,
    })
}

/// Summarize up to [`MAX_CONTEXT_FILES`] existing files for the
/// generation prompt. A file that fails to read or summarize is noted
/// and skipped.
fn collect_context_summaries(client: &dyn LlmClient, root: &Path) -> anyhow::Result<String> {
    let files = source::collect_files(root);
    if files.is_empty() {
        return Ok(String::new());
    }
    if files.len() > MAX_CONTEXT_FILES {
        info!(
            "tree has {} files; summarizing the first {} only",
            files.len(),
            MAX_CONTEXT_FILES
        );
    }

    let mut combined = String::new();
    for relative in files.iter().take(MAX_CONTEXT_FILES) {
        let rel_display = relative.to_string_lossy().replace('\\', "/");
        let content = match std::fs::read_to_string(root.join(relative)) {
            Ok(content) => content,
            Err(err) => {
                warn!("could not read {} for context: {}", rel_display, err);
                continue;
            }
        };
        let summary = oracles::summarize_context(client, &rel_display, &content)?;
        combined.push_str(&format!("--- File: {} ---\n{}\n\n", rel_display, summary));
    }
    Ok(combined)
}
