//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

pub const DEFAULT_VERIFY_COMMAND: &str = "cargo build";
pub const DEFAULT_MAX_HEAL_ATTEMPTS: u32 = 10;

/// Stages whose prompt can be printed instead of executed, for
/// inspecting what the model would be asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PromptStage {
    /// The code-generation prompt (context summaries elided).
    Generation,
    /// The config-extraction prompt.
    Config,
}

/// Turn a natural-language change request into a verified, committed
/// change on a working tree.
#[derive(Debug, Parser)]
#[command(name = "autoforge", version, about)]
pub struct Cli {
    /// The change request in natural language. All free words are joined
    /// into one request; alternatively use --issue or --request-file.
    pub request: Vec<String>,

    /// Fetch the change request from the issue tracker by key
    /// (e.g. PROJ-123). Requires TRACKER_URL, TRACKER_EMAIL and
    /// TRACKER_API_TOKEN in the environment.
    #[arg(long)]
    pub issue: Option<String>,

    /// Read the change request from a file.
    #[arg(long, value_name = "PATH")]
    pub request_file: Option<PathBuf>,

    /// Operate on this existing working tree instead of extracting a
    /// repository from the request and cloning it.
    #[arg(long, value_name = "PATH")]
    pub project_root: Option<PathBuf>,

    /// Command that verifies the tree (whitespace-split, no shell;
    /// wrap anything fancier in a script). A Verify-Command in the
    /// request overrides this.
    #[arg(long, default_value = DEFAULT_VERIFY_COMMAND)]
    pub verify_with: String,

    /// Maximum number of self-repair attempts after a failed build.
    #[arg(long, default_value_t = DEFAULT_MAX_HEAL_ATTEMPTS)]
    pub max_heal_attempts: u32,

    /// Override the base branch from the extracted configuration.
    #[arg(long)]
    pub base_branch: Option<String>,

    /// Do not ask the model to generate tests.
    #[arg(long)]
    pub no_test: bool,

    /// Commit locally but skip push and pull-request creation.
    #[arg(long)]
    pub no_pr: bool,

    /// Print the prompt for the given stage and exit without calling
    /// the model.
    #[arg(long, value_enum, value_name = "STAGE")]
    pub print_prompt: Option<PromptStage>,
}

impl Cli {
    /// The request text given directly on the command line, if any.
    pub fn inline_request(&self) -> Option<String> {
        if self.request.is_empty() {
            None
        } else {
            Some(self.request.join(" "))
        }
    }
}
