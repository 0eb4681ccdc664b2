use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use autoforge::cli::Cli;
use autoforge::llm::{GeminiClient, API_KEY_ENV};
use autoforge::pipeline::{self, RunOutcome};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Cli::parse();

    // Debug prompt printing never calls the model, so an unset key is
    // fine there; everything else needs credentials.
    let client = match GeminiClient::from_env() {
        Some(client) => client,
        None if args.print_prompt.is_some() => GeminiClient::new(String::new()),
        None => {
            error!("{} environment variable is not set", API_KEY_ENV);
            std::process::exit(2);
        }
    };

    match pipeline::run(&args, &client, None) {
        Ok(summary) => {
            match summary.outcome {
                RunOutcome::Completed => {
                    info!("task completed successfully");
                    if let Some(branch) = &summary.branch {
                        info!("branch: {}", branch);
                    }
                    if let Some(url) = &summary.pr_url {
                        info!("pull request: {}", url);
                    } else {
                        info!("working tree: {}", summary.root.display());
                    }
                }
                RunOutcome::SkippedNoChanges => {
                    info!("no functional changes detected; nothing to do");
                }
                RunOutcome::HealingFailed => {
                    error!(
                        "build verification did not converge; the generated work and a \
                         failure analysis were committed in {}",
                        summary.root.display()
                    );
                    std::process::exit(1);
                }
                RunOutcome::PromptPrinted => {}
            }
        }
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(1);
        }
    }
}
