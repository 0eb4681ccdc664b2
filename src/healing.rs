//! The self-healing verify/repair loop.
//!
//! One run walks a small state machine over a single working tree:
//! verify, and on failure ask the diagnosis oracle for a root cause, ask
//! the repair oracle for corrected files, apply them, verify again. The
//! loop is bounded three ways: an attempt budget, a stagnation check on
//! the diagnosis text, and an empty-fix check. It therefore performs at
//! most `max_attempts + 1` build invocations no matter how the oracles
//! behave.

use std::path::Path;

use tracing::{error, info, warn};

use crate::llm::LlmClient;
use crate::mutator::{self, Merger};
use crate::oracles;
use crate::parser;
use crate::source;
use crate::verify::BuildRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealingConfig {
    /// Upper bound on repair attempts (verify → diagnose → fix cycles).
    pub max_attempts: u32,
}

impl Default for HealingConfig {
    fn default() -> Self {
        HealingConfig { max_attempts: 10 }
    }
}

/// Why a loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Two consecutive diagnoses were textually identical; more attempts
    /// are judged unproductive. The comparison is exact, so semantically
    /// equivalent analyses with trivial wording differences will not
    /// trigger it.
    StagnantDiagnosis,
    /// The repair oracle produced no applicable file operations.
    EmptyRepair,
    /// The attempt budget ran out.
    AttemptsExhausted,
}

/// Terminal state of one loop run. On `Aborted` the tree holds whatever
/// the last applied fix left behind; the caller decides how to persist
/// it (the pipeline commits it together with a failure analysis).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealingOutcome {
    Succeeded {
        attempts: u32,
    },
    Aborted {
        reason: AbortReason,
        attempts: u32,
        last_diagnosis: String,
        last_transcript: String,
    },
}

impl HealingOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, HealingOutcome::Succeeded { .. })
    }
}

/// Run the loop to a terminal state. Oracle-call failures (after the
/// uniform retry policy) propagate as errors; everything else resolves
/// into a [`HealingOutcome`].
pub fn run_healing_loop(
    client: &dyn LlmClient,
    runner: &dyn BuildRunner,
    merger: &dyn Merger,
    root: &Path,
    config: &HealingConfig,
) -> anyhow::Result<HealingOutcome> {
    let mut attempts: u32 = 0;
    let mut previous_diagnosis = String::new();

    loop {
        let outcome = runner.verify(root);
        if outcome.success {
            info!("build verified successfully after {} repair attempt(s)", attempts);
            return Ok(HealingOutcome::Succeeded { attempts });
        }

        let transcript = outcome.transcript;

        if attempts >= config.max_attempts {
            error!(
                "giving up after {} repair attempts; build still failing",
                attempts
            );
            return Ok(HealingOutcome::Aborted {
                reason: AbortReason::AttemptsExhausted,
                attempts,
                last_diagnosis: previous_diagnosis,
                last_transcript: transcript,
            });
        }
        attempts += 1;

        error!("build failed on attempt {}; starting repair", attempts);
        let diagnosis = oracles::diagnose_failure(client, &transcript, &previous_diagnosis)?;

        if attempts > 1 && diagnosis == previous_diagnosis {
            warn!("failure analysis is identical to the previous one; stopping repair attempts");
            return Ok(HealingOutcome::Aborted {
                reason: AbortReason::StagnantDiagnosis,
                attempts,
                last_diagnosis: diagnosis,
                last_transcript: transcript,
            });
        }
        previous_diagnosis = diagnosis.clone();

        let snapshot = source::snapshot_tree(root);
        if snapshot.is_empty() {
            warn!("working tree has no readable source to hand to the repair oracle");
        }

        let fix_text = oracles::repair_build(client, &transcript, &diagnosis, &snapshot)?;
        let batch = parser::parse(&fix_text);
        if batch.is_empty() {
            warn!("repair oracle provided no fix; stopping repair attempts");
            return Ok(HealingOutcome::Aborted {
                reason: AbortReason::EmptyRepair,
                attempts,
                last_diagnosis: diagnosis,
                last_transcript: transcript,
            });
        }

        info!("applying {} corrected file(s)", batch.len());
        mutator::apply_batch(&batch, root, merger);
    }
}
