//! Per-run session directory: every oracle prompt/response pair is
//! written to disk for audit, and replayed from cache when the identical
//! prompt comes up again.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::llm::{LlmClient, LlmError};

pub struct Session {
    dir: PathBuf,
    /// prompt hash -> response
    responses: RefCell<HashMap<String, String>>,
}

impl Session {
    /// Open (or resume) the session with the given id under the user
    /// data directory.
    pub fn open(run_id: &str) -> anyhow::Result<Self> {
        let base = directories::ProjectDirs::from("", "", "autoforge")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("cannot determine a data directory for session storage")?;
        Session::at(base.join("session").join(run_id))
    }

    /// Open a session rooted at an explicit directory.
    pub fn at(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create session directory {}", dir.display()))?;

        let mut responses = HashMap::new();
        for entry in fs::read_dir(&dir).context("failed to read session directory")? {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(hash) = name
                .split("-response-")
                .nth(1)
                .and_then(|s| s.strip_suffix(".txt"))
            else {
                continue;
            };
            match fs::read_to_string(entry.path()) {
                Ok(content) => {
                    responses.insert(hash.to_string(), content);
                }
                Err(err) => warn!("could not load cached response {}: {}", name, err),
            }
        }

        Ok(Session {
            dir,
            responses: RefCell::new(responses),
        })
    }

    pub fn compute_hash(input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// A previously recorded response for this exact prompt, if any.
    pub fn cached(&self, prompt: &str) -> Option<String> {
        self.responses
            .borrow()
            .get(&Session::compute_hash(prompt))
            .cloned()
    }

    /// Persist one prompt/response pair and add it to the replay cache.
    pub fn record(&self, label: &str, prompt: &str, response: &str) -> anyhow::Result<()> {
        let hash = Session::compute_hash(prompt);
        fs::write(self.dir.join(format!("{}-{}.txt", label, hash)), prompt)
            .context("failed to write prompt file")?;
        fs::write(
            self.dir.join(format!("{}-response-{}.txt", label, hash)),
            response,
        )
        .context("failed to write response file")?;
        self.responses.borrow_mut().insert(hash, response.to_string());
        Ok(())
    }
}

/// Wraps a client so every completion is recorded in the session and
/// identical prompts are served from the replay cache without a second
/// model call.
pub struct RecordingClient<'a> {
    inner: &'a dyn LlmClient,
    session: &'a Session,
}

impl<'a> RecordingClient<'a> {
    pub fn new(inner: &'a dyn LlmClient, session: &'a Session) -> Self {
        RecordingClient { inner, session }
    }
}

impl LlmClient for RecordingClient<'_> {
    fn complete(&self, prompt: &str, model: &str) -> Result<String, LlmError> {
        if let Some(cached) = self.session.cached(prompt) {
            debug!("serving response from session cache");
            return Ok(cached);
        }
        let response = self.inner.complete(prompt, model)?;
        if let Err(err) = self.session.record(model, prompt, &response) {
            warn!("could not record session transcript: {:#}", err);
        }
        Ok(response)
    }
}
