//! Interactive progress spinners, shown only on a TTY.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Start a spinner with `message`, or nothing when stdout is not a
/// terminal (logs carry the same information there).
pub fn spinner(message: impl Into<String>) -> Option<ProgressBar> {
    if !atty::is(atty::Stream::Stdout) {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Finish a spinner with a final message, if one is running.
pub fn finish(pb: Option<ProgressBar>, message: impl Into<String>) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.into());
    }
}

/// Clear a spinner without a message, if one is running.
pub fn clear(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}
