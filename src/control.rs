//! Operator control channel for skipping the dataset currently downloading.
//!
//! A background listener reads line-oriented input and raises a
//! [`SkipSignal`] when it sees `s` or `skip` (case-insensitive, surrounding
//! whitespace ignored). The fetch loop checks the signal before every page
//! request and resets it when it moves to the next dataset.
//!
//! The listener runs on a detached OS thread, never a tokio task, so a
//! blocked stdin read cannot hold up runtime shutdown.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Skip flag scoped to one run
///
/// Single writer (the listener), single reader (the fetch loop). Clones
/// share the same flag.
#[derive(Clone, Debug, Default)]
pub struct SkipSignal {
    flag: Arc<AtomicBool>,
}

impl SkipSignal {
    /// Create a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current dataset be skipped
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a skip was requested for the current dataset
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Lower the flag; called when a new dataset starts
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Whether an input line is a skip command
pub fn is_skip_command(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("s") || line.eq_ignore_ascii_case("skip")
}

/// Read lines from `input` until EOF or a read error, raising `signal` on
/// every skip command. Returns the number of skip commands seen.
pub fn listen_for_skips<R: BufRead>(input: R, signal: &SkipSignal) -> usize {
    let mut seen = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "Control input closed");
                break;
            }
        };
        if is_skip_command(&line) {
            seen += 1;
            signal.raise();
            tracing::info!("Skip requested for the current dataset");
        } else if !line.trim().is_empty() {
            tracing::debug!(input = %line.trim(), "Ignoring control input");
        }
    }
    seen
}

/// Start the listener on its own detached thread
///
/// Dropping the returned handle detaches the thread; it never keeps the
/// process alive.
pub fn spawn_skip_listener<R>(
    input: R,
    signal: SkipSignal,
) -> std::io::Result<std::thread::JoinHandle<usize>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("skip-listener".to_string())
        .spawn(move || listen_for_skips(input, &signal))
}
