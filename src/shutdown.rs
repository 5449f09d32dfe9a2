//! Cooperative shutdown.
//!
//! Signal handlers and the quit-key listener only flip a flag. The monitor
//! loop checks it once per iteration and runs the same teardown path no
//! matter why it stopped.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Shared cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices, returning early on cancel.
    /// Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}

/// Route SIGINT/SIGTERM to `token`.
pub fn install_signal_handler(token: &CancellationToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        token.cancel();
    })
    .context("error setting Ctrl-C handler")
}

/// Watch stdin for a `q` line (the operator quit key).
///
/// The listener thread is detached; it dies with the process.
pub fn spawn_quit_key_listener(token: &CancellationToken) -> Result<()> {
    let token = token.clone();
    std::thread::Builder::new()
        .name("quit-key".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if is_quit_command(&line) {
                    log::info!("quit requested by operator");
                    token.cancel();
                    break;
                }
            }
        })
        .context("spawn quit-key listener")?;
    Ok(())
}

fn is_quit_command(line: &str) -> bool {
    matches!(line.trim(), "q" | "Q" | "quit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn sleep_returns_early_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_runs_to_deadline_without_cancel() {
        let token = CancellationToken::new();
        assert!(!token.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn quit_command_parsing() {
        assert!(is_quit_command("q\n"));
        assert!(is_quit_command(" quit "));
        assert!(!is_quit_command("queue"));
    }
}
