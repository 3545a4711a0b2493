//! Terminal surfaces: spinner, notifications, overwrite prompts.

use std::io::{BufRead, Write};
use std::time::Duration;

use async_trait::async_trait;
use dats_jobs::{Confirm, JobProgress, JobWatch, Notifier, Severity, WatchEnd};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;

/// Spinner on stderr, shared by [`follow`] and [`StdinConfirm`].
pub fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}

/// Wait for the watch to end, rendering progress on `bar` when given.
pub async fn follow(watch: &mut JobWatch, bar: Option<&ProgressBar>) -> WatchEnd {
    let Some(bar) = bar else {
        return watch.wait().await;
    };

    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message(format!("{} job {} waiting", watch.kind().label(), watch.job_id()));

    let mut rx = watch.subscribe_progress();
    let end = loop {
        tokio::select! {
            end = watch.wait() => break end,
            update = rx.recv() => match update {
                Ok(progress) => bar.set_message(describe(&progress)),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break watch.wait().await,
            },
        }
    };
    bar.finish_and_clear();
    end
}

fn describe(progress: &JobProgress) -> String {
    let mut line = format!(
        "{} job {} {}",
        progress.job_type.label(),
        progress.job_id,
        progress.status.as_str().to_lowercase()
    );
    if progress.total > 0 {
        line.push_str(&format!(" {}/{}", progress.current, progress.total));
    }
    if let Some(message) = &progress.message {
        line.push_str(&format!(" \u{00b7} {message}"));
    }
    line
}

/// Prints notifications to stderr.
pub struct StderrNotifier {
    pub quiet: bool,
}

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        tracing::debug!(?severity, "{message}");
        if self.quiet && severity != Severity::Error {
            return;
        }
        let mark = match severity {
            Severity::Success => "\u{2713}",
            Severity::Info => "\u{2192}",
            Severity::Warning => "!",
            Severity::Error => "\u{2717}",
        };
        eprintln!("  {mark} {message}");
    }
}

/// Run `prompt` with the spinner cleared and stopped.
fn suspended<T>(bar: Option<&ProgressBar>, prompt: impl FnOnce() -> T) -> T {
    match bar {
        Some(bar) => bar.suspend(prompt),
        None => prompt(),
    }
}

/// Asks on stdin; anything but y/yes declines. The spinner, if any, stays
/// off the terminal until the answer is read.
pub struct StdinConfirm {
    pub bar: Option<ProgressBar>,
}

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        let bar = self.bar.clone();
        let answer = tokio::task::spawn_blocking(move || {
            suspended(bar.as_ref(), || {
                eprint!("  ? {message} [y/N] ");
                let _ = std::io::stderr().flush();
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line).map(|_| line)
            })
        })
        .await;
        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "could not read confirmation");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "confirmation prompt panicked");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dats_types::{JobKind, JobStatus};
    use indicatif::{ProgressDrawTarget, TermLike};
    use std::sync::{Arc, Mutex};

    /// Terminal that records every write.
    #[derive(Debug, Clone, Default)]
    struct Recording(Arc<Mutex<Vec<String>>>);

    impl Recording {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }
    }

    impl TermLike for Recording {
        fn width(&self) -> u16 {
            80
        }

        fn move_cursor_up(&self, n: usize) -> std::io::Result<()> {
            self.push(format!("up {n}"));
            Ok(())
        }

        fn move_cursor_down(&self, n: usize) -> std::io::Result<()> {
            self.push(format!("down {n}"));
            Ok(())
        }

        fn move_cursor_right(&self, n: usize) -> std::io::Result<()> {
            self.push(format!("right {n}"));
            Ok(())
        }

        fn move_cursor_left(&self, n: usize) -> std::io::Result<()> {
            self.push(format!("left {n}"));
            Ok(())
        }

        fn write_line(&self, s: &str) -> std::io::Result<()> {
            self.push(format!("line {s}"));
            Ok(())
        }

        fn write_str(&self, s: &str) -> std::io::Result<()> {
            self.push(format!("str {s}"));
            Ok(())
        }

        fn clear_line(&self) -> std::io::Result<()> {
            self.push("clear");
            Ok(())
        }

        fn flush(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_prompt_is_not_overdrawn() {
        let term = Recording::default();
        let bar = ProgressBar::with_draw_target(
            None,
            ProgressDrawTarget::term_like(Box::new(term.clone())),
        );
        bar.set_message("Export job 42 running");
        bar.enable_steady_tick(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));

        suspended(Some(&bar), || {
            term.push("prompt");
            std::thread::sleep(Duration::from_millis(150));
            term.push("answer");
        });
        bar.finish_and_clear();

        let log = term.0.lock().unwrap();
        let prompt = log.iter().position(|entry| entry == "prompt").unwrap();
        assert_eq!(log[prompt + 1], "answer", "spinner drew during the prompt: {log:?}");
    }

    #[test]
    fn test_describe() {
        let progress = JobProgress {
            job_id: "7".into(),
            job_type: JobKind::Llm,
            status: JobStatus::Running,
            current: 2,
            total: 5,
            message: Some("Tagging document 2/5".into()),
            timestamp: String::new(),
        };
        assert_eq!(
            describe(&progress),
            "LLM job 7 running 2/5 \u{00b7} Tagging document 2/5"
        );
    }
}
