use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::Duration;
use tracing::info;

/// Progress for a batch of per-host jobs: a bar on the terminal plus
/// periodic log lines with an extrapolated remaining time.
pub struct ProgressReporter {
    bar: ProgressBar,
    label: &'static str,
    total: usize,
    done: AtomicUsize,
    started: Instant,
    log_every: usize,
}

impl ProgressReporter {
    pub fn new(total: usize, label: &'static str, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar().template(
            "⟦{spinner:.bright_magenta}⟧ [{elapsed_precise}] \
             ⟨{bar:40.bright_green/bright_black}⟩ {pos}/{len} {msg} ({eta})",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        bar.set_message(label);

        Self {
            bar,
            label,
            total,
            done: AtomicUsize::new(0),
            started: Instant::now(),
            log_every: (total / 10).max(1),
        }
    }

    /// Count one finished host and return how many are done.
    pub fn advance(&self) -> usize {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.inc(1);

        if done % self.log_every == 0 || done == self.total {
            let elapsed = self.started.elapsed();
            info!(
                done,
                total = self.total,
                elapsed = %format_duration(elapsed),
                remaining = %format_duration(self.remaining(done, elapsed)),
                "{} progress",
                self.label
            );
        }
        done
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    /// Average time per finished host times the hosts still left.
    fn remaining(&self, done: usize, elapsed: Duration) -> Duration {
        if done == 0 || done >= self.total {
            return Duration::ZERO;
        }
        elapsed.mul_f64((self.total - done) as f64 / done as f64)
    }

    pub fn finish(&self, message: &'static str) {
        self.bar.finish_with_message(message);
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
