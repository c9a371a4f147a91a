//! Progress bar for batch runs.

use indicatif::{ProgressBar, ProgressStyle};
use nfe_core::KeyProgress;

/// Per-key progress bar; hidden when progress output is disabled.
pub(crate) struct BatchProgress {
    bar: ProgressBar,
    failed: usize,
}

impl BatchProgress {
    pub(crate) fn new(enabled: bool, total: usize) -> Self {
        let bar = if enabled {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar, failed: 0 }
    }

    pub(crate) fn record(&mut self, progress: &KeyProgress<'_>) {
        if !progress.success {
            self.failed += 1;
        }
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.position as u64);
        self.bar.set_message(format!("{} ({} failed)", progress.key, self.failed));
    }

    pub(crate) fn finish(self) {
        self.bar.finish_and_clear();
    }

    #[cfg(test)]
    fn failed(&self) -> usize {
        self.failed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::BatchProgress;
    use nfe_core::{KeyProgress, NfeKey};

    #[test]
    fn test_hidden_progress_counts_failures() {
        let key = NfeKey::parse("51240228517882000186550010000090161000270486").unwrap();
        let mut progress = BatchProgress::new(false, 2);

        progress.record(&KeyProgress {
            position: 1,
            total: 2,
            key: &key,
            success: false,
        });
        progress.record(&KeyProgress {
            position: 2,
            total: 2,
            key: &key,
            success: true,
        });

        assert_eq!(progress.failed(), 1);
        progress.finish();
    }
}
