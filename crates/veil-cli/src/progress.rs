//! Demo progress display and timing summaries.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress over a fixed number of simulated devices
pub struct DemoProgress {
    bar: ProgressBar,
}

impl DemoProgress {
    /// Create a new progress tracker
    #[must_use]
    pub fn new(total_clients: u64) -> Self {
        let bar = ProgressBar::new(total_clients);

        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} clients")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message("Running exchanges");

        Self { bar }
    }

    /// Record one finished client
    pub fn inc(&self) {
        self.bar.inc(1);
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Timing samples for one phase of the demo
#[derive(Debug, Default, Clone)]
pub struct Timings {
    samples: Vec<Duration>,
}

impl Timings {
    /// Add a sample
    pub fn record(&mut self, sample: Duration) {
        self.samples.push(sample);
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Mean sample, zero when empty
    #[must_use]
    pub fn mean(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / u32::try_from(self.samples.len()).unwrap_or(u32::MAX)
    }

    /// Largest sample, zero when empty
    #[must_use]
    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or_default()
    }
}

/// Format a duration in human-readable units
///
/// # Example
///
/// ```text
/// format_duration(Duration::from_micros(1500)) == "1.50 ms"
/// ```
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos < 1_000 {
        format!("{nanos} ns")
    } else if nanos < 1_000_000 {
        format!("{:.2} µs", nanos as f64 / 1e3)
    } else if nanos < 1_000_000_000 {
        format!("{:.2} ms", nanos as f64 / 1e6)
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}
