//! Terminal output for the `jobset` binary: a spinner while an invocation
//! runs and a coloured per-job summary afterwards.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use jobset_core::{JobSet, JobStatus};

/// Spinner shown for the duration of one invocation.
pub struct InvocationProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl InvocationProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Stop the spinner and print one line per job, or the hard-stop notice.
    pub fn finish(&self, output: Option<&JobSet>) {
        self.pb.finish_and_clear();
        let Some(jobset) = output else {
            eprintln!("  {} No result: invocation hit a hard stop", self.red.apply_to("✗"));
            return;
        };

        for job in &jobset.jobs {
            let status = job
                .job_status
                .as_ref()
                .map(JobStatus::to_string)
                .unwrap_or_else(|| "-".to_string());
            let mark = if job.is_terminal_failure() {
                self.red.apply_to("✗")
            } else if job.job_status.as_ref().is_some_and(JobStatus::is_terminal) {
                self.green.apply_to("✓")
            } else {
                self.yellow.apply_to("•")
            };
            eprintln!("  {mark} {} [{status}]", job.product_id);
        }
        eprintln!(
            "  {} jobs, {} failed",
            jobset.len(),
            jobset.failed_count()
        );
    }
}
