//! Terminal output for `regsync run`: a spinner while the pool works and a
//! coloured summary of job outcomes.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::State;
use crate::store::RepJob;

/// Spinner shown while the pool drains the queue.
///
/// Job outcomes are coloured green (finished), red (error) and yellow
/// (stopped, canceled or still pending).
pub struct RunProgress {
    // Spinner from indicatif.
    pb: ProgressBar,
    // Style for finished jobs.
    green: Style,
    // Style for failed jobs.
    red: Style,
    // Style for warnings and jobs that did not finish.
    yellow: Style,
}

impl RunProgress {
    /// Starts the spinner for `requests` replication requests.
    pub fn start(requests: usize, workers: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("running {requests} requests on {workers} workers"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Prints a warning above the spinner.
    pub fn warn(&self, message: &str) {
        self.pb
            .println(format!("  {} {message}", self.yellow.apply_to("!")));
    }

    /// Clears the spinner and prints one line per job.
    pub fn finish(&self, jobs: &[RepJob]) {
        self.pb.finish_and_clear();
        for job in jobs {
            let (mark, style) = match job.status {
                State::Finished => ("✓", &self.green),
                State::Error => ("✗", &self.red),
                _ => ("■", &self.yellow),
            };
            let tags = if job.tags.is_empty() {
                "all tags".to_string()
            } else {
                job.tags.join(", ")
            };
            println!(
                "  {} job {} {} {} [{tags}]: {}",
                style.apply_to(mark),
                job.id,
                job.operation,
                job.repository,
                style.apply_to(job.status)
            );
        }
    }
}
