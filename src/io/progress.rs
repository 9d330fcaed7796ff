//! Terminal progress bar fed by retrieval progress events

use crate::io::configuration::PROGRESS_BAR_WIDTH;
use crate::retrieval::engine::ProgressEvent;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::sync::LazyLock;

static ITERATION_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{prefix}} [{{elapsed_precise}}] [{{bar:{PROGRESS_BAR_WIDTH}.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
});

/// Iteration progress of a single retrieval run
#[derive(Debug)]
pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    /// Visible bar labelled with the file name of `source`
    pub fn new(source: &Path, max_iterations: usize) -> Self {
        let bar = ProgressBar::new(max_iterations as u64);
        bar.set_style(ITERATION_STYLE.clone());
        bar.set_prefix(
            source
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        );
        Self { bar }
    }

    /// Bar that draws nothing
    pub fn hidden(max_iterations: usize) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(max_iterations as u64),
            ProgressDrawTarget::hidden(),
        );
        Self { bar }
    }

    /// Bar shown unless `quiet`
    pub fn for_run(source: &Path, max_iterations: usize, quiet: bool) -> Self {
        if quiet {
            Self::hidden(max_iterations)
        } else {
            Self::new(source, max_iterations)
        }
    }

    /// Advance to the iteration in `event` and show its error metrics
    pub fn update(&self, event: &ProgressEvent) {
        self.bar.set_position(event.iteration as u64);
        self.bar.set_message(Self::message(event));
    }

    /// Status text for an event
    pub fn message(event: &ProgressEvent) -> String {
        let mse_diff = event
            .mse_diff
            .map_or_else(|| "-".to_string(), |d| format!("{d:.2E}"));
        format!(
            "mse {:.2E} | Δmse {mse_diff} | Δpupil {:.2E}",
            event.mse, event.pupil_diff
        )
    }

    /// Iteration currently shown
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Leave the bar on screen with a closing message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Remove the bar from the screen
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}
