//! Terminal progress bar fed from the engine's shared counters.

use std::sync::Arc;
use std::time::Duration;

use forum_import_engine::Progress;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Redraws a bar from [`Progress`] until [`finish`](Self::finish) is called.
pub struct ProgressTicker {
    bar: ProgressBar,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// Draw to stderr.
    pub fn spawn(progress: Arc<Progress>) -> Self {
        let style = ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self::with_bar(progress, bar)
    }

    pub fn with_bar(progress: Arc<Progress>, bar: ProgressBar) -> Self {
        let drawn = bar.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(REDRAW_INTERVAL);
            loop {
                interval.tick().await;
                let snapshot = progress.snapshot();
                drawn.set_length(snapshot.total);
                drawn.set_position(snapshot.processed());
                drawn.set_message(if snapshot.failed > 0 {
                    format!("{} imported, {} failed", snapshot.completed_total, snapshot.failed)
                } else {
                    format!("{} imported", snapshot.completed_total)
                });
            }
        });
        Self { bar, handle }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    /// Stop redrawing and wipe the bar from the terminal.
    pub fn finish(self) {
        self.handle.abort();
        self.bar.finish_and_clear();
    }
}
