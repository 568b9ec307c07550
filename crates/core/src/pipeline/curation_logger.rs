use std::path::Path;
use std::time::Instant;

use crate::pipeline::curation_summary::CurationSummary;
use crate::shared::rejection::Rejection;

/// Observer for per-video curation events.
///
/// Keeps the use case free of output concerns; the CLI reports through the
/// `log` facade and tests use the null logger.
pub trait CurationLogger: Send {
    /// Called before each video is processed.
    fn progress(&mut self, current: usize, total: usize);

    fn accepted(&mut self, video: &Path, identity_id: &str, created: bool);

    fn rejected(&mut self, video: &Path, rejection: &Rejection);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self, _summary: &CurationSummary) {}
}

pub struct NullCurationLogger;

impl CurationLogger for NullCurationLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn accepted(&mut self, _video: &Path, _identity_id: &str, _created: bool) {}
    fn rejected(&mut self, _video: &Path, _rejection: &Rejection) {}
    fn info(&mut self, _message: &str) {}
}

/// Logs through the `log` facade. Progress lines are throttled to every
/// `throttle_videos` videos.
pub struct StdoutCurationLogger {
    throttle_videos: usize,
    start_time: Instant,
    total_videos: usize,
    last_progress: Option<usize>,
}

impl StdoutCurationLogger {
    pub fn new(throttle_videos: usize) -> Self {
        Self {
            throttle_videos: throttle_videos.max(1),
            start_time: Instant::now(),
            total_videos: 0,
            last_progress: None,
        }
    }

    pub fn summary_string(&self, summary: &CurationSummary) -> String {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![
            format!(
                "Curation summary ({} videos, {elapsed:.1}s):",
                summary.processed()
            ),
            format!(
                "  accepted: {} ({} new identities, {} matched)",
                summary.accepted(),
                summary.created,
                summary.matched
            ),
            format!("  rejected: {}", summary.total_rejected()),
        ];
        for (kind, count) in &summary.rejected {
            lines.push(format!("    {kind:18}: {count}"));
        }
        lines.push(format!("  identities in database: {}", summary.identities));
        lines.join("\n")
    }
}

impl Default for StdoutCurationLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl CurationLogger for StdoutCurationLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.total_videos = total;
        if total > 0 && (current % self.throttle_videos == 0 || current == total) {
            self.last_progress = Some(current);
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processing: {current}/{total} videos ({pct:.1}%)");
        }
    }

    fn accepted(&mut self, video: &Path, identity_id: &str, created: bool) {
        let kind = if created { "new" } else { "matched" };
        log::info!("{} -> {identity_id} ({kind})", video.display());
    }

    fn rejected(&mut self, video: &Path, rejection: &Rejection) {
        log::debug!("{} rejected as {}", video.display(), rejection.kind());
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self, summary: &CurationSummary) {
        log::info!("\n\n{}", self.summary_string(summary));
    }
}
