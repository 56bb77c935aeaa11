use crate::merger::{DirGroup, MergeListener, Stats};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Timing {
    // Time in seconds, used to throttle console output
    next_update: u64,
    start_time: Instant,
}

/// Prints counting progress, one `<fingerprint> <path>` line per duplicate
/// directory with `--` between groups, and a closing summary.
#[derive(Debug)]
pub struct UI {
    timing: Timing,
}

impl UI {
    pub fn new() -> Self {
        UI {
            timing: Timing {
                next_update: 0,
                start_time: Instant::now(),
            },
        }
    }
}

impl MergeListener for UI {
    fn file_counted(&mut self, path: &Path, stats: &Stats) {
        let elapsed = self.timing.start_time.elapsed().as_secs();
        if elapsed > self.timing.next_update {
            self.timing.next_update = elapsed + 1;
            println!("{} files counted. {} skipped. {}/…",
                stats.files_counted, stats.skipped,
                path.parent().unwrap_or(path).display());
        }
    }

    fn count_over(&mut self, stats: &Stats, duration: Duration) {
        println!("Counted {} files ({} entries skipped) in {}.",
            stats.files_counted, stats.skipped, nice_duration(duration));
    }

    fn group_member(&mut self, fingerprint: u64, path: &Path) {
        println!("{:016x} {}", fingerprint, path.display());
    }

    fn group_over(&mut self) {
        println!("--");
    }

    fn merge_over(&mut self, _groups: &[DirGroup], stats: &Stats, duration: Duration) {
        println!("Duplicate directory groups: {}. Reports merged: {}. Merge passes: {}. Total merge duration: {}",
            stats.groups_found, stats.fed, stats.merge_passes, nice_duration(duration));
    }
}

fn nice_duration(duration: Duration) -> String {
    match duration.as_secs() {
        x @ 0..=5 => format!("{:.1}s", (x * 1_000_000_000 + u64::from(duration.subsec_nanos())) as f64 / 1_000_000_000f64),
        x @ 6..=59 => format!("{}s", x),
        x => format!("{}m{}s", x / 60, x % 60),
    }
}

#[test]
fn durations_render_compactly() {
    assert_eq!(nice_duration(Duration::from_millis(1500)), "1.5s");
    assert_eq!(nice_duration(Duration::from_secs(42)), "42s");
    assert_eq!(nice_duration(Duration::from_secs(90)), "1m30s");
}
