use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Shortest pause between two scans.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Deletes files under `root` once they are older than `ttl`.
///
/// Deletion is best-effort: a file removed by someone else in the meantime
/// is not an error, and nothing stops the loop short of process exit.
/// Directories are left in place.
#[derive(Debug, Clone)]
pub struct Reaper {
    root: PathBuf,
    ttl: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl Reaper {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    /// Half the TTL, but never less than a second.
    pub fn interval(&self) -> Duration {
        (self.ttl / 2).max(MIN_INTERVAL)
    }

    /// One scan of the tree, treating `now` as the current time.
    pub fn reap_once(&self, now: SystemTime) -> ReapReport {
        let mut report = ReapReport::default();

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("Reaper skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            report.scanned += 1;

            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < self.ttl {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::info!(
                        "Deleted {} (age {}s)",
                        entry.path().display(),
                        age.as_secs()
                    );
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Failed to delete {}: {}", entry.path().display(), e);
                }
            }
        }

        report
    }

    /// Scan, sleep, repeat. Never returns.
    pub async fn run(self) {
        let interval = self.interval();
        loop {
            tracing::info!(
                "Reaper scanning {} (ttl {}s)",
                self.root.display(),
                self.ttl.as_secs()
            );
            let reaper = self.clone();
            match tokio::task::spawn_blocking(move || reaper.reap_once(SystemTime::now())).await {
                Ok(report) => tracing::debug!("Reaper cycle finished: {:?}", report),
                Err(e) => tracing::error!("Reaper cycle aborted: {}", e),
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const TTL: Duration = Duration::from_secs(600);

    fn touch(path: &std::path::Path, modified: SystemTime) {
        fs::write(path, b"data").unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[test]
    fn test_expired_file_is_deleted_and_fresh_file_survives() {
        let dir = tempfile::TempDir::new().unwrap();
        let now = SystemTime::now();
        let old = dir.path().join("old.png");
        let fresh = dir.path().join("fresh.png");
        touch(&old, now - TTL - Duration::from_secs(1));
        touch(&fresh, now - TTL / 2);

        let report = Reaper::new(dir.path(), TTL).reap_once(now);

        assert!(!old.exists());
        assert!(fresh.exists());
        assert_eq!(
            report,
            ReapReport {
                scanned: 2,
                deleted: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn test_age_equal_to_ttl_is_deleted() {
        let dir = tempfile::TempDir::new().unwrap();
        let now = SystemTime::now();
        let path = dir.path().join("edge.mp4");
        touch(&path, now - TTL);

        Reaper::new(dir.path(), TTL).reap_once(now);
        assert!(!path.exists());
    }

    #[test]
    fn test_nested_files_are_reaped_but_directories_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("output_files");
        fs::create_dir_all(&nested).unwrap();
        let now = SystemTime::now();
        let path = nested.join("processed_a.png");
        touch(&path, now - TTL * 2);

        let report = Reaper::new(dir.path(), TTL).reap_once(now);
        assert_eq!(report.deleted, 1);
        assert!(!path.exists());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_missing_root_is_not_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = Reaper::new(dir.path().join("nope"), TTL).reap_once(SystemTime::now());
        assert_eq!(report, ReapReport::default());
    }

    #[test]
    fn test_interval_is_half_ttl_with_floor() {
        assert_eq!(Reaper::new("x", TTL).interval(), Duration::from_secs(300));
        assert_eq!(
            Reaper::new("x", Duration::from_millis(500)).interval(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_spawned_reaper_runs_first_cycle_immediately() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stale.jpg");
        touch(&path, SystemTime::now() - TTL * 3);

        let handle = Reaper::new(dir.path(), TTL).spawn();
        for _ in 0..50 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        handle.abort();
        assert!(!path.exists());
    }
}
