use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Preparing,
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    /// Legal transitions: preparing → uploading → {completed, failed}.
    /// Terminal states are sticky.
    pub fn can_transition(&self, next: UploadStatus) -> bool {
        match self {
            UploadStatus::Preparing => {
                matches!(next, UploadStatus::Uploading | UploadStatus::Failed)
            }
            UploadStatus::Uploading => {
                matches!(next, UploadStatus::Completed | UploadStatus::Failed)
            }
            UploadStatus::Completed | UploadStatus::Failed => false,
        }
    }
}

/// Per-upload progress snapshot, polled by clients while the upload runs.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    #[serde(with = "crate::utils::idgen::string_id")]
    #[schema(value_type = String)]
    pub upload_id: u64,
    pub file_name: String,
    /// Declared size in bytes.
    pub total_size: i64,
    /// Bytes transferred so far.
    pub uploaded: i64,
    /// ceil(total_size / chunk_size); 0 or 1 on the single-shot path.
    /// Reporting only, never a loop bound.
    pub total_parts: i32,
    /// 1-based part just completed; 0 before the first part.
    pub current_part: i32,
    /// Derived, clamped to [0, 100]; forced to exactly 100 on completion.
    pub percentage: f64,
    /// Derived, bytes per second since start_time.
    pub speed: f64,
    pub status: UploadStatus,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub provider: String,
    pub bucket: String,
    pub key: String,
}

impl UploadProgress {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        upload_id: u64,
        file_name: String,
        total_size: i64,
        total_parts: i32,
        user_id: String,
        provider: String,
        bucket: String,
        key: String,
    ) -> Self {
        Self {
            upload_id,
            file_name,
            total_size,
            uploaded: 0,
            total_parts,
            current_part: 0,
            percentage: 0.0,
            speed: 0.0,
            status: UploadStatus::Preparing,
            start_time: Utc::now(),
            user_id,
            provider,
            bucket,
            key,
        }
    }
}

/// ceil(total_size / chunk_size) as a part count.
pub fn total_parts_for(total_size: i64, chunk_size: i64) -> i32 {
    if total_size <= 0 || chunk_size <= 0 {
        return 0;
    }
    ((total_size + chunk_size - 1) / chunk_size) as i32
}

#[derive(Debug, PartialEq, Eq)]
struct ScheduledRemoval {
    due: DateTime<Utc>,
    upload_id: u64,
}

impl Ord for ScheduledRemoval {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due
            .cmp(&other.due)
            .then(self.upload_id.cmp(&other.upload_id))
    }
}

impl PartialOrd for ScheduledRemoval {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Process-local registry of in-flight upload progress.
///
/// A single writer (the upload task) mutates each record; polling
/// handlers read concurrently. The whole map sits behind one RwLock
/// and every operation holds it only for a few field writes.
///
/// Cleanup is consolidated into one background task (see
/// [`ProgressTracker::spawn_cleanup`]) that services both the
/// grace-period delay queue and the retention sweep; there is never a
/// timer task per upload.
///
/// Constructed once at startup and injected wherever progress is
/// written or read, so tests can run isolated instances.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    uploads: RwLock<HashMap<u64, UploadProgress>>,
    removals: Mutex<BinaryHeap<Reverse<ScheduledRemoval>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, progress: UploadProgress) {
        let mut uploads = self.uploads.write().expect("progress lock poisoned");
        debug!(
            upload_id = progress.upload_id,
            file_name = %progress.file_name,
            "progress record created"
        );
        uploads.insert(progress.upload_id, progress);
    }

    /// Records cumulative bytes and the part just completed, and
    /// recomputes the derived percentage and speed. Stale values are
    /// accepted as-is; the single owning upload task is trusted.
    pub fn update(&self, upload_id: u64, uploaded: i64, current_part: i32) {
        let mut uploads = self.uploads.write().expect("progress lock poisoned");
        if let Some(progress) = uploads.get_mut(&upload_id) {
            progress.uploaded = uploaded;
            progress.current_part = current_part;
            if progress.total_size > 0 {
                progress.percentage =
                    (uploaded as f64 / progress.total_size as f64 * 100.0).clamp(0.0, 100.0);
            }
            let elapsed = (Utc::now() - progress.start_time).num_milliseconds() as f64 / 1000.0;
            if elapsed > 0.0 {
                progress.speed = uploaded as f64 / elapsed;
            }
        }
    }

    /// Applies a status transition. Illegal transitions (anything out
    /// of a terminal state) are ignored. Completion is the source of
    /// truth: it forces `uploaded` and `percentage` to their final
    /// values regardless of the last update's accounting.
    pub fn set_status(&self, upload_id: u64, status: UploadStatus) {
        let mut uploads = self.uploads.write().expect("progress lock poisoned");
        if let Some(progress) = uploads.get_mut(&upload_id) {
            if !progress.status.can_transition(status) {
                debug!(
                    upload_id,
                    from = ?progress.status,
                    to = ?status,
                    "ignoring illegal status transition"
                );
                return;
            }
            progress.status = status;
            if status == UploadStatus::Completed {
                progress.uploaded = progress.total_size;
                progress.percentage = 100.0;
            }
        }
    }

    /// Returns a committed snapshot, or `None` for unknown or already
    /// expired ids; callers treat that as "no progress info", not an
    /// error.
    pub fn get(&self, upload_id: u64) -> Option<UploadProgress> {
        let uploads = self.uploads.read().expect("progress lock poisoned");
        uploads.get(&upload_id).cloned()
    }

    /// Snapshot of every tracked upload.
    pub fn get_all(&self) -> Vec<UploadProgress> {
        let uploads = self.uploads.read().expect("progress lock poisoned");
        uploads.values().cloned().collect()
    }

    pub fn remove(&self, upload_id: u64) {
        let mut uploads = self.uploads.write().expect("progress lock poisoned");
        uploads.remove(&upload_id);
    }

    pub fn len(&self) -> usize {
        self.uploads.read().expect("progress lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers the record for removal once the grace period elapses,
    /// so late pollers still observe the terminal state for a while.
    pub fn schedule_removal(&self, upload_id: u64, grace: Duration) {
        let due = Utc::now()
            + chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::minutes(5));
        let mut removals = self.removals.lock().expect("removal queue lock poisoned");
        removals.push(Reverse(ScheduledRemoval { due, upload_id }));
    }

    /// Removes entries whose scheduled grace period has elapsed.
    /// Returns how many were removed.
    pub fn reap_due(&self) -> usize {
        let now = Utc::now();
        let mut due_ids = Vec::new();
        {
            let mut removals = self.removals.lock().expect("removal queue lock poisoned");
            while let Some(Reverse(head)) = removals.peek() {
                if head.due > now {
                    break;
                }
                let Reverse(entry) = removals.pop().expect("peeked entry vanished");
                due_ids.push(entry.upload_id);
            }
        }
        let count = due_ids.len();
        if count > 0 {
            let mut uploads = self.uploads.write().expect("progress lock poisoned");
            for id in due_ids {
                uploads.remove(&id);
            }
        }
        count
    }

    /// Evicts every record older than `max_age`, whatever its status.
    /// O(n) over tracked uploads; the safety net behind the per-upload
    /// scheduled removal.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut uploads = self.uploads.write().expect("progress lock poisoned");
        let before = uploads.len();
        uploads.retain(|_, progress| {
            (now - progress.start_time)
                .to_std()
                .unwrap_or(Duration::ZERO)
                <= max_age
        });
        before - uploads.len()
    }

    /// Starts the single per-process cleanup task: every `every`, reap
    /// grace-expired records and sweep anything past `retention`.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        every: Duration,
        retention: Duration,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        info!(
            interval_secs = every.as_secs(),
            retention_secs = retention.as_secs(),
            "🧹 Progress cleanup task started"
        );
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let reaped = tracker.reap_due();
                let swept = tracker.sweep_expired(retention);
                if reaped + swept > 0 {
                    debug!(reaped, swept, remaining = tracker.len(), "progress cleanup pass");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(upload_id: u64, total_size: i64, total_parts: i32) -> UploadProgress {
        UploadProgress::new(
            upload_id,
            "video.mp4".to_string(),
            total_size,
            total_parts,
            "user-1".to_string(),
            "aws_s3".to_string(),
            "media".to_string(),
            "2026-08-30/1/video/1.mp4".to_string(),
        )
    }

    #[test]
    fn total_parts_is_ceiling_division() {
        assert_eq!(total_parts_for(25_000_000, 10_000_000), 3);
        assert_eq!(total_parts_for(10_000_000, 10_000_000), 1);
        assert_eq!(total_parts_for(10_000_001, 10_000_000), 2);
        assert_eq!(total_parts_for(1, 10_000_000), 1);
        assert_eq!(total_parts_for(0, 10_000_000), 0);
    }

    #[test]
    fn update_recomputes_percentage_and_speed() {
        let tracker = ProgressTracker::new();
        tracker.create(sample(1, 1000, 1));

        tracker.update(1, 250, 1);
        let snapshot = tracker.get(1).unwrap();
        assert_eq!(snapshot.uploaded, 250);
        assert_eq!(snapshot.current_part, 1);
        assert!((snapshot.percentage - 25.0).abs() < f64::EPSILON);

        tracker.update(1, 1000, 1);
        let snapshot = tracker.get(1).unwrap();
        assert!((snapshot.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn uploaded_is_monotonic_over_update_sequence() {
        let tracker = ProgressTracker::new();
        tracker.create(sample(7, 30 * 1024 * 1024, 3));

        let mut last = 0;
        for (bytes, part) in [(10, 1), (20, 2), (30, 3)] {
            let bytes = bytes * 1024 * 1024;
            tracker.update(7, bytes, part);
            let snapshot = tracker.get(7).unwrap();
            assert!(snapshot.uploaded >= last);
            assert!(snapshot.uploaded <= snapshot.total_size);
            last = snapshot.uploaded;
        }
    }

    #[test]
    fn status_only_moves_forward() {
        let tracker = ProgressTracker::new();
        tracker.create(sample(2, 10, 1));

        tracker.set_status(2, UploadStatus::Uploading);
        assert_eq!(tracker.get(2).unwrap().status, UploadStatus::Uploading);

        // preparing is not reachable again
        tracker.set_status(2, UploadStatus::Preparing);
        assert_eq!(tracker.get(2).unwrap().status, UploadStatus::Uploading);

        tracker.set_status(2, UploadStatus::Completed);
        assert_eq!(tracker.get(2).unwrap().status, UploadStatus::Completed);

        // terminal states are sticky
        tracker.set_status(2, UploadStatus::Uploading);
        assert_eq!(tracker.get(2).unwrap().status, UploadStatus::Completed);
        tracker.set_status(2, UploadStatus::Failed);
        assert_eq!(tracker.get(2).unwrap().status, UploadStatus::Completed);
    }

    #[test]
    fn failed_is_sticky_too() {
        let tracker = ProgressTracker::new();
        tracker.create(sample(3, 10, 1));
        tracker.set_status(3, UploadStatus::Uploading);
        tracker.set_status(3, UploadStatus::Failed);
        tracker.set_status(3, UploadStatus::Completed);
        assert_eq!(tracker.get(3).unwrap().status, UploadStatus::Failed);
    }

    #[test]
    fn completion_overrides_last_update() {
        let tracker = ProgressTracker::new();
        tracker.create(sample(4, 5000, 1));
        tracker.set_status(4, UploadStatus::Uploading);
        tracker.update(4, 4200, 1);

        tracker.set_status(4, UploadStatus::Completed);
        let snapshot = tracker.get(4).unwrap();
        assert_eq!(snapshot.uploaded, 5000);
        assert!((snapshot.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn get_unknown_id_is_none() {
        let tracker = ProgressTracker::new();
        assert!(tracker.get(99).is_none());
        // remove of an unknown id is harmless
        tracker.remove(99);
    }

    #[test]
    fn sweep_evicts_only_stale_records() {
        let tracker = ProgressTracker::new();

        let mut stale = sample(10, 100, 1);
        stale.start_time = Utc::now() - chrono::Duration::hours(25);
        tracker.create(stale);

        let mut fresh = sample(11, 100, 1);
        fresh.start_time = Utc::now() - chrono::Duration::hours(1);
        tracker.create(fresh);

        let swept = tracker.sweep_expired(Duration::from_secs(24 * 3600));
        assert_eq!(swept, 1);
        assert!(tracker.get(10).is_none());
        assert!(tracker.get(11).is_some());
    }

    #[test]
    fn scheduled_removal_reaps_after_grace() {
        let tracker = ProgressTracker::new();
        tracker.create(sample(20, 100, 1));
        tracker.create(sample(21, 100, 1));

        tracker.schedule_removal(20, Duration::ZERO);
        tracker.schedule_removal(21, Duration::from_secs(300));

        assert_eq!(tracker.reap_due(), 1);
        assert!(tracker.get(20).is_none(), "grace elapsed, record gone");
        assert!(tracker.get(21).is_some(), "still within grace period");
        assert_eq!(tracker.reap_due(), 0);
    }
}
