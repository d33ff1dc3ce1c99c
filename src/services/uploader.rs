use crate::services::progress::ProgressTracker;
use crate::services::storage::{CompletedPartInfo, ObjectStorage, StorageError};
use crate::utils::progress_reader::ProgressReader;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};
use tracing::{debug, error, info, warn};

/// How a transfer failed. Timeout and cancellation are surfaced
/// separately from everything else so the coordinator can give
/// distinct user-facing messages and callers can decide about
/// retrying.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload timed out; retry or use a smaller file")]
    TimedOut,

    #[error("upload was cancelled before it completed")]
    Cancelled,

    #[error("upload failed: {0}")]
    Failed(#[source] anyhow::Error),
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TimedOut => UploadError::TimedOut,
            StorageError::Cancelled => UploadError::Cancelled,
            StorageError::Other(e) => UploadError::Failed(e),
        }
    }
}

/// Moves bytes from an inbound stream into a provider bucket, either
/// in one deadline-bound write or as a sequential multipart session,
/// pushing every increment into the progress tracker. No retries at
/// this layer.
pub struct Uploader {
    tracker: Arc<ProgressTracker>,
    chunk_size: usize,
    single_timeout: Duration,
}

impl Uploader {
    pub fn new(tracker: Arc<ProgressTracker>, chunk_size: usize, single_timeout: Duration) -> Self {
        Self {
            tracker,
            chunk_size,
            single_timeout,
        }
    }

    /// One bounded write of the whole payload. The backend receives
    /// exactly one put call; progress comes from the instrumented
    /// reader, always as part 1. Returns the destination key.
    pub async fn upload_single<R>(
        &self,
        storage: Arc<dyn ObjectStorage>,
        source: R,
        bucket: &str,
        key: &str,
        upload_id: u64,
    ) -> Result<String, UploadError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        debug!(upload_id, key, "single-shot upload starting");

        let tracker = Arc::clone(&self.tracker);
        let mut reader = ProgressReader::new(
            source,
            Box::new(move |read| tracker.update(upload_id, read as i64, 1)),
        );

        let transfer = async {
            let mut payload = Vec::new();
            reader
                .read_to_end(&mut payload)
                .await
                .map_err(|e| UploadError::Failed(e.into()))?;
            storage
                .put_object(bucket, key, payload)
                .await
                .map_err(UploadError::from)
        };

        match tokio::time::timeout(self.single_timeout, transfer).await {
            Ok(Ok(())) => {
                info!(upload_id, key, "single-shot upload finished");
                Ok(key.to_string())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(UploadError::TimedOut),
        }
    }

    /// Sequential multipart session: open, upload parts 1..n, complete.
    /// One chunk buffer of memory; the loop ends on a short read, never
    /// on the reported part count. Any part failure aborts the remote
    /// session best-effort and surfaces the original error.
    pub async fn upload_chunked<R>(
        &self,
        storage: Arc<dyn ObjectStorage>,
        mut source: R,
        bucket: &str,
        key: &str,
        upload_id: u64,
        total_size: i64,
    ) -> Result<String, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        info!(
            upload_id,
            key,
            total_size,
            chunk_size = self.chunk_size,
            "chunked upload starting"
        );

        let session = storage
            .create_multipart_upload(bucket, key)
            .await
            .map_err(UploadError::from)?;

        let mut completed_parts: Vec<CompletedPartInfo> = Vec::new();
        let mut part_number: i32 = 1;
        let mut uploaded: i64 = 0;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let filled = match fill_chunk(&mut source, &mut buffer).await {
                Ok(n) => n,
                Err(err) => {
                    self.abort_session(&*storage, bucket, key, &session).await;
                    return Err(UploadError::Failed(err.into()));
                }
            };
            if filled == 0 {
                break;
            }

            match storage
                .upload_part(bucket, key, &session, part_number, buffer[..filled].to_vec())
                .await
            {
                Ok(etag) => {
                    uploaded += filled as i64;
                    self.tracker.update(upload_id, uploaded, part_number);
                    if let Some(progress) = self.tracker.get(upload_id) {
                        debug!(
                            upload_id,
                            part_number,
                            part_size = filled,
                            uploaded,
                            percentage = progress.percentage,
                            "part uploaded"
                        );
                    }
                    completed_parts.push(CompletedPartInfo { part_number, etag });
                }
                Err(err) => {
                    warn!(upload_id, part_number, error = %err, "part upload failed");
                    self.abort_session(&*storage, bucket, key, &session).await;
                    return Err(err.into());
                }
            }

            part_number += 1;
            if filled < self.chunk_size {
                // short read: end of stream
                break;
            }
        }

        storage
            .complete_multipart_upload(bucket, key, &session, completed_parts)
            .await
            .map_err(UploadError::from)?;

        info!(upload_id, key, parts = part_number - 1, uploaded, "chunked upload finished");
        Ok(key.to_string())
    }

    /// Best-effort: an abort failure is logged but never replaces the
    /// error that triggered it.
    async fn abort_session(&self, storage: &dyn ObjectStorage, bucket: &str, key: &str, session: &str) {
        if let Err(abort_err) = storage.abort_multipart_upload(bucket, key, session).await {
            error!(key, error = %abort_err, "failed to abort multipart session");
        }
    }
}

/// Reads until the buffer is full or the stream ends; returns bytes filled.
async fn fill_chunk<R: AsyncRead + Unpin>(
    source: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = source.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::progress::{UploadProgress, UploadStatus, total_parts_for};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::Mutex;

    const MIB: usize = 1024 * 1024;

    #[derive(Debug, PartialEq, Eq, Clone)]
    enum Call {
        Put { size: usize },
        Create,
        Part { number: i32, size: usize },
        Complete { parts: Vec<i32> },
        Abort,
    }

    #[derive(Default)]
    struct MockStorage {
        calls: Mutex<Vec<Call>>,
        fail_on_part: Option<i32>,
        put_delay: Option<Duration>,
    }

    impl MockStorage {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStorage for MockStorage {
        async fn put_object(&self, _: &str, _: &str, data: Vec<u8>) -> Result<(), StorageError> {
            if let Some(delay) = self.put_delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().unwrap().push(Call::Put { size: data.len() });
            Ok(())
        }

        async fn create_multipart_upload(&self, _: &str, _: &str) -> Result<String, StorageError> {
            self.calls.lock().unwrap().push(Call::Create);
            Ok("session-1".into())
        }

        async fn upload_part(
            &self,
            _: &str,
            _: &str,
            _: &str,
            part_number: i32,
            data: Vec<u8>,
        ) -> Result<String, StorageError> {
            if self.fail_on_part == Some(part_number) {
                return Err(StorageError::Other(anyhow::anyhow!(
                    "injected failure on part {part_number}"
                )));
            }
            self.calls.lock().unwrap().push(Call::Part {
                number: part_number,
                size: data.len(),
            });
            Ok(format!("etag-{part_number}"))
        }

        async fn complete_multipart_upload(
            &self,
            _: &str,
            _: &str,
            _: &str,
            parts: Vec<CompletedPartInfo>,
        ) -> Result<(), StorageError> {
            self.calls.lock().unwrap().push(Call::Complete {
                parts: parts.iter().map(|p| p.part_number).collect(),
            });
            Ok(())
        }

        async fn abort_multipart_upload(&self, _: &str, _: &str, _: &str) -> Result<(), StorageError> {
            self.calls.lock().unwrap().push(Call::Abort);
            Ok(())
        }

        async fn presigned_url(
            &self,
            _: &str,
            _: &str,
            _: Duration,
        ) -> Result<String, StorageError> {
            Ok("https://example.test/signed".into())
        }
    }

    fn tracked(tracker: &Arc<ProgressTracker>, upload_id: u64, total_size: i64, chunk: i64) {
        tracker.create(UploadProgress::new(
            upload_id,
            "payload.bin".into(),
            total_size,
            total_parts_for(total_size, chunk),
            "user-1".into(),
            "minio".into(),
            "bucket".into(),
            "key".into(),
        ));
        tracker.set_status(upload_id, UploadStatus::Uploading);
    }

    #[tokio::test]
    async fn single_shot_small_file() {
        let tracker = Arc::new(ProgressTracker::new());
        let storage = Arc::new(MockStorage::default());
        let uploader = Uploader::new(tracker.clone(), 10 * MIB, Duration::from_secs(600));

        let size = 5 * MIB;
        tracked(&tracker, 1, size as i64, (10 * MIB) as i64);

        let key = uploader
            .upload_single(
                storage.clone(),
                Cursor::new(vec![0u8; size]),
                "bucket",
                "k/5m.bin",
                1,
            )
            .await
            .unwrap();

        assert_eq!(key, "k/5m.bin");
        assert_eq!(storage.calls(), vec![Call::Put { size }]);

        let progress = tracker.get(1).unwrap();
        assert_eq!(progress.current_part, 1);
        assert_eq!(progress.uploaded, size as i64);
    }

    #[tokio::test]
    async fn single_shot_deadline_exceeded() {
        let tracker = Arc::new(ProgressTracker::new());
        let storage = Arc::new(MockStorage {
            put_delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let uploader = Uploader::new(tracker.clone(), 10 * MIB, Duration::from_millis(10));
        tracked(&tracker, 2, 16, 1);

        let err = uploader
            .upload_single(storage, Cursor::new(vec![0u8; 16]), "bucket", "k", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TimedOut));
    }

    #[tokio::test]
    async fn chunked_23_mib_runs_three_sequential_parts() {
        let tracker = Arc::new(ProgressTracker::new());
        let storage = Arc::new(MockStorage::default());
        let uploader = Uploader::new(tracker.clone(), 10 * MIB, Duration::from_secs(600));

        let size = 23 * MIB; // 24_117_248 bytes
        tracked(&tracker, 3, size as i64, (10 * MIB) as i64);

        uploader
            .upload_chunked(
                storage.clone(),
                Cursor::new(vec![0u8; size]),
                "bucket",
                "k/23m.bin",
                3,
                size as i64,
            )
            .await
            .unwrap();

        let calls = storage.calls();
        assert_eq!(
            calls,
            vec![
                Call::Create,
                Call::Part { number: 1, size: 10 * MIB },
                Call::Part { number: 2, size: 10 * MIB },
                Call::Part { number: 3, size: 3 * MIB },
                Call::Complete { parts: vec![1, 2, 3] },
            ]
        );

        let progress = tracker.get(3).unwrap();
        assert_eq!(progress.total_parts, 3);
        assert_eq!(progress.current_part, 3);
        assert_eq!(progress.uploaded, 24_117_248);
    }

    #[tokio::test]
    async fn chunk_aligned_stream_does_not_emit_empty_part() {
        let tracker = Arc::new(ProgressTracker::new());
        let storage = Arc::new(MockStorage::default());
        let uploader = Uploader::new(tracker.clone(), 1024, Duration::from_secs(600));

        tracked(&tracker, 4, 2048, 1024);
        uploader
            .upload_chunked(storage.clone(), Cursor::new(vec![0u8; 2048]), "b", "k", 4, 2048)
            .await
            .unwrap();

        let parts: Vec<_> = storage
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Part { .. }))
            .collect();
        assert_eq!(
            parts,
            vec![
                Call::Part { number: 1, size: 1024 },
                Call::Part { number: 2, size: 1024 },
            ]
        );
    }

    #[tokio::test]
    async fn part_failure_aborts_and_surfaces_original_error() {
        let tracker = Arc::new(ProgressTracker::new());
        let storage = Arc::new(MockStorage {
            fail_on_part: Some(2),
            ..Default::default()
        });
        let uploader = Uploader::new(tracker.clone(), 1024, Duration::from_secs(600));

        tracked(&tracker, 5, 3072, 1024);
        let err = uploader
            .upload_chunked(storage.clone(), Cursor::new(vec![0u8; 3072]), "b", "k", 5, 3072)
            .await
            .unwrap_err();

        match err {
            UploadError::Failed(source) => {
                assert!(source.to_string().contains("part 2"), "got: {source}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        let calls = storage.calls();
        assert!(calls.contains(&Call::Abort), "abort must be issued");
        assert!(
            !calls.iter().any(|c| matches!(c, Call::Complete { .. })),
            "session must not be completed"
        );

        // only part 1 made it into the progress record
        let progress = tracker.get(5).unwrap();
        assert_eq!(progress.current_part, 1);
        assert_eq!(progress.uploaded, 1024);
    }
}
