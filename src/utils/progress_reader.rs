use std::io;
use std::io::SeekFrom;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Callback invoked with the cumulative number of bytes read so far.
/// Runs synchronously on the reading task, so it must be cheap.
pub type ProgressFn = Box<dyn Fn(u64) + Send + Sync>;

/// Wraps a seekable async byte source and reports cumulative bytes
/// consumed on every successful read, without changing read semantics.
///
/// Seek bookkeeping: seeking to the absolute start resets the counter,
/// relative seeks shift it by the delta, and seeks relative to the end
/// leave it untouched; after an end-relative seek the counter no
/// longer reflects the stream position. Known limitation; the upload
/// paths never seek that way.
pub struct ProgressReader<R> {
    inner: R,
    total_read: u64,
    on_progress: ProgressFn,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, on_progress: ProgressFn) -> Self {
        Self {
            inner,
            total_read: 0,
            on_progress,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.total_read
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n > 0 {
                    me.total_read += n as u64;
                    (me.on_progress)(me.total_read);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for ProgressReader<R> {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let me = self.get_mut();
        match position {
            SeekFrom::Start(offset) => me.total_read = offset,
            SeekFrom::Current(delta) => {
                me.total_read = me.total_read.saturating_add_signed(delta);
            }
            // Position relative to end is unknowable here; leave the counter.
            SeekFrom::End(_) => {}
        }
        Pin::new(&mut me.inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().inner).poll_complete(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    fn collecting_callback() -> (ProgressFn, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressFn = Box::new(move |total| sink.lock().unwrap().push(total));
        (cb, seen)
    }

    #[tokio::test]
    async fn reports_cumulative_bytes() {
        let (cb, seen) = collecting_callback();
        let mut reader = ProgressReader::new(Cursor::new(vec![7u8; 100]), cb);

        let mut buf = [0u8; 40];
        reader.read_exact(&mut buf).await.unwrap();
        reader.read_exact(&mut buf).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&80));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "must be monotonic");
        assert_eq!(reader.bytes_read(), 80);
    }

    #[tokio::test]
    async fn eof_read_does_not_fire_callback() {
        let (cb, seen) = collecting_callback();
        let mut reader = ProgressReader::new(Cursor::new(vec![1u8; 8]), cb);

        let mut all = Vec::new();
        reader.read_to_end(&mut all).await.unwrap();
        assert_eq!(all.len(), 8);

        // the final zero-byte read must not produce an update
        assert!(seen.lock().unwrap().iter().all(|&n| n > 0));
    }

    #[tokio::test]
    async fn rewind_resets_counter() {
        let (cb, _) = collecting_callback();
        let mut reader = ProgressReader::new(Cursor::new(vec![2u8; 64]), cb);

        let mut buf = [0u8; 64];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(reader.bytes_read(), 64);

        reader.seek(SeekFrom::Start(0)).await.unwrap();
        assert_eq!(reader.bytes_read(), 0);

        reader.seek(SeekFrom::Start(10)).await.unwrap();
        assert_eq!(reader.bytes_read(), 10);

        reader.seek(SeekFrom::Current(5)).await.unwrap();
        assert_eq!(reader.bytes_read(), 15);

        reader.seek(SeekFrom::Current(-3)).await.unwrap();
        assert_eq!(reader.bytes_read(), 12);
    }

    #[tokio::test]
    async fn end_relative_seek_leaves_counter() {
        let (cb, _) = collecting_callback();
        let mut reader = ProgressReader::new(Cursor::new(vec![3u8; 32]), cb);

        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf).await.unwrap();
        reader.seek(SeekFrom::End(-4)).await.unwrap();
        assert_eq!(reader.bytes_read(), 16);
    }
}
