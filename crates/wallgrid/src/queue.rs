//! Bounded-concurrency download queue.
//!
//! Tasks are admitted strictly in submission order, never more than
//! [`MAX_CONCURRENT_DOWNLOADS`] at a time. Each admitted task runs the
//! fetcher on its own worker thread and reports back over a channel; the
//! thread driving the grid drains that channel once per frame with
//! [`DownloadQueue::poll`], which is also what re-admits pending work as
//! capacity frees up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::debug;

use crate::gif::{DecodeError, GifImage};

pub const MAX_CONCURRENT_DOWNLOADS: usize = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {url} failed: {reason}")]
    Http { url: String, reason: String },
    #[error("decoding {url} failed: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },
}

/// Routes a completion back to the row that asked for it. Ids are unique per
/// row instance, so completions addressed to rows discarded by a grid rebuild
/// simply fail to match and are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(pub(crate) u64);

/// Fetches and decodes the image behind `url`. Called from queue worker
/// threads; implementations may block.
pub trait FetchImage: Send + Sync {
    fn fetch(&self, url: &str) -> Result<GifImage, FetchError>;
}

#[derive(Debug)]
pub struct DownloadTask {
    pub row: RowId,
    pub url: String,
}

/// Outcome of one task. Delivered exactly once, success or failure.
pub struct TaskCompletion {
    pub row: RowId,
    pub url: String,
    pub result: Result<Arc<GifImage>, FetchError>,
}

pub struct DownloadQueue {
    fetcher: Arc<dyn FetchImage>,
    pending: VecDeque<DownloadTask>,
    active: usize,
    max_concurrent: usize,
    completion_tx: Sender<TaskCompletion>,
    completion_rx: Receiver<TaskCompletion>,
}

impl DownloadQueue {
    pub fn new(fetcher: Arc<dyn FetchImage>) -> Self {
        Self::with_limit(fetcher, MAX_CONCURRENT_DOWNLOADS)
    }

    pub fn with_limit(fetcher: Arc<dyn FetchImage>, max_concurrent: usize) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            fetcher,
            pending: VecDeque::new(),
            active: 0,
            max_concurrent,
            completion_tx,
            completion_rx,
        }
    }

    /// Enqueues a task and starts it immediately if capacity allows.
    pub fn submit(&mut self, task: DownloadTask) {
        self.pending.push_back(task);
        self.admit();
    }

    /// Drains finished tasks. Every drained completion frees a slot and
    /// re-runs admission, so the queue cannot stall while work is pending.
    pub fn poll(&mut self) -> Vec<TaskCompletion> {
        let mut completed = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.active -= 1;
            self.admit();
            completed.push(completion);
        }
        completed
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn admit(&mut self) {
        while self.active < self.max_concurrent {
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.active += 1;
            debug!(url = %task.url, active = self.active, "starting gif download");

            let fetcher = Arc::clone(&self.fetcher);
            let tx = self.completion_tx.clone();
            thread::spawn(move || {
                let result = fetcher.fetch(&task.url).map(Arc::new);
                // The receiver only goes away when the queue is dropped, at
                // which point nobody cares about the result.
                let _ = tx.send(TaskCompletion {
                    row: task.row,
                    url: task.url,
                    result,
                });
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gif::{GifFrame, GifImage};
    use std::time::{Duration, Instant};

    fn test_image() -> GifImage {
        GifImage::from_frames(
            2,
            1,
            vec![GifFrame {
                delay: Duration::ZERO,
                rgba: vec![0; 8],
            }],
        )
        .unwrap()
    }

    /// Fetcher whose calls block until the test releases them, one result per
    /// release in release order.
    struct GatedFetcher {
        gate: Receiver<Result<GifImage, FetchError>>,
    }

    impl FetchImage for GatedFetcher {
        fn fetch(&self, url: &str) -> Result<GifImage, FetchError> {
            // a closed gate just fails the fetch, so workers still in flight
            // when a test finishes wind down quietly
            self.gate.recv().unwrap_or_else(|_| {
                Err(FetchError::Http {
                    url: url.to_string(),
                    reason: "gate closed".into(),
                })
            })
        }
    }

    fn gated_queue(limit: usize) -> (DownloadQueue, Sender<Result<GifImage, FetchError>>) {
        let (gate_tx, gate_rx) = unbounded();
        let queue = DownloadQueue::with_limit(Arc::new(GatedFetcher { gate: gate_rx }), limit);
        (queue, gate_tx)
    }

    fn poll_until(queue: &mut DownloadQueue, want: usize) -> Vec<TaskCompletion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut drained = Vec::new();
        while drained.len() < want {
            drained.extend(queue.poll());
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {want} completions"
            );
            thread::sleep(Duration::from_millis(2));
        }
        drained
    }

    fn submit_numbered(queue: &mut DownloadQueue, count: usize) {
        for idx in 0..count {
            queue.submit(DownloadTask {
                row: RowId(idx as u64),
                url: format!("gif-{idx}"),
            });
        }
    }

    #[test]
    fn respects_concurrency_cap() {
        let (mut queue, gate) = gated_queue(2);
        submit_numbered(&mut queue, 5);

        assert_eq!(queue.active(), 2);
        assert_eq!(queue.pending(), 3);

        gate.send(Ok(test_image())).unwrap();
        let completed = poll_until(&mut queue, 1);

        assert_eq!(completed.len(), 1);
        assert!(completed[0].result.is_ok());
        assert_eq!(queue.active(), 2, "completion admits the next pending task");
        assert_eq!(queue.pending(), 2);
    }

    #[test]
    fn drains_everything_in_bounded_batches() {
        let (mut queue, gate) = gated_queue(3);
        submit_numbered(&mut queue, 7);

        for _ in 0..7 {
            gate.send(Ok(test_image())).unwrap();
        }
        let completed = poll_until(&mut queue, 7);

        assert_eq!(completed.len(), 7);
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.pending(), 0);

        // every submitted task completed exactly once
        let mut urls: Vec<_> = completed.iter().map(|c| c.url.clone()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 7);
    }

    #[test]
    fn errors_surface_in_the_completion() {
        let (mut queue, gate) = gated_queue(1);
        queue.submit(DownloadTask {
            row: RowId(0),
            url: "broken".into(),
        });

        gate.send(Err(FetchError::Http {
            url: "broken".into(),
            reason: "connection refused".into(),
        }))
        .unwrap();

        let completed = poll_until(&mut queue, 1);
        assert!(completed[0].result.is_err());
        assert_eq!(queue.active(), 0);
    }

    #[test]
    fn admission_is_fifo() {
        let (mut queue, gate) = gated_queue(1);
        submit_numbered(&mut queue, 3);

        let mut seen = Vec::new();
        for _ in 0..3 {
            gate.send(Ok(test_image())).unwrap();
            let completed = poll_until(&mut queue, 1);
            seen.push(completed[0].url.clone());
        }
        // one slot means completions observe exact submission order
        assert_eq!(seen, ["gif-0", "gif-1", "gif-2"]);
    }
}
