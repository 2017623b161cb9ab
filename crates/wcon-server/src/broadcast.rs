//! The broadcast buffer: coalesces console output into periodic batches.
//!
//! Producers append fragments at arbitrary frequency; a fixed-period task
//! sanitizes the accumulated batch once and fans it out to every viewer.
//! Decoupling the two rates bounds sanitization cost under bursty output.

use crate::connection::ViewerRegistry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use wcon_core::{mark_fragment, sanitize, WireEvent};

/// Fixed flush period. Not configurable.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Accumulates console fragments between flush ticks.
///
/// `append` has no backpressure: between two ticks the pending batch grows
/// without bound. The 250 ms cadence keeps that bounded in practice; a
/// producer outrunning it is a known risk of this design, not handled here.
pub struct ConsoleBuffer {
    viewers: Arc<ViewerRegistry>,
    pending: Mutex<String>,
}

impl ConsoleBuffer {
    pub fn new(viewers: Arc<ViewerRegistry>) -> Self {
        Self {
            viewers,
            pending: Mutex::new(String::new()),
        }
    }

    /// Append a fragment. With a mark tag, the fragment is wrapped in its
    /// newline-delimited annotation; otherwise it is appended verbatim.
    pub fn append(&self, data: &str, mark: Option<&str>) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match mark {
            Some(tag) => pending.push_str(&mark_fragment(data, tag)),
            None => pending.push_str(data),
        }
    }

    /// Sanitize and broadcast the pending batch, then reset it.
    ///
    /// A no-op when nothing is pending. Fragments appended while the batch
    /// is being emitted roll into the next tick.
    pub async fn flush(&self) {
        let batch = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if pending.is_empty() {
                return;
            }
            std::mem::take(&mut *pending)
        };

        let clean = sanitize(&batch);
        self.viewers.broadcast(WireEvent::ConsoleData(clean)).await;
    }

    /// Start the periodic flush task. The task runs until the returned
    /// guard is dropped or cancelled.
    pub fn spawn_flush_task(self: &Arc<Self>) -> FlushTask {
        let buffer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                interval.tick().await;
                buffer.flush().await;
            }
        });
        debug!(period_ms = FLUSH_INTERVAL.as_millis() as u64, "flush task started");
        FlushTask { handle }
    }
}

/// Guard owning the periodic flush task; dropping it stops the task.
pub struct FlushTask {
    handle: JoinHandle<()>,
}

impl FlushTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ViewerHandle;
    use tokio::sync::mpsc;

    async fn buffer_with_viewer() -> (Arc<ConsoleBuffer>, mpsc::Receiver<WireEvent>) {
        let viewers = Arc::new(ViewerRegistry::new());
        let (viewer, rx) = ViewerHandle::new("127.0.0.1:1".into(), None);
        viewers.add(Arc::new(viewer)).await;
        (Arc::new(ConsoleBuffer::new(viewers)), rx)
    }

    fn batch_payload(event: WireEvent) -> String {
        match event {
            WireEvent::ConsoleData(data) => data,
            other => panic!("expected consoleData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn flush_emits_fragments_in_append_order_and_resets() {
        let (buffer, mut rx) = buffer_with_viewer().await;

        buffer.append("line one\n", None);
        buffer.append("something broke", Some("error"));
        buffer.append("line two\n", None);
        buffer.flush().await;

        let expected = sanitize(&format!(
            "line one\n{}line two\n",
            mark_fragment("something broke", "error")
        ));
        assert_eq!(batch_payload(rx.try_recv().unwrap()), expected);

        // Buffer is empty afterwards: the next flush emits nothing.
        buffer.flush().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let (buffer, mut rx) = buffer_with_viewer().await;
        buffer.flush().await;
        buffer.flush().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tagged_fragment_keeps_mark_and_loses_script() {
        let (buffer, mut rx) = buffer_with_viewer().await;

        buffer.append("<script>alert(1)</script>hi", Some("warn"));
        buffer.flush().await;

        let batch = batch_payload(rx.try_recv().unwrap());
        assert!(batch.starts_with("\n<mark class=\"consoleMark-warn\">"));
        assert!(batch.ends_with("</mark>\n"));
        assert!(!batch.contains("<script"));
    }

    #[tokio::test]
    async fn batch_goes_to_every_viewer() {
        let viewers = Arc::new(ViewerRegistry::new());
        let (v1, mut rx1) = ViewerHandle::new("a:1".into(), None);
        let (v2, mut rx2) = ViewerHandle::new("b:2".into(), None);
        viewers.add(Arc::new(v1)).await;
        viewers.add(Arc::new(v2)).await;
        let buffer = ConsoleBuffer::new(viewers);

        buffer.append("tick\n", None);
        buffer.flush().await;

        assert_eq!(batch_payload(rx1.try_recv().unwrap()), "tick\n");
        assert_eq!(batch_payload(rx2.try_recv().unwrap()), "tick\n");
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_flushes_on_the_fixed_period() {
        let (buffer, mut rx) = buffer_with_viewer().await;
        let _task = buffer.spawn_flush_task();

        buffer.append("first\n", None);
        tokio::time::sleep(FLUSH_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(batch_payload(rx.recv().await.unwrap()), "first\n");

        // Idle period: no emission.
        tokio::time::sleep(FLUSH_INTERVAL * 3).await;
        assert!(rx.try_recv().is_err());

        buffer.append("second\n", None);
        tokio::time::sleep(FLUSH_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(batch_payload(rx.recv().await.unwrap()), "second\n");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_guard_stops_the_task() {
        let (buffer, mut rx) = buffer_with_viewer().await;
        let task = buffer.spawn_flush_task();
        drop(task);

        buffer.append("orphan\n", None);
        tokio::time::sleep(FLUSH_INTERVAL * 4).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_never_lose_or_duplicate_fragments() {
        let (buffer, mut rx) = buffer_with_viewer().await;

        const PRODUCERS: usize = 4;
        const FRAGMENTS: usize = 50;

        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let buffer = Arc::clone(&buffer);
            producers.push(tokio::spawn(async move {
                for i in 0..FRAGMENTS {
                    buffer.append(&format!("[p{p}f{i}]"), None);
                    tokio::task::yield_now().await;
                }
            }));
        }

        // Flush repeatedly while producers are running, then once more to
        // drain whatever rolled into the last cycle.
        let flusher = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                for _ in 0..20 {
                    buffer.flush().await;
                    tokio::task::yield_now().await;
                }
            })
        };

        for producer in producers {
            producer.await.unwrap();
        }
        flusher.await.unwrap();
        buffer.flush().await;

        let mut combined = String::new();
        while let Ok(event) = rx.try_recv() {
            combined.push_str(&batch_payload(event));
        }

        for p in 0..PRODUCERS {
            let mut last_pos = None;
            for i in 0..FRAGMENTS {
                let fragment = format!("[p{p}f{i}]");
                let pos = combined.find(&fragment).unwrap_or_else(|| {
                    panic!("fragment {fragment} lost");
                });
                // Exactly once.
                assert!(combined[pos + fragment.len()..].find(&fragment).is_none());
                // Per-producer order preserved across batches.
                if let Some(last) = last_pos {
                    assert!(pos > last, "fragment {fragment} out of order");
                }
                last_pos = Some(pos);
            }
        }
    }
}
