//! In-memory pending-image buffer.
//!
//! FIFO by arrival. Shared between intake (append) and the batch
//! assembler (drain) behind one mutex; a crash before a batch is cut
//! loses the buffered images, which is the documented intake loss
//! window.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use shortcast_models::{ImageRef, SourceId};

pub type SharedBuffer = Arc<Mutex<PendingBuffer>>;

/// Create an empty shared buffer.
pub fn shared_buffer() -> SharedBuffer {
    Arc::new(Mutex::new(PendingBuffer::new()))
}

/// Ordered buffer of images awaiting batch assembly.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    entries: VecDeque<ImageRef>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_source(&self, source_id: &SourceId) -> bool {
        self.entries.iter().any(|e| &e.source_id == source_id)
    }

    /// Append at the back (arrival order).
    pub fn push(&mut self, image: ImageRef) {
        self.entries.push_back(image);
    }

    /// Receive time of the oldest buffered image.
    pub fn oldest_received_at(&self) -> Option<DateTime<Utc>> {
        self.entries.front().map(|e| e.received_at)
    }

    /// Remove and return the oldest `n` images in arrival order.
    pub fn take_oldest(&mut self, n: usize) -> Vec<ImageRef> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    /// Remove and return everything in arrival order.
    pub fn take_all(&mut self) -> Vec<ImageRef> {
        self.entries.drain(..).collect()
    }

    /// Put images back at the front, preserving their order.
    ///
    /// Used to undo a drain when job creation fails after the fact.
    pub fn restore_front(&mut self, images: Vec<ImageRef>) {
        for image in images.into_iter().rev() {
            self.entries.push_front(image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(n: u32) -> ImageRef {
        ImageRef::new(SourceId::new(format!("src-{n}")), format!("/tmp/{n}.jpg"), Utc::now())
    }

    #[test]
    fn test_fifo_order() {
        let mut buf = PendingBuffer::new();
        buf.push(image(1));
        buf.push(image(2));
        buf.push(image(3));

        let taken = buf.take_oldest(2);
        assert_eq!(taken[0].source_id.as_str(), "src-1");
        assert_eq!(taken[1].source_id.as_str(), "src-2");
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_take_oldest_clamps_to_len() {
        let mut buf = PendingBuffer::new();
        buf.push(image(1));
        assert_eq!(buf.take_oldest(10).len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_restore_front_preserves_order() {
        let mut buf = PendingBuffer::new();
        buf.push(image(3));

        buf.restore_front(vec![image(1), image(2)]);
        let all = buf.take_all();
        let ids: Vec<&str> = all.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["src-1", "src-2", "src-3"]);
    }

    #[test]
    fn test_contains_source() {
        let mut buf = PendingBuffer::new();
        buf.push(image(5));
        assert!(buf.contains_source(&SourceId::new("src-5")));
        assert!(!buf.contains_source(&SourceId::new("src-6")));
    }
}
