//! Bounded console history for replay on connect.
//!
//! Keeps the most recent output up to a byte capacity so a newly connected
//! viewer can receive immediate context without the supervisor holding
//! unbounded history.

/// A capacity-bounded text buffer that discards its oldest lines.
#[derive(Debug)]
pub struct HistoryBuffer {
    text: String,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a history buffer holding up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
        }
    }

    /// Append output, trimming the front when over capacity.
    ///
    /// Trimming cuts at a character boundary and then skips to the next
    /// newline so the retained history never starts mid-line.
    pub fn write(&mut self, data: &str) {
        if self.capacity == 0 {
            return;
        }
        self.text.push_str(data);

        if self.text.len() > self.capacity {
            let mut cut = self.text.len() - self.capacity;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            if let Some(newline) = self.text[cut..].find('\n') {
                cut += newline + 1;
            }
            self.text.replace_range(..cut, "");
        }
    }

    /// The retained history, oldest first.
    pub fn snapshot(&self) -> String {
        self.text.clone()
    }

    /// Number of bytes currently retained.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Drop all retained history.
    pub fn clear(&mut self) {
        self.text.clear();
    }
}
