//! Batch slices.
//!
//! A slice is a half-open range `[start, end)` of the command queue that
//! runs concurrently. Parallelizable commands join the following slice
//! member; the first non-parallelizable command closes the slice (it is
//! included). Trailing parallelizable commands form a final slice that
//! runs to the end of the queue.
//!
//! ```text
//! queue:  [P][P][S][P][S][S]
//! slices: └──0..3─┘└3..5┘└5..6┘
//! ```

use std::ops::Range;

/// Half-open index range into the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSlice {
    start: usize,
    end: usize,
}

impl CommandSlice {
    /// The "no current slice" sentinel.
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn start(&self) -> usize {
        self.start
    }

    pub const fn end(&self) -> usize {
        self.end
    }

    pub const fn size(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end.max(self.start)
    }

    /// The slice starting at `from` in a queue of `len` commands.
    ///
    /// `is_parallel(i)` reports whether command `i` may run alongside the
    /// next one. Returns an empty slice when `from >= len`.
    pub fn next(from: usize, len: usize, is_parallel: impl Fn(usize) -> bool) -> Self {
        if from >= len {
            return Self::new(from, from);
        }
        let end = (from..len)
            .find(|&i| !is_parallel(i))
            .map_or(len, |i| i + 1);
        Self::new(from, end)
    }
}

impl Default for CommandSlice {
    fn default() -> Self {
        Self::EMPTY
    }
}
