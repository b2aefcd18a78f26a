//! Pre-roll ring buffer
//!
//! Small rolling window of the most recent input. While a track is not
//! recording, every incoming block lands here, so when a recording starts
//! with a pre-delay the already-elapsed audio can be spliced in front of the
//! loop instead of being lost to trigger latency.

use crate::types::Sample;

/// Fixed-capacity mono ring continuously fed with recent input
pub struct PreRollBuffer {
    data: Vec<Sample>,
    /// Next write position
    write_pos: usize,
    /// Samples written so far, saturating at capacity
    filled: usize,
}

impl PreRollBuffer {
    /// Create a ring of the given capacity (allocated once, up front)
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            write_pos: 0,
            filled: 0,
        }
    }

    /// Ring capacity in samples
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// How many valid samples the ring currently holds
    #[inline]
    pub fn available(&self) -> usize {
        self.filled
    }

    /// Push one block of input, overwriting the oldest samples
    ///
    /// Blocks longer than the ring keep only their trailing `capacity`
    /// samples, which is all a later splice could ever use.
    pub fn push_block(&mut self, block: &[Sample]) {
        let cap = self.data.len();
        if cap == 0 {
            return;
        }
        let src = if block.len() > cap {
            &block[block.len() - cap..]
        } else {
            block
        };

        let first = (cap - self.write_pos).min(src.len());
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        if rest > 0 {
            self.data[..rest].copy_from_slice(&src[first..]);
        }
        self.write_pos = (self.write_pos + src.len()) % cap;
        self.filled = (self.filled + src.len()).min(cap);
    }

    /// Copy the most recent `dest.len()` samples into `dest`, oldest first
    ///
    /// If fewer samples have been captured than requested, the missing head
    /// is silence.
    pub fn copy_last_into(&self, dest: &mut [Sample]) {
        let cap = self.data.len();
        let want = dest.len().min(cap);
        let have = want.min(self.filled);
        let pad = dest.len() - have;
        dest[..pad].fill(0.0);

        // Read `have` samples ending at write_pos
        let start = (self.write_pos + cap - have) % cap;
        let first = (cap - start).min(have);
        dest[pad..pad + first].copy_from_slice(&self.data[start..start + first]);
        let rest = have - first;
        if rest > 0 {
            dest[pad + first..].copy_from_slice(&self.data[..rest]);
        }
    }

    /// Forget everything captured so far
    pub fn reset(&mut self) {
        self.write_pos = 0;
        self.filled = 0;
    }
}
