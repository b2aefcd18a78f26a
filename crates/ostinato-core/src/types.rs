//! Common types for ostinato
//!
//! Fundamental audio types used throughout the looper: the mono sample
//! buffer the engine processes blocks with, track identifiers, and the
//! sizing constants shared by the engine and the audio backend.

use std::ops::{Index, IndexMut};

/// Default sample rate (48kHz - standard professional audio rate)
/// This is the default; the actual rate is read from the device at runtime.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of looper tracks created when no configuration says otherwise
pub const DEFAULT_NUM_TRACKS: usize = 8;

/// Hard upper bound on the number of looper tracks
pub const MAX_TRACKS: usize = 32;

/// Maximum loop length per track, in seconds
///
/// Each track pre-allocates `sample_rate * MAX_LOOP_SECONDS` mono samples at
/// creation so recording never allocates on the audio thread.
pub const MAX_LOOP_SECONDS: usize = 30;

/// Pre-roll ring capacity in samples (~340ms at 48kHz, covers trigger latency
/// for any realistic control path)
pub const PREROLL_CAPACITY: usize = 16384;

/// Audio sample type (32-bit float throughout the processing path)
pub type Sample = f32;

/// Looper track identifier (ordinal index into the engine's track list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub usize);

impl TrackId {
    /// Create a new track ID (panics if >= MAX_TRACKS)
    pub fn new(id: usize) -> Self {
        assert!(id < MAX_TRACKS, "Track ID must be less than {}", MAX_TRACKS);
        Self(id)
    }

    /// Get the raw index
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }

    /// Get the track number (1-based for display)
    pub fn display_number(&self) -> usize {
        self.0 + 1
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track {}", self.0)
    }
}

/// A buffer of mono samples
///
/// The primary block type the looper engine processes. Pre-allocate with
/// [`MonoBuffer::silence`] at the maximum block size, then adjust the working
/// length per callback with [`MonoBuffer::set_len_from_capacity`] - that
/// combination never allocates on the audio thread.
#[derive(Debug, Clone)]
pub struct MonoBuffer {
    samples: Vec<Sample>,
}

impl MonoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    /// Create a buffer from an existing Vec of samples
    pub fn from_vec(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Get the number of samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never allocates as long as `new_len` stays within the capacity the
    /// buffer was created with. Newly exposed samples are silenced.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, 0.0);
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Add another buffer to this one (summing samples)
    pub fn add_buffer(&mut self, other: &MonoBuffer) {
        debug_assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Copy from a slice (real-time safe if pre-allocated with enough capacity)
    pub fn copy_from_slice(&mut self, other: &[Sample]) {
        let len = other.len();
        debug_assert!(
            len <= self.samples.capacity(),
            "copy_from_slice: insufficient capacity ({} < {})",
            self.samples.capacity(),
            len
        );
        if self.samples.len() > len {
            self.samples.truncate(len);
        } else if self.samples.len() < len {
            self.samples.resize(len, 0.0);
        }
        self.samples[..len].copy_from_slice(other);
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.abs()).fold(0.0, Sample::max)
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sample> {
        self.samples.iter_mut()
    }
}

impl Index<usize> for MonoBuffer {
    type Output = Sample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for MonoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

impl Default for MonoBuffer {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_buffer() {
        let buf = MonoBuffer::silence(64);
        assert_eq!(buf.len(), 64);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_set_len_from_capacity_silences_new_samples() {
        let mut buf = MonoBuffer::silence(256);
        buf.as_mut_slice().fill(1.0);
        buf.set_len_from_capacity(16);
        assert_eq!(buf.len(), 16);
        buf.set_len_from_capacity(256);
        assert_eq!(buf.len(), 256);
        // Samples beyond the truncation point were re-silenced
        assert_eq!(buf[255], 0.0);
        assert_eq!(buf[15], 1.0);
    }

    #[test]
    fn test_add_and_scale() {
        let mut a = MonoBuffer::from_vec(vec![1.0, 2.0, 3.0]);
        let b = MonoBuffer::from_vec(vec![0.5, 0.5, 0.5]);
        a.add_buffer(&b);
        assert_eq!(a.as_slice(), &[1.5, 2.5, 3.5]);
        a.scale(2.0);
        assert_eq!(a.as_slice(), &[3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_track_id_display() {
        let id = TrackId::new(3);
        assert_eq!(id.display_number(), 4);
        assert_eq!(format!("{}", id), "track 3");
    }
}
