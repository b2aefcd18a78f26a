//! Circular loop sample store
//!
//! Fixed-capacity mono buffer with independent record and play needles.
//! Recording is a linear write; playback is a wraparound-safe read over the
//! recorded region with a per-block gain ramp so volume changes never insert
//! a discontinuity. Capacity is allocated once at track creation and never
//! grows on the audio thread.

use crate::engine::preroll::PreRollBuffer;
use crate::types::Sample;

/// Fade window applied at the recorded region's edges when a master-tempo
/// recording completes (~0.2ms at 48kHz, enough to mask the loop seam)
pub const RECORD_EDGE_FADE_SAMPLES: usize = 10;

/// Apply a linear gain ramp from `start` to `end` across the block
fn apply_gain_ramp(block: &mut [Sample], start: f32, end: f32) {
    if block.is_empty() {
        return;
    }
    let delta = (end - start) / block.len() as f32;
    let mut gain = start;
    for sample in block.iter_mut() {
        *sample *= gain;
        gain += delta;
    }
}

/// Per-track loop storage with record/play needles
///
/// Invariant while playing: `0 <= play_needle < record_needle <= capacity`.
pub struct LoopBuffer {
    data: Vec<Sample>,
    record_needle: usize,
    play_needle: usize,
    /// Gain at the end of the previous playback block, start point of the
    /// next ramp
    last_volume: f32,
}

impl LoopBuffer {
    /// Allocate a loop buffer of the given capacity in samples
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            record_needle: 0,
            play_needle: 0,
            last_volume: 0.0,
        }
    }

    /// Maximum recordable length in samples
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Effective loop length recorded so far
    #[inline]
    pub fn recorded_len(&self) -> usize {
        self.record_needle
    }

    /// Current playback position within the recorded region
    #[inline]
    pub fn play_pos(&self) -> usize {
        self.play_needle
    }

    /// Whether a write of `len` samples would exceed capacity
    #[inline]
    pub fn would_overflow(&self, len: usize) -> bool {
        self.record_needle + len > self.data.len()
    }

    /// Append one block at the record needle
    ///
    /// Returns `false` without writing anything if the block would run past
    /// capacity; the caller decides what to do with the track (forcing it to
    /// stop, per the overflow rule).
    pub fn write_block(&mut self, block: &[Sample]) -> bool {
        if self.would_overflow(block.len()) {
            return false;
        }
        self.data[self.record_needle..self.record_needle + block.len()].copy_from_slice(block);
        self.record_needle += block.len();
        true
    }

    /// Start a fresh recording at needle position zero
    pub fn begin_record(&mut self) {
        self.record_needle = 0;
    }

    /// Start a recording seeded with the last `pre_delay` pre-roll samples
    ///
    /// The splice compensates trigger latency: audio that already happened
    /// lands at the front of the loop and the record needle starts after it.
    pub fn begin_record_with_preroll(&mut self, preroll: &PreRollBuffer, pre_delay: usize) {
        let n = pre_delay.min(preroll.capacity()).min(self.data.len());
        preroll.copy_last_into(&mut self.data[..n]);
        self.record_needle = n;
    }

    /// Trim samples off the end of the recorded region
    pub fn crop_end(&mut self, samples: usize) {
        self.record_needle = self.record_needle.saturating_sub(samples);
        if self.play_needle >= self.record_needle {
            self.play_needle = 0;
        }
    }

    /// Symmetric fade-in/fade-out over the recorded region's edges
    ///
    /// Masks the seam that would otherwise click when the play needle wraps
    /// from end to start. Skipped when the region is too short to hold both
    /// ramps.
    pub fn fade_edges(&mut self, fade_len: usize) {
        if self.record_needle <= 2 * fade_len {
            return;
        }
        apply_gain_ramp(&mut self.data[..fade_len], 0.0, 1.0);
        let tail = self.record_needle - fade_len;
        apply_gain_ramp(&mut self.data[tail..self.record_needle], 1.0, 0.0);
    }

    /// Rewind playback to the loop start
    ///
    /// The gain ramp is left where the last block ended (zero after silence),
    /// so the first played block fades the loop in instead of jumping to full
    /// amplitude.
    pub fn rewind_play(&mut self) {
        self.play_needle = 0;
    }

    /// Copy looped content at the play needle into `out`, advancing and
    /// wrapping the needle. Caller guarantees `record_needle > 0`.
    fn copy_looped(&mut self, out: &mut [Sample]) {
        let mut written = 0;
        while written < out.len() {
            let run = (self.record_needle - self.play_needle).min(out.len() - written);
            out[written..written + run]
                .copy_from_slice(&self.data[self.play_needle..self.play_needle + run]);
            written += run;
            self.play_needle += run;
            if self.play_needle == self.record_needle {
                self.play_needle = 0;
            }
        }
    }

    /// Read one block of playback into `out`, wrapping within the recorded
    /// region, and ramp gain from the previous block's volume to `target_gain`
    ///
    /// A loop shorter than the block repeats as often as needed, so any block
    /// size reads the same signal a logically infinite repetition would give.
    /// With nothing recorded the read degrades to the silence ramp instead of
    /// dividing by zero.
    pub fn read_block(&mut self, out: &mut [Sample], target_gain: f32) {
        if self.record_needle == 0 {
            self.silence_block(out);
            return;
        }
        self.copy_looped(out);
        apply_gain_ramp(out, self.last_volume, target_gain);
        self.last_volume = target_gain;
    }

    /// Produce silence, ramping any remaining playback gain down to zero
    ///
    /// Keeps the stop transition click-free: the first silent block carries
    /// the loop tail fading from the last playback gain, every later one is
    /// exact zeros.
    pub fn silence_block(&mut self, out: &mut [Sample]) {
        if self.last_volume == 0.0 || self.record_needle == 0 {
            out.fill(0.0);
            self.last_volume = 0.0;
            return;
        }
        self.copy_looped(out);
        apply_gain_ramp(out, self.last_volume, 0.0);
        self.last_volume = 0.0;
    }

    /// Reset both needles (loop content becomes unreachable)
    pub fn reset(&mut self) {
        self.record_needle = 0;
        self.play_needle = 0;
    }

    /// Direct read-only view of the recorded region (tests, waveform display)
    pub fn recorded(&self) -> &[Sample] {
        &self.data[..self.record_needle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_signal(len: usize) -> Vec<Sample> {
        (0..len).map(|i| i as Sample).collect()
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let mut buf = LoopBuffer::new(1024);
        let signal = ramp_signal(512);
        assert!(buf.write_block(&signal));
        assert_eq!(buf.recorded_len(), 512);

        buf.last_volume = 1.0;
        let mut out = vec![0.0; 512];
        buf.read_block(&mut out, 1.0);
        assert_eq!(out, signal);
        // Exact-length read wraps the needle back to the loop start
        assert_eq!(buf.play_pos(), 0);
    }

    #[test]
    fn test_overflow_refuses_partial_write() {
        let mut buf = LoopBuffer::new(100);
        assert!(buf.write_block(&ramp_signal(96)));
        assert!(!buf.write_block(&ramp_signal(8)));
        // Needle unchanged, nothing written past the refusal
        assert_eq!(buf.recorded_len(), 96);
    }

    #[test]
    fn test_wraparound_matches_infinite_repetition() {
        let mut buf = LoopBuffer::new(64);
        let loop_sig = ramp_signal(5);
        assert!(buf.write_block(&loop_sig));

        // Block much larger than the loop: must read the loop repeated
        buf.last_volume = 1.0;
        let mut out = vec![0.0; 23];
        buf.read_block(&mut out, 1.0);
        for (i, &s) in out.iter().enumerate() {
            assert_eq!(s, loop_sig[i % 5], "sample {} diverges from repetition", i);
        }
        assert_eq!(buf.play_pos(), 23 % 5);
    }

    #[test]
    fn test_split_read_across_seam() {
        let mut buf = LoopBuffer::new(16);
        assert!(buf.write_block(&ramp_signal(8)));
        buf.last_volume = 1.0;

        let mut out = vec![0.0; 6];
        buf.read_block(&mut out, 1.0);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        buf.read_block(&mut out, 1.0);
        assert_eq!(out, [6.0, 7.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(buf.play_pos(), 4);
    }

    #[test]
    fn test_empty_read_is_silent() {
        let mut buf = LoopBuffer::new(16);
        let mut out = vec![1.0; 8];
        buf.read_block(&mut out, 1.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silence_ramps_down_then_zeroes() {
        let mut buf = LoopBuffer::new(16);
        assert!(buf.write_block(&vec![1.0; 8]));
        buf.last_volume = 1.0;

        let mut out = vec![0.0; 4];
        buf.silence_block(&mut out);
        // First block carries the loop tail fading from full gain to zero
        assert_eq!(out[0], 1.0);
        assert!(out[3] < 0.5);

        let mut out2 = vec![1.0; 4];
        buf.silence_block(&mut out2);
        assert!(out2.iter().all(|&s| s == 0.0));

        // Nothing recorded: silence is exact zeros regardless of gain
        let mut empty = LoopBuffer::new(16);
        empty.last_volume = 1.0;
        let mut out3 = vec![1.0; 4];
        empty.silence_block(&mut out3);
        assert!(out3.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fade_edges() {
        let mut buf = LoopBuffer::new(256);
        assert!(buf.write_block(&vec![1.0; 100]));
        buf.fade_edges(10);

        let rec = buf.recorded();
        assert_eq!(rec[0], 0.0);
        assert!(rec[9] < 1.0);
        assert_eq!(rec[50], 1.0);
        assert!(rec[95] < 0.6);
        // Region too short for both ramps is left untouched
        let mut short = LoopBuffer::new(32);
        assert!(short.write_block(&vec![1.0; 15]));
        short.fade_edges(10);
        assert!(short.recorded().iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_crop_end() {
        let mut buf = LoopBuffer::new(64);
        assert!(buf.write_block(&ramp_signal(50)));
        buf.crop_end(10);
        assert_eq!(buf.recorded_len(), 40);
        buf.crop_end(100);
        assert_eq!(buf.recorded_len(), 0);
    }

    #[test]
    fn test_gain_ramp_applied_across_block() {
        let mut buf = LoopBuffer::new(16);
        assert!(buf.write_block(&vec![1.0; 8]));
        buf.last_volume = 0.0;

        let mut out = vec![0.0; 8];
        buf.read_block(&mut out, 1.0);
        // Ramp starts at the previous volume and rises toward the target
        assert_eq!(out[0], 0.0);
        assert!(out[7] > out[1]);

        let mut out2 = vec![0.0; 8];
        buf.read_block(&mut out2, 1.0);
        // Second block holds steady at the target
        assert!(out2.iter().all(|&s| (s - 1.0).abs() < 1e-6 || s == 1.0));
    }
}
