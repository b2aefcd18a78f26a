//! Track - one independent loop recorder/player voice
//!
//! Each track owns a loop buffer, a pre-roll ring, and the quantized state
//! machine that arbitrates between what was requested (the externally visible
//! `TrackState`) and what the buffer engine is actually doing this block
//! (`BufferState`). Requested transitions on a non-master track defer to the
//! transport's next quantized boundary; the master-tempo track commits
//! immediately and derives the shared tempo from its first recorded loop.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::engine::command::TrackIntent;
use crate::engine::loop_buffer::{LoopBuffer, RECORD_EDGE_FADE_SAMPLES};
use crate::engine::preroll::PreRollBuffer;
use crate::transport::{MasterGrant, TransportClock};
use crate::types::{Sample, TrackId};

/// Default track volume (unity)
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Externally visible track intent/state
///
/// The SHOULD_* states are the deferred half of a two-phase commit: the
/// request is taken now, the effect fires when the transport crosses the
/// stored deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackState {
    /// Quiescent baseline: nothing recorded, nothing pending
    Cleared = 0,
    /// Recording requested, waiting for the quantized boundary
    ShouldRecord = 1,
    /// Buffer is capturing input
    Recording = 2,
    /// Playback requested, waiting for the quantized boundary
    ShouldPlay = 3,
    /// Buffer is looping its recorded region
    Playing = 4,
    /// Clear requested, applied on the next transition pass
    ShouldClear = 5,
    /// Holding recorded content but silent
    Stopped = 6,
}

impl TrackState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TrackState::ShouldRecord,
            2 => TrackState::Recording,
            3 => TrackState::ShouldPlay,
            4 => TrackState::Playing,
            5 => TrackState::ShouldClear,
            6 => TrackState::Stopped,
            _ => TrackState::Cleared,
        }
    }
}

/// What the buffer engine is actually doing this block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferState {
    Stopped = 0,
    Recording = 1,
    Playing = 2,
}

/// Lock-free track state for UI access
///
/// The audio thread writes these atomics whenever the corresponding state
/// changes; the UI reads them without acquiring any lock. `Ordering::Relaxed`
/// everywhere since only visibility is needed.
pub struct TrackAtomics {
    /// Track state as TrackState discriminant
    pub state: AtomicU8,
    /// Buffer state as BufferState discriminant
    pub buffer_state: AtomicU8,
    /// Recorded loop length in samples
    pub recorded_len: AtomicU64,
    /// Playback position within the loop
    pub play_pos: AtomicU64,
    /// Whether this track currently owns the transport tempo
    pub master: AtomicBool,
}

impl TrackAtomics {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TrackState::Cleared as u8),
            buffer_state: AtomicU8::new(BufferState::Stopped as u8),
            recorded_len: AtomicU64::new(0),
            play_pos: AtomicU64::new(0),
            master: AtomicBool::new(false),
        }
    }

    /// Get the track state (lock-free)
    #[inline]
    pub fn state(&self) -> TrackState {
        TrackState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Get recorded loop length in samples (lock-free)
    #[inline]
    pub fn recorded_len(&self) -> u64 {
        self.recorded_len.load(Ordering::Relaxed)
    }

    /// Get playback position (lock-free)
    #[inline]
    pub fn play_pos(&self) -> u64 {
        self.play_pos.load(Ordering::Relaxed)
    }

    /// Whether the track owns the transport tempo (lock-free)
    #[inline]
    pub fn is_master(&self) -> bool {
        self.master.load(Ordering::Relaxed)
    }
}

impl Default for TrackAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// One looper track
pub struct Track {
    id: TrackId,
    state: TrackState,
    buffer_state: BufferState,
    loop_buffer: LoopBuffer,
    preroll: PreRollBuffer,

    // Deferred transition deadlines, absolute sample time; 0 = none pending
    quantized_record_start: u64,
    quantized_record_end: u64,
    quantized_play_start: u64,

    /// Pre-roll samples to splice at the next recording start
    pre_delay_samples: usize,
    /// Target gain (the loop buffer ramps toward it each block)
    volume: f32,

    /// Held while this track is the transport's tempo source
    master_grant: Option<MasterGrant>,
    clock: Arc<TransportClock>,
    atomics: Arc<TrackAtomics>,
    /// Set by any state transition, drained by the engine's group check
    state_dirty: bool,
}

impl Track {
    /// Create a cleared track with pre-allocated buffers
    pub fn new(
        id: TrackId,
        clock: Arc<TransportClock>,
        loop_capacity: usize,
        preroll_capacity: usize,
    ) -> Self {
        Self {
            id,
            state: TrackState::Cleared,
            buffer_state: BufferState::Stopped,
            loop_buffer: LoopBuffer::new(loop_capacity),
            preroll: PreRollBuffer::new(preroll_capacity),
            quantized_record_start: 0,
            quantized_record_end: 0,
            quantized_play_start: 0,
            pre_delay_samples: 0,
            volume: DEFAULT_VOLUME,
            master_grant: None,
            clock,
            atomics: Arc::new(TrackAtomics::new()),
            state_dirty: false,
        }
    }

    /// Track identifier (ordinal index)
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Externally visible state
    pub fn state(&self) -> TrackState {
        self.state
    }

    /// What the buffer engine is doing this block
    pub fn buffer_state(&self) -> BufferState {
        self.buffer_state
    }

    /// Recorded loop length in samples
    pub fn recorded_len(&self) -> usize {
        self.loop_buffer.recorded_len()
    }

    /// Whether this track currently owns the transport tempo
    pub fn is_master_tempo_track(&self) -> bool {
        self.master_grant.is_some()
    }

    /// Lock-free state handle for the UI
    pub fn atomics(&self) -> Arc<TrackAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Set the target volume (0.0 - 1.0); applied as a ramp next block
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Current target volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the pre-roll splice length for the next immediate recording start
    pub fn set_pre_delay(&mut self, samples: usize) {
        self.pre_delay_samples = samples.min(self.preroll.capacity());
    }

    /// Pre-roll splice length in samples
    pub fn pre_delay(&self) -> usize {
        self.pre_delay_samples
    }

    /// Take the master grant out of the track (engine-side release)
    pub(crate) fn take_master_grant(&mut self) -> Option<MasterGrant> {
        let grant = self.master_grant.take();
        if grant.is_some() {
            self.atomics.master.store(false, Ordering::Relaxed);
        }
        grant
    }

    /// Whether a transition happened since the engine last asked
    pub(crate) fn take_state_changed(&mut self) -> bool {
        std::mem::take(&mut self.state_dirty)
    }

    /// Consume one trigger event
    ///
    /// RecordOrPlay records from the quiescent states and plays otherwise;
    /// the other intents map directly.
    pub fn apply_intent(&mut self, intent: TrackIntent) {
        match intent {
            TrackIntent::RecordOrPlay => {
                if self.state == TrackState::Cleared || self.state == TrackState::Stopped {
                    self.set_state(TrackState::ShouldRecord);
                } else {
                    self.set_state(TrackState::ShouldPlay);
                }
            }
            TrackIntent::Play => self.set_state(TrackState::ShouldPlay),
            TrackIntent::Clear => self.set_state(TrackState::ShouldClear),
            TrackIntent::Stop => self.set_state(TrackState::Stopped),
        }
    }

    /// Process one audio block
    ///
    /// `block` carries the track's private copy of the engine input and is
    /// overwritten with this track's output. `now` is the engine's transport
    /// snapshot for this block, identical across all tracks.
    pub fn process_block(&mut self, block: &mut [Sample], now: u64) {
        self.resolve_pending(now);

        if self.buffer_state == BufferState::Recording {
            if !self.loop_buffer.write_block(block) {
                // Capacity reached: refuse the write entirely and stop
                self.set_state(TrackState::Stopped);
            }
        } else {
            // Keep the pre-roll window fresh for a future recording start
            self.preroll.push_block(block);
        }

        if self.buffer_state == BufferState::Playing {
            self.loop_buffer.read_block(block, self.volume);
        } else {
            self.loop_buffer.silence_block(block);
        }

        self.atomics
            .recorded_len
            .store(self.loop_buffer.recorded_len() as u64, Ordering::Relaxed);
        self.atomics
            .play_pos
            .store(self.loop_buffer.play_pos() as u64, Ordering::Relaxed);
    }

    /// Commit any deferred transition whose deadline this block reaches
    ///
    /// A deadline fires on the block that starts at or after it. Firing on
    /// equality matters: a block aligned exactly on the bar boundary must
    /// begin the new phase with its first sample, where a strict comparison
    /// would commit one full block late and drift off the grid.
    fn resolve_pending(&mut self, now: u64) {
        if self.quantized_record_start > 0 {
            if now >= self.quantized_record_start {
                // Quantized starts are scheduled ahead of time; the pre-roll
                // splice only compensates immediate (master) starts
                self.pre_delay_samples = 0;
                self.set_state(TrackState::Recording);
            }
        } else if self.quantized_record_end > 0 && now >= self.quantized_record_end {
            self.pre_delay_samples = 0;
            self.set_state(TrackState::Playing);
        }

        if self.quantized_play_start > 0 && now >= self.quantized_play_start {
            self.set_state(TrackState::Playing);
        }
    }

    /// The transition function
    ///
    /// Requests may be rewritten on the way through: SHOULD_RECORD becomes an
    /// immediate RECORDING on the master track, SHOULD_CLEAR lands in
    /// CLEARED, a STOP on a cleared track stays CLEARED.
    fn set_state(&mut self, requested: TrackState) {
        let mut new_state = requested;

        if new_state == TrackState::ShouldRecord {
            if self.master_grant.is_none() && !self.clock.has_master() {
                self.master_grant = self.clock.request_master(self.id);
                if self.master_grant.is_some() {
                    self.atomics.master.store(true, Ordering::Relaxed);
                }
            }
            if self.master_grant.is_some() {
                // First loop defines the grid: restart the timeline and
                // record immediately, no boundary to wait for
                self.clock.stop_transport();
                self.clock.start_transport();
                new_state = TrackState::Recording;
                self.quantized_record_start = 0;
            } else {
                // 0 is the no-deadline sentinel
                self.quantized_record_start = self.clock.next_quantized_boundary().max(1);
            }
        }

        if new_state == TrackState::Recording {
            self.buffer_state = BufferState::Recording;
            self.quantized_record_start = 0;
            if self.pre_delay_samples > 0 {
                self.loop_buffer
                    .begin_record_with_preroll(&self.preroll, self.pre_delay_samples);
            } else {
                self.loop_buffer.begin_record();
            }
        } else if self.state == TrackState::Recording && new_state == TrackState::ShouldPlay {
            if self.master_grant.is_some() {
                // Master recording just finished: trim the spliced pre-roll,
                // mask the seam, publish the tempo, and play right away
                self.loop_buffer.crop_end(self.pre_delay_samples);
                // The splice is consumed; the next recording needs a fresh arm
                self.pre_delay_samples = 0;
                self.loop_buffer.fade_edges(RECORD_EDGE_FADE_SAMPLES);
                self.quantized_record_end = 0;
                self.clock
                    .set_tempo_from_loop_length(self.loop_buffer.recorded_len() as u64);
                new_state = TrackState::Playing;
            } else {
                self.quantized_record_end = self.clock.next_quantized_boundary();
            }
        }

        if new_state == TrackState::ShouldPlay {
            // A later play request supersedes any pending record deadline
            self.quantized_record_end = 0;
            self.quantized_record_start = 0;
            self.quantized_play_start = self.clock.next_quantized_boundary().max(1);
        } else if new_state == TrackState::Playing {
            self.buffer_state = BufferState::Playing;
            self.quantized_record_end = 0;
            self.quantized_play_start = 0;
            self.loop_buffer.rewind_play();
        }

        if new_state == TrackState::ShouldClear {
            self.loop_buffer.reset();
            self.quantized_record_start = 0;
            self.quantized_record_end = 0;
            self.quantized_play_start = 0;
            self.volume = DEFAULT_VOLUME;
            new_state = TrackState::Cleared;
            self.buffer_state = BufferState::Stopped;
        }

        if new_state == TrackState::Stopped {
            self.buffer_state = BufferState::Stopped;
            // A stop never un-clears a track
            if self.state == TrackState::Cleared {
                new_state = TrackState::Cleared;
            }
        }

        self.state = new_state;
        self.state_dirty = true;
        self.atomics.state.store(self.state as u8, Ordering::Relaxed);
        self.atomics
            .buffer_state
            .store(self.buffer_state as u8, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn loop_buffer(&self) -> &LoopBuffer {
        &self.loop_buffer
    }

    #[cfg(test)]
    pub(crate) fn pending_record_start(&self) -> u64 {
        self.quantized_record_start
    }

    #[cfg(test)]
    pub(crate) fn pending_play_start(&self) -> u64 {
        self.quantized_play_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_clock() -> Arc<TransportClock> {
        Arc::new(TransportClock::new(48000))
    }

    fn make_track(clock: &Arc<TransportClock>) -> Track {
        Track::new(TrackId::new(0), Arc::clone(clock), 48000 * 4, 4096)
    }

    /// Drive one block through the track with a fixed input value
    fn run_block(track: &mut Track, value: Sample, len: usize, now: u64) -> Vec<Sample> {
        let mut block = vec![value; len];
        track.process_block(&mut block, now);
        block
    }

    #[test]
    fn test_new_track_is_cleared() {
        let clock = make_clock();
        let track = make_track(&clock);
        assert_eq!(track.state(), TrackState::Cleared);
        assert_eq!(track.buffer_state(), BufferState::Stopped);
        assert_eq!(track.recorded_len(), 0);
    }

    #[test]
    fn test_master_rec_play_trigger_records_immediately() {
        let clock = make_clock();
        let mut track = make_track(&clock);

        track.apply_intent(TrackIntent::RecordOrPlay);
        // No other master: granted, records with no deadline
        assert_eq!(track.state(), TrackState::Recording);
        assert_eq!(track.buffer_state(), BufferState::Recording);
        assert!(track.is_master_tempo_track());
        assert!(clock.is_playing());
        assert_eq!(track.pending_record_start(), 0);
    }

    #[test]
    fn test_non_master_defers_to_boundary() {
        let clock = make_clock();
        clock.set_tempo_from_loop_length(1000);
        clock.start_transport();
        let _grant = clock.request_master(TrackId::new(7)).unwrap();

        let mut track = make_track(&clock);
        clock.advance(100);
        track.apply_intent(TrackIntent::RecordOrPlay);
        assert_eq!(track.state(), TrackState::ShouldRecord);
        assert_eq!(track.buffer_state(), BufferState::Stopped);
        assert_eq!(track.pending_record_start(), 1000);

        // Before the boundary nothing commits
        run_block(&mut track, 0.5, 256, clock.current_sample_time());
        assert_eq!(track.state(), TrackState::ShouldRecord);

        // Once the clock passes the deadline the recording starts
        run_block(&mut track, 0.5, 256, 1001);
        assert_eq!(track.state(), TrackState::Recording);
        assert_eq!(track.buffer_state(), BufferState::Recording);
    }

    #[test]
    fn test_repeated_record_request_keeps_single_deadline() {
        let clock = make_clock();
        clock.set_tempo_from_loop_length(1000);
        clock.start_transport();
        let _grant = clock.request_master(TrackId::new(7)).unwrap();

        let mut track = make_track(&clock);
        clock.advance(100);
        track.apply_intent(TrackIntent::RecordOrPlay);
        let first = track.pending_record_start();
        // Second request before the boundary: still in ShouldRecord, so
        // RecordOrPlay now maps to ShouldPlay per the trigger table; use a
        // direct repeat through the state machine instead.
        track.set_state(TrackState::ShouldRecord);
        assert_eq!(track.pending_record_start(), first);
    }

    #[test]
    fn test_full_master_cycle_round_trip() {
        let clock = make_clock();
        let mut track = make_track(&clock);
        let block = 256;

        track.apply_intent(TrackIntent::RecordOrPlay);
        // Record 4 blocks of a recognizable signal
        for i in 0..4 {
            run_block(&mut track, 0.25, block, clock.current_sample_time());
            clock.advance(block);
            assert_eq!(track.recorded_len(), (i + 1) * block);
        }

        // Finish recording: master goes straight to playing and sets tempo
        track.apply_intent(TrackIntent::RecordOrPlay);
        assert_eq!(track.state(), TrackState::Playing);
        assert_eq!(track.buffer_state(), BufferState::Playing);
        assert_eq!(track.recorded_len(), 4 * block);
        assert_eq!(clock.samples_per_bar(), (4 * block) as u64);

        // Play two full loops; the first fades in from silence, the second
        // reproduces the signal outside the edge fade
        let mut played = Vec::new();
        for _ in 0..8 {
            played.extend(run_block(&mut track, 0.0, block, clock.current_sample_time()));
            clock.advance(block);
        }
        assert!(played[0].abs() < 1e-6);
        let len = 4 * block;
        let fade = RECORD_EDGE_FADE_SAMPLES;
        for i in fade..len - fade {
            let s = played[len + i];
            assert!((s - 0.25).abs() < 1e-6, "sample {} = {}", i, s);
        }
    }

    #[test]
    fn test_overflow_forces_stopped() {
        let clock = make_clock();
        let mut track = Track::new(TrackId::new(0), Arc::clone(&clock), 1000, 256);

        track.apply_intent(TrackIntent::RecordOrPlay);
        run_block(&mut track, 0.5, 900, clock.current_sample_time());
        assert_eq!(track.recorded_len(), 900);

        // Next block would exceed capacity: no write, forced stop
        run_block(&mut track, 0.5, 200, clock.current_sample_time());
        assert_eq!(track.state(), TrackState::Stopped);
        assert_eq!(track.buffer_state(), BufferState::Stopped);
        assert_eq!(track.recorded_len(), 900);
    }

    #[test]
    fn test_stop_on_cleared_stays_cleared() {
        let clock = make_clock();
        let mut track = make_track(&clock);

        track.apply_intent(TrackIntent::Stop);
        assert_eq!(track.state(), TrackState::Cleared);
    }

    #[test]
    fn test_clear_supersedes_pending_record() {
        let clock = make_clock();
        clock.set_tempo_from_loop_length(1000);
        clock.start_transport();
        let _grant = clock.request_master(TrackId::new(7)).unwrap();

        let mut track = make_track(&clock);
        track.apply_intent(TrackIntent::RecordOrPlay);
        assert_eq!(track.state(), TrackState::ShouldRecord);

        track.apply_intent(TrackIntent::Clear);
        assert_eq!(track.state(), TrackState::Cleared);
        assert_eq!(track.pending_record_start(), 0);
        assert_eq!(track.volume(), DEFAULT_VOLUME);
    }

    #[test]
    fn test_cleared_track_cannot_reach_playing_directly() {
        let clock = make_clock();
        clock.set_tempo_from_loop_length(1000);
        clock.start_transport();
        let _grant = clock.request_master(TrackId::new(7)).unwrap();

        let mut track = make_track(&clock);
        track.apply_intent(TrackIntent::Play);
        assert_eq!(track.state(), TrackState::ShouldPlay);

        // Deadline passes, but with nothing recorded playback degrades to
        // silence rather than misbehaving
        let out = run_block(&mut track, 0.5, 128, 1001);
        assert_eq!(track.state(), TrackState::Playing);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_pre_delay_seeds_recording_for_master() {
        let clock = make_clock();
        let mut track = make_track(&clock);
        track.set_pre_delay(64);

        // Feed some input while idle so the pre-roll holds it
        run_block(&mut track, 0.75, 256, 0);

        track.apply_intent(TrackIntent::RecordOrPlay);
        assert_eq!(track.state(), TrackState::Recording);
        // Record needle starts after the splice
        assert_eq!(track.recorded_len(), 64);
        assert!(track
            .loop_buffer()
            .recorded()
            .iter()
            .all(|&s| (s - 0.75).abs() < 1e-6));

        // Finishing trims the splice back off the end
        run_block(&mut track, 0.5, 256, clock.current_sample_time());
        track.apply_intent(TrackIntent::RecordOrPlay);
        assert_eq!(track.state(), TrackState::Playing);
        assert_eq!(track.recorded_len(), 256);
    }

    #[test]
    fn test_play_start_ramps_in_from_silence() {
        let clock = make_clock();
        clock.set_tempo_from_loop_length(512);
        clock.start_transport();
        let _grant = clock.request_master(TrackId::new(7)).unwrap();

        // Non-master loop: no edge fade is applied, so the onset depends
        // entirely on the gain ramp
        let mut track = make_track(&clock);
        track.apply_intent(TrackIntent::RecordOrPlay);
        clock.advance(512);
        run_block(&mut track, 0.5, 512, 512);
        assert_eq!(track.state(), TrackState::Recording);
        track.apply_intent(TrackIntent::Play);

        // The play deadline fires at the next bar; the first played block
        // ramps from zero up toward the full signal
        let out = run_block(&mut track, 0.0, 512, 1024);
        assert_eq!(track.state(), TrackState::Playing);
        assert!(out[0].abs() < 1e-6, "first sample = {}", out[0]);
        assert!(out[256] > 0.2 && out[256] < 0.3);
        assert!(out[511] > out[256]);

        // The next block holds steady at full gain
        let steady = run_block(&mut track, 0.0, 512, 1536);
        assert!(steady.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_play_request_supersedes_record_deadline() {
        let clock = make_clock();
        clock.set_tempo_from_loop_length(1000);
        clock.start_transport();
        let _grant = clock.request_master(TrackId::new(7)).unwrap();

        let mut track = make_track(&clock);
        track.apply_intent(TrackIntent::RecordOrPlay);
        assert!(track.pending_record_start() > 0);

        track.apply_intent(TrackIntent::Play);
        assert_eq!(track.pending_record_start(), 0);
        assert!(track.pending_play_start() > 0);
    }
}
