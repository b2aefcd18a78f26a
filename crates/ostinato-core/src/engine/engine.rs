//! LooperEngine - the audio-thread owner of all tracks
//!
//! The engine lives on the real-time thread once the stream starts. Each
//! block it drains the lock-free command queue, hands every track a private
//! copy of the input, sums the track outputs into the mix, and advances the
//! shared transport. Nothing here allocates after construction.

use std::sync::Arc;

use crate::engine::command::{LooperCommand, TrackIntent};
use crate::engine::track::{Track, TrackAtomics, TrackState};
use crate::transport::TransportClock;
use crate::types::{MonoBuffer, Sample, TrackId, MAX_TRACKS, PREROLL_CAPACITY};

/// Largest audio block the engine will accept per process call
pub const MAX_BLOCK_SIZE: usize = 8192;

pub struct LooperEngine {
    tracks: Vec<Track>,
    /// Track targeted by the *Selected commands; None targets nothing
    selected: Option<usize>,
    clock: Arc<TransportClock>,
    /// Per-track input copy, reused across blocks
    track_scratch: MonoBuffer,
    /// Output accumulator, reused across blocks
    mix: MonoBuffer,
    loop_capacity: usize,
}

impl LooperEngine {
    /// Create an engine with `num_tracks` cleared tracks
    ///
    /// `max_loop_seconds` bounds each track's loop buffer; all audio memory
    /// is allocated here, before the engine moves to the audio thread.
    pub fn new(num_tracks: usize, sample_rate: u32, max_loop_seconds: usize) -> Self {
        let num_tracks = num_tracks.clamp(1, MAX_TRACKS);
        let clock = Arc::new(TransportClock::new(sample_rate));
        let loop_capacity = sample_rate as usize * max_loop_seconds;
        let tracks = (0..num_tracks)
            .map(|i| {
                Track::new(
                    TrackId::new(i),
                    Arc::clone(&clock),
                    loop_capacity,
                    PREROLL_CAPACITY,
                )
            })
            .collect();
        log::info!(
            "looper engine: {} tracks, {} Hz, {}s max loop",
            num_tracks,
            sample_rate,
            max_loop_seconds
        );
        Self {
            tracks,
            selected: None,
            clock,
            track_scratch: MonoBuffer::silence(MAX_BLOCK_SIZE),
            mix: MonoBuffer::silence(MAX_BLOCK_SIZE),
            loop_capacity,
        }
    }

    /// Shared transport handle
    pub fn transport(&self) -> Arc<TransportClock> {
        Arc::clone(&self.clock)
    }

    /// Lock-free per-track state handles for the UI, in track order
    pub fn track_atomics(&self) -> Vec<Arc<TrackAtomics>> {
        self.tracks.iter().map(|t| t.atomics()).collect()
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.selected
    }

    /// Resize the track set; valid only before the engine moves to the
    /// audio thread (allocates)
    pub fn set_track_count(&mut self, num_tracks: usize) {
        let num_tracks = num_tracks.clamp(1, MAX_TRACKS);
        while self.tracks.len() > num_tracks {
            if let Some(mut track) = self.tracks.pop() {
                // A dropped master track must hand the tempo back, or no
                // surviving track could ever claim it
                if let Some(grant) = track.take_master_grant() {
                    self.clock.release_master(grant);
                }
            }
        }
        while self.tracks.len() < num_tracks {
            let id = TrackId::new(self.tracks.len());
            self.tracks.push(Track::new(
                id,
                Arc::clone(&self.clock),
                self.loop_capacity,
                PREROLL_CAPACITY,
            ));
        }
        if let Some(sel) = self.selected {
            if sel >= self.tracks.len() {
                self.selected = None;
            }
        }
        log::info!("looper engine resized to {} tracks", num_tracks);
    }

    /// Drain and apply every queued command
    pub fn process_commands(&mut self, consumer: &mut rtrb::Consumer<LooperCommand>) {
        while let Ok(command) = consumer.pop() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: LooperCommand) {
        match command {
            LooperCommand::Trigger { track, intent } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.apply_intent(intent);
                }
            }
            LooperCommand::TriggerSelected(intent) => {
                if let Some(t) = self.selected.and_then(|i| self.tracks.get_mut(i)) {
                    t.apply_intent(intent);
                }
            }
            LooperCommand::SelectTrack(index) => {
                self.selected = index.filter(|&i| i < self.tracks.len());
            }
            LooperCommand::SetVolume { track, volume } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.set_volume(volume);
                }
            }
            LooperCommand::SetSelectedVolume(volume) => {
                if let Some(t) = self.selected.and_then(|i| self.tracks.get_mut(i)) {
                    t.set_volume(volume);
                }
            }
            LooperCommand::SetPreDelay { track, samples } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.set_pre_delay(samples);
                }
            }
            LooperCommand::ClearAll => {
                for t in &mut self.tracks {
                    t.apply_intent(TrackIntent::Clear);
                }
            }
            LooperCommand::StopAll => {
                for t in &mut self.tracks {
                    t.apply_intent(TrackIntent::Stop);
                }
            }
        }
    }

    /// Process one mono block in place
    ///
    /// `io` carries the live input on entry and the summed track outputs on
    /// return. Every track sees the same transport snapshot and the same
    /// input, regardless of processing order.
    pub fn process(&mut self, io: &mut [Sample]) {
        if io.len() > MAX_BLOCK_SIZE {
            // Oversized callbacks degrade to silence past the processed
            // range instead of passing raw input through
            io[MAX_BLOCK_SIZE..].fill(0.0);
        }
        let len = io.len().min(MAX_BLOCK_SIZE);
        let io = &mut io[..len];
        let now = self.clock.current_sample_time();

        self.mix.set_len_from_capacity(len);
        self.mix.fill_silence();
        self.track_scratch.set_len_from_capacity(len);

        let mut any_transition = false;
        for track in &mut self.tracks {
            self.track_scratch.as_mut_slice().copy_from_slice(io);
            track.process_block(self.track_scratch.as_mut_slice(), now);
            self.mix.add_buffer(&self.track_scratch);
            any_transition |= track.take_state_changed();
        }

        io.copy_from_slice(self.mix.as_slice());
        self.clock.advance(len);

        if any_transition {
            self.check_global_state();
        }
    }

    /// Group-level transport bookkeeping, run after any track transition
    ///
    /// The transport halts when no track is active any more, and the master
    /// tempo grant (with its grid) is released once every track is cleared so
    /// the next recording can define a new tempo.
    fn check_global_state(&mut self) {
        let all_idle = self
            .tracks
            .iter()
            .all(|t| matches!(t.state(), TrackState::Stopped | TrackState::Cleared));
        let all_cleared = self.tracks.iter().all(|t| t.state() == TrackState::Cleared);

        if all_cleared {
            for track in &mut self.tracks {
                if let Some(grant) = track.take_master_grant() {
                    self.clock.release_master(grant);
                }
            }
        }
        if all_idle && self.clock.is_playing() {
            self.clock.stop_transport();
        }
    }

    #[cfg(test)]
    pub(crate) fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }
}
