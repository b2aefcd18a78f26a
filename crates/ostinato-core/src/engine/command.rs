//! Lock-free command queue for real-time looper control
//!
//! Control-thread requests (UI, MIDI/OSC bridges, scripting) never touch the
//! engine directly. They are pushed onto a bounded SPSC ring buffer and
//! drained at the start of the next audio block, so every actual state
//! mutation happens on the audio thread and the hot path never takes a lock.
//!
//! The `rtrb` ringbuffer is allocated once at startup; both push and pop are
//! wait-free O(1).

/// A discrete trigger consumed by the track state machine
///
/// Both the engine's group operations and the external parameter surface
/// produce this event type; the track does not know who asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackIntent {
    /// Record if the track is cleared or stopped, otherwise play
    RecordOrPlay,
    /// Stop recording at the next boundary and start playing
    Play,
    /// Stop the track
    Stop,
    /// Clear the track's content
    Clear,
}

/// Commands sent from the control thread to the audio thread
///
/// Each variant is one atomic operation on the engine, applied at the start
/// of an audio block so no state changes mid-block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LooperCommand {
    /// Fire a trigger on a specific track
    Trigger { track: usize, intent: TrackIntent },
    /// Fire a trigger on the currently selected track (no-op if none)
    TriggerSelected(TrackIntent),
    /// Select a track (deselects the previous one); `None` deselects
    SelectTrack(Option<usize>),
    /// Set a track's volume (0.0 - 1.0, ramped over the next block)
    SetVolume { track: usize, volume: f32 },
    /// Set the selected track's volume (no-op if none selected)
    SetSelectedVolume(f32),
    /// Set a track's pre-roll splice length in samples (latency compensation
    /// for immediate recording starts; clamped to the pre-roll capacity)
    SetPreDelay { track: usize, samples: usize },
    /// Clear every track
    ClearAll,
    /// Stop every track
    StopAll,
}

/// Capacity of the command queue
///
/// Triggers are small and bursts are short (a pedalboard mashing every
/// control still sends well under a hundred commands per UI frame).
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// The producer side belongs to the control thread, the consumer side to the
/// audio thread.
pub fn command_channel() -> (rtrb::Producer<LooperCommand>, rtrb::Consumer<LooperCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
