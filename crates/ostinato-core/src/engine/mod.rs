//! Real-time looper engine
//!
//! `LooperEngine` owns the tracks and runs inside the audio callback; the
//! control side talks to it through the lock-free command queue and reads
//! state back through `TrackAtomics`.

mod command;
mod engine;
mod loop_buffer;
mod preroll;
mod track;

pub use command::{command_channel, LooperCommand, TrackIntent, COMMAND_QUEUE_CAPACITY};
pub use engine::{LooperEngine, MAX_BLOCK_SIZE};
pub use loop_buffer::{LoopBuffer, RECORD_EDGE_FADE_SAMPLES};
pub use preroll::PreRollBuffer;
pub use track::{BufferState, Track, TrackAtomics, TrackState, DEFAULT_VOLUME};
