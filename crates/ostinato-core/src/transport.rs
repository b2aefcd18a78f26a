//! Shared transport clock
//!
//! Process-wide timeline every looper track quantizes against. The clock is
//! an explicitly injected dependency (`Arc<TransportClock>`) rather than a
//! singleton, so tests can drive it deterministically.
//!
//! All fields are relaxed atomics: the audio thread is the only writer of
//! time and tempo, while the control thread reads BPM/position for display
//! without any locking. Master-tempo arbitration uses a compare-exchange on
//! the owner slot, so at most one track ever holds the tempo-source role.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::types::TrackId;

/// Beats in one recorded loop when deriving tempo from the first loop length
pub const BEATS_PER_LOOP: u32 = 4;

/// Sentinel for "no track owns the tempo source"
const NO_MASTER: usize = usize::MAX;

/// Exclusive tempo-source token
///
/// Returned by [`TransportClock::request_master`] when arbitration grants a
/// track the right to set the shared tempo. The token is neither `Clone` nor
/// `Copy`; handing it back via [`TransportClock::release_master`] is the only
/// way to give the role up, which keeps release deterministic instead of
/// being inferred from aggregate track state.
#[derive(Debug)]
pub struct MasterGrant {
    owner: TrackId,
}

impl MasterGrant {
    /// The track this grant was issued to
    pub fn owner(&self) -> TrackId {
        self.owner
    }
}

/// Shared transport clock
///
/// Produces the absolute sample-time counter and the next quantized boundary,
/// and owns the master-tempo arbitration. Before any tempo is established the
/// boundary is the current time, so the first deferred transition commits on
/// the next block once the transport is running.
pub struct TransportClock {
    /// Engine sample rate (set at startup, reconfigured off the RT path)
    sample_rate: AtomicU32,
    /// Absolute sample counter; advances once per block while playing
    time_samples: AtomicU64,
    /// Samples per bar; 0 until a master track derives a tempo
    samples_per_bar: AtomicU64,
    /// Whether the transport is running
    playing: AtomicBool,
    /// Index of the master-tempo track, or NO_MASTER
    master: AtomicUsize,
}

impl TransportClock {
    /// Create a stopped clock with no tempo established
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: AtomicU32::new(sample_rate),
            time_samples: AtomicU64::new(0),
            samples_per_bar: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            master: AtomicUsize::new(NO_MASTER),
        }
    }

    /// Monotonic absolute sample counter
    #[inline]
    pub fn current_sample_time(&self) -> u64 {
        self.time_samples.load(Ordering::Relaxed)
    }

    /// Advance the timeline by one block (audio thread, once per block)
    ///
    /// A stopped transport does not advance, so deferred deadlines computed
    /// against it simply stay pending until the transport runs again.
    pub fn advance(&self, block_len: usize) {
        if self.playing.load(Ordering::Relaxed) {
            self.time_samples
                .fetch_add(block_len as u64, Ordering::Relaxed);
        }
    }

    /// Next sample-time at which a deferred transition may commit
    ///
    /// With an established tempo this is the next bar boundary strictly after
    /// the current time. With no tempo yet, the current time is returned: the
    /// deadline becomes "pending until the clock moves past it", which is the
    /// next processed block of a running transport.
    pub fn next_quantized_boundary(&self) -> u64 {
        let now = self.time_samples.load(Ordering::Relaxed);
        let bar = self.samples_per_bar.load(Ordering::Relaxed);
        if bar == 0 {
            now
        } else {
            ((now / bar) + 1) * bar
        }
    }

    /// Ask for the exclusive tempo-source role
    ///
    /// Grants only if no track currently holds the clock. The returned token
    /// must be handed back through [`Self::release_master`].
    pub fn request_master(&self, candidate: TrackId) -> Option<MasterGrant> {
        match self.master.compare_exchange(
            NO_MASTER,
            candidate.index(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                log::debug!("transport: master tempo granted to {}", candidate);
                Some(MasterGrant { owner: candidate })
            }
            Err(_) => None,
        }
    }

    /// Give the tempo-source role back, clearing the derived tempo
    ///
    /// Consumes the grant so a released token cannot linger. The tempo grid
    /// is dropped along with the role: the next master starts a fresh grid.
    pub fn release_master(&self, grant: MasterGrant) {
        let _ = self.master.compare_exchange(
            grant.owner.index(),
            NO_MASTER,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.samples_per_bar.store(0, Ordering::Relaxed);
        log::debug!("transport: master tempo released by {}", grant.owner);
    }

    /// Whether any track currently owns the tempo source
    pub fn has_master(&self) -> bool {
        self.master.load(Ordering::Relaxed) != NO_MASTER
    }

    /// Whether the given track owns the tempo source
    pub fn is_master(&self, track: TrackId) -> bool {
        self.master.load(Ordering::Relaxed) == track.index()
    }

    /// Derive the shared tempo from the master track's recorded loop length
    ///
    /// One loop is one bar of [`BEATS_PER_LOOP`] beats; every later quantized
    /// boundary lines up against this grid.
    pub fn set_tempo_from_loop_length(&self, samples: u64) {
        if samples == 0 {
            return;
        }
        self.samples_per_bar.store(samples, Ordering::Relaxed);
        log::info!(
            "transport: tempo set from loop length: {} samples ({:.2} BPM)",
            samples,
            self.bpm().unwrap_or(0.0)
        );
    }

    /// Current tempo in BPM, if a loop has established one
    pub fn bpm(&self) -> Option<f64> {
        let bar = self.samples_per_bar.load(Ordering::Relaxed);
        if bar == 0 {
            return None;
        }
        let sr = self.sample_rate.load(Ordering::Relaxed) as f64;
        Some(BEATS_PER_LOOP as f64 * 60.0 * sr / bar as f64)
    }

    /// Samples per bar of the established grid (0 = no tempo yet)
    pub fn samples_per_bar(&self) -> u64 {
        self.samples_per_bar.load(Ordering::Relaxed)
    }

    /// Start the transport running from its current position
    pub fn start_transport(&self) {
        self.playing.store(true, Ordering::Relaxed);
    }

    /// Stop the transport and rewind the timeline to zero
    pub fn stop_transport(&self) {
        self.playing.store(false, Ordering::Relaxed);
        self.time_samples.store(0, Ordering::Relaxed);
    }

    /// Whether the transport is running
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Engine sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Reconfigure the sample rate (discrete non-real-time event)
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }
}
