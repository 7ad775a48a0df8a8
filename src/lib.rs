//! Band-limited sample-rate converter for cycle-accurate emulator audio
//!
//! An emulated sound chip emits step changes in output level at exact
//! clock ticks; the host wants smooth, alias-free PCM at a fixed playback
//! rate. This crate converts between the two without ever materializing
//! the clock-rate waveform: deltas tagged with input-clock times go in,
//! band-limited 16-bit samples come out at a generally non-integer rate
//! ratio.
//!
//! # Features
//! - Quality synthesis path (16-tap windowed-sinc kernel, 32 sub-sample
//!   phases) and a cheap 2-tap fast path per delta
//! - Mono and stereo buffers via one const-generic implementation
//! - Exact clock accounting: [`BlipBuf::clocks_needed`] sizes the next
//!   emulation step so a frame always delivers the requested samples
//! - Saturating 16-bit extraction with stride-2 interleaving, plus
//!   two/three-buffer mixing for per-voice buffers
//! - Serde-serializable snapshots for emulator save-states
//! - No allocation and no locking on the synthesis path
//!
//! # Quick start
//! ```
//! use blipbuf::MonoBlip;
//!
//! let mut buf = MonoBlip::new(4410).unwrap();
//! buf.set_rates(1_789_773.0, 44_100.0).unwrap(); // NES APU -> 44.1 kHz
//!
//! // Emulate one video frame's worth of clocks.
//! let clocks = buf.clocks_needed(735);
//! buf.add_delta(0, [1000]); // step up at clock 0
//! buf.end_frame(clocks);
//!
//! let mut out = [0i16; 1470]; // stride-2 output
//! let n = buf.read_samples(&mut out, 735);
//! assert_eq!(n, 735);
//! ```
//!
//! # Contract
//! Delta times must fall within the open frame (plus two samples of
//! slack) and a frame must not finalize more samples than the buffer's
//! capacity. Violations never corrupt memory; they panic via the backing
//! array's bounds instead of degrading silently.

#![warn(missing_docs)]

// Domain modules
pub mod buffer; // Buffer instance: synthesis, frame control, extraction
mod kernel; // Band-limiting kernel table (shared, built once)
pub mod mix; // Multi-buffer extraction
pub mod state; // Save-state snapshots
mod timing; // Fixed-point clock/sample mapping

/// Error types for buffer configuration and state restore
#[derive(thiserror::Error, Debug)]
pub enum BlipError {
    /// A buffer must hold at least one sample
    #[error("buffer capacity must be at least one sample")]
    ZeroCapacity,

    /// The clock rate exceeds `sample_rate * MAX_RATIO`
    #[error("clock rate {clock_rate} exceeds sample rate {sample_rate} times the maximum ratio")]
    RatioTooHigh {
        /// Rejected input clock rate
        clock_rate: f64,
        /// Output sample rate the ratio was checked against
        sample_rate: f64,
    },

    /// A rate was zero, negative or not finite
    #[error("invalid rate pair: clock rate {clock_rate}, sample rate {sample_rate}")]
    InvalidRates {
        /// Offending input clock rate
        clock_rate: f64,
        /// Offending output sample rate
        sample_rate: f64,
    },

    /// A snapshot was taken from a buffer with a different channel count
    #[error("snapshot has {snapshot} channels but buffer has {buffer}")]
    StateChannelMismatch {
        /// Channels captured in the snapshot
        snapshot: usize,
        /// Channels of the buffer being restored
        buffer: usize,
    },

    /// A snapshot was taken from a buffer of a different capacity
    #[error("snapshot was taken at capacity {snapshot} but buffer capacity is {capacity}")]
    StateCapacityMismatch {
        /// Sample capacity the snapshot was taken from
        snapshot: usize,
        /// Capacity of the buffer being restored
        capacity: usize,
    },
}

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, BlipError>;

// Public API exports
pub use buffer::{BlipBuf, MonoBlip, StereoBlip};
pub use mix::{mix_samples, mix_samples_2};
pub use state::BlipState;
pub use timing::{MAX_FRAME, MAX_RATIO};
