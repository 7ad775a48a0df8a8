//! Snapshot save/restore for emulator save-states.
//!
//! A [`BlipState`] is a flat, owned copy of everything a buffer needs to
//! resume playback bit-identically: the frame-origin fraction, the
//! finalized-sample count, the per-channel integrators and each channel's
//! entire backing array. Copying the whole array (not just the finalized
//! prefix) keeps deltas injected into a still-open frame, so a snapshot
//! taken between `add_delta` and `end_frame` restores losslessly. It owns
//! its storage and outlives the buffer it was taken from. Rates are not
//! captured; emulator save-states carry their clock configuration
//! separately and reapply it with [`BlipBuf::set_rates`] before restoring.

use serde::{Deserialize, Serialize};

use crate::buffer::BlipBuf;
use crate::timing::BUF_EXTRA;
use crate::{BlipError, Result};

/// Owned playback state of a [`BlipBuf`], sufficient to reconstruct
/// continuity after a save/restore cycle.
///
/// The layout is an implementation contract between
/// [`BlipBuf::save_state`] and [`BlipBuf::restore_state`]; it is
/// serde-serializable so save-states can embed it, but not versioned
/// across crate releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlipState {
    offset: u64,
    avail: usize,
    /// One integrator per channel.
    integrators: Vec<i32>,
    /// Each channel's full backing array, kernel padding included. Slots
    /// past `avail` may hold deltas of a frame that was still open.
    channels: Vec<Vec<i32>>,
}

impl BlipState {
    /// Number of channels the snapshot was taken from.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of finalized samples captured.
    pub fn samples_avail(&self) -> usize {
        self.avail
    }

    /// Sample capacity of the buffer the snapshot was taken from.
    pub fn capacity(&self) -> usize {
        self.channels
            .first()
            .map_or(0, |cells| cells.len().saturating_sub(BUF_EXTRA))
    }
}

impl<const CHANNELS: usize> BlipBuf<CHANNELS> {
    /// Captures the buffer's playback state. Allocation happens here, not
    /// on the synthesis path.
    pub fn save_state(&self) -> BlipState {
        BlipState {
            offset: self.offset,
            avail: self.avail,
            integrators: self.channels.iter().map(|ch| ch.integrator).collect(),
            channels: self.channels.iter().map(|ch| ch.cells.clone()).collect(),
        }
    }

    /// Restores a previously saved state. Subsequent reads are
    /// bit-identical to the run the snapshot was taken from, provided the
    /// same rates are configured.
    ///
    /// Fails if the snapshot's channel count differs from the buffer's or
    /// it was taken from a buffer of a different capacity.
    pub fn restore_state(&mut self, state: &BlipState) -> Result<()> {
        if state.channels.len() != CHANNELS || state.integrators.len() != CHANNELS {
            return Err(BlipError::StateChannelMismatch {
                snapshot: state.channels.len(),
                buffer: CHANNELS,
            });
        }
        let full = self.size + BUF_EXTRA;
        if state.avail > self.size || state.channels.iter().any(|cells| cells.len() != full) {
            return Err(BlipError::StateCapacityMismatch {
                snapshot: state.capacity(),
                capacity: self.size,
            });
        }

        self.offset = state.offset;
        self.avail = state.avail;
        for ((ch, cells), &integrator) in self
            .channels
            .iter_mut()
            .zip(&state.channels)
            .zip(&state.integrators)
        {
            ch.integrator = integrator;
            ch.cells.copy_from_slice(cells);
        }
        Ok(())
    }
}
