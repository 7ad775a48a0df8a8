//! Band-limited accumulation buffer.
//!
//! A [`BlipBuf`] collects amplitude deltas tagged with input-clock times
//! and turns them into 16-bit PCM at the configured output rate. Deltas
//! are stored as second-order differences spread over a small kernel
//! window; reading integrates them back into amplitudes. Per channel the
//! buffer carries a running integrator across frames, so successive frames
//! never re-sum from the beginning of time.
//!
//! Usage cycle:
//! 1. [`BlipBuf::set_rates`] configures the clock/sample ratio
//! 2. [`BlipBuf::add_delta`] records level changes within the open frame
//! 3. [`BlipBuf::end_frame`] finalizes the frame at a clock duration
//! 4. [`BlipBuf::read_samples`] drains the finalized samples
//!
//! The number of clocks to emulate before a target sample count becomes
//! available comes from [`BlipBuf::clocks_needed`].

use crate::kernel::kernel;
use crate::timing::{
    self, BASS_SHIFT, BUF_EXTRA, DELTA_BITS, DELTA_UNIT, FRAC_BITS, HALF_WIDTH, MAX_RATIO,
    PHASE_BITS, PHASE_COUNT, TIME_UNIT,
};
use crate::{BlipError, Result};

/// Mono buffer: one integrator, one backing array.
pub type MonoBlip = BlipBuf<1>;

/// Stereo buffer: per-channel integrators and backing arrays sharing one
/// time base.
pub type StereoBlip = BlipBuf<2>;

/// Per-channel synthesis state: the running integral of everything already
/// read, plus the backing array of unconsumed second-order differences.
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    pub(crate) integrator: i32,
    pub(crate) cells: Vec<i32>,
}

impl Channel {
    fn new(len: usize) -> Self {
        Channel {
            integrator: 0,
            cells: vec![0; len],
        }
    }

    fn clear(&mut self) {
        self.integrator = 0;
        self.cells.fill(0);
    }

    /// Drops `count` consumed slots: surviving cells (which may still hold
    /// pending kernel tails) shift to the front, the vacated tail is
    /// zeroed.
    pub(crate) fn remove(&mut self, count: usize, avail: usize) {
        let remain = avail + BUF_EXTRA - count;
        self.cells.copy_within(count..count + remain, 0);
        self.cells[remain..remain + count].fill(0);
    }
}

/// Band-limited sample buffer, generic over channel count.
///
/// `CHANNELS` must be 1 (mono) or 2 (stereo); see [`MonoBlip`] and
/// [`StereoBlip`]. Stereo channels share the clock/sample time base, so a
/// single delta call carries one value per channel.
///
/// A buffer is owned by exactly one thread at a time; it does no locking
/// and allocates only at construction and snapshot creation.
#[derive(Debug, Clone)]
pub struct BlipBuf<const CHANNELS: usize> {
    pub(crate) factor: u64,
    pub(crate) offset: u64,
    pub(crate) avail: usize,
    pub(crate) size: usize,
    clock_rate: f64,
    sample_rate: f64,
    pub(crate) channels: [Channel; CHANNELS],
}

impl<const CHANNELS: usize> BlipBuf<CHANNELS> {
    const CHANNEL_COUNT_OK: () = assert!(
        CHANNELS == 1 || CHANNELS == 2,
        "BlipBuf supports exactly 1 or 2 channels"
    );

    /// Creates a buffer able to hold at most `max_samples` finalized
    /// samples. The capacity is fixed for the buffer's lifetime; rates
    /// start at `MAX_RATIO` clocks per sample until [`set_rates`] is
    /// called.
    ///
    /// [`set_rates`]: BlipBuf::set_rates
    pub fn new(max_samples: usize) -> Result<Self> {
        let () = Self::CHANNEL_COUNT_OK;
        if max_samples == 0 {
            return Err(BlipError::ZeroCapacity);
        }
        let len = max_samples + BUF_EXTRA;
        let mut buf = BlipBuf {
            factor: TIME_UNIT / MAX_RATIO,
            offset: 0,
            avail: 0,
            size: max_samples,
            clock_rate: MAX_RATIO as f64,
            sample_rate: 1.0,
            channels: std::array::from_fn(|_| Channel::new(len)),
        };
        buf.clear();
        Ok(buf)
    }

    /// Sets the input clock rate and output sample rate. For every
    /// `clock_rate` input clocks, approximately `sample_rate` samples are
    /// generated.
    ///
    /// Fails if `clock_rate` exceeds `sample_rate * MAX_RATIO` or either
    /// rate is non-positive. Buffered samples and the open frame are
    /// unaffected; only the ratio is reinterpreted.
    pub fn set_rates(&mut self, clock_rate: f64, sample_rate: f64) -> Result<()> {
        self.factor = timing::factor_for_rates(clock_rate, sample_rate)?;
        self.clock_rate = clock_rate;
        self.sample_rate = sample_rate;
        Ok(())
    }

    /// Configured input clock rate.
    pub fn clock_rate(&self) -> f64 {
        self.clock_rate
    }

    /// Configured output sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Maximum number of finalized samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Clears all accumulators, integrators and the frame origin without
    /// reallocating. Afterwards `samples_avail() == 0`.
    pub fn clear(&mut self) {
        // Halfway start compensates for factor having been rounded either
        // way in the floating-point ratio.
        self.offset = self.factor / 2;
        self.avail = 0;
        for ch in &mut self.channels {
            ch.clear();
        }
    }

    /// Number of buffered samples available for reading.
    pub fn samples_avail(&self) -> usize {
        self.avail
    }

    /// Length of time frame, in clocks, needed to make `samples`
    /// additional samples available.
    ///
    /// # Panics
    ///
    /// Panics if the buffer cannot hold that many more samples.
    pub fn clocks_needed(&self, samples: usize) -> u64 {
        assert!(
            self.avail + samples <= self.size,
            "requested {samples} samples but only {} slots remain",
            self.size - self.avail
        );
        timing::clocks_needed(self.factor, self.offset, samples)
    }

    /// Adds one delta per channel at the given clock time, spread over the
    /// band-limiting kernel window (quality path).
    ///
    /// `time` is measured from the current frame's origin. Deltas may land
    /// slightly past the upcoming frame duration (up to the clocks in two
    /// output samples); times beyond that are a contract violation and
    /// panic once the kernel window would leave the backing array.
    pub fn add_delta(&mut self, time: u64, deltas: [i32; CHANNELS]) {
        let fixed = timing::sample_position(self.factor, self.offset, time);
        let base = self.avail + (fixed >> FRAC_BITS) as usize;

        const PHASE_SHIFT: u32 = FRAC_BITS - PHASE_BITS;
        let phase = (fixed >> PHASE_SHIFT & (PHASE_COUNT as u64 - 1)) as usize;
        let interp = (fixed >> (PHASE_SHIFT - DELTA_BITS) & (DELTA_UNIT as u64 - 1)) as i64;

        let table = kernel();
        let fwd = table.row(phase);
        let fwd_next = table.row(phase + 1);
        let rev = table.row(PHASE_COUNT - phase);
        let rev_prev = table.row(PHASE_COUNT - phase - 1);

        for (ch, &delta) in self.channels.iter_mut().zip(deltas.iter()) {
            if delta == 0 {
                continue;
            }
            // Split the delta between the bracketing kernel phases by the
            // leftover sub-phase fraction.
            let delta2 = ((delta as i64 * interp) >> DELTA_BITS) as i32;
            let delta1 = delta - delta2;

            let window = &mut ch.cells[base..base + 2 * HALF_WIDTH];
            for (k, cell) in window[..HALF_WIDTH].iter_mut().enumerate() {
                let inc = fwd[k] as i64 * delta1 as i64 + fwd_next[k] as i64 * delta2 as i64;
                *cell = cell.wrapping_add(inc as i32);
            }
            for (k, cell) in window[HALF_WIDTH..].iter_mut().enumerate() {
                let m = HALF_WIDTH - 1 - k;
                let inc = rev[m] as i64 * delta1 as i64 + rev_prev[m] as i64 * delta2 as i64;
                *cell = cell.wrapping_add(inc as i32);
            }
        }
    }

    /// Same as [`add_delta`], but spreads the delta across only the two
    /// nearest slots by linear interpolation. Cheaper and audibly noisier;
    /// meant for voices where synthesis quality is secondary.
    ///
    /// [`add_delta`]: BlipBuf::add_delta
    pub fn add_delta_fast(&mut self, time: u64, deltas: [i32; CHANNELS]) {
        let fixed = timing::sample_position(self.factor, self.offset, time);
        let base = self.avail + (fixed >> FRAC_BITS) as usize;

        let interp = (fixed >> (FRAC_BITS - DELTA_BITS) & (DELTA_UNIT as u64 - 1)) as i64;

        for (ch, &delta) in self.channels.iter_mut().zip(deltas.iter()) {
            if delta == 0 {
                continue;
            }
            let delta2 = delta as i64 * interp;
            let delta1 = delta as i64 * DELTA_UNIT as i64 - delta2;

            // Centered like the quality path so both can feed one buffer.
            let cell = &mut ch.cells[base + HALF_WIDTH - 1];
            *cell = cell.wrapping_add(delta1 as i32);
            let cell = &mut ch.cells[base + HALF_WIDTH];
            *cell = cell.wrapping_add(delta2 as i32);
        }
    }

    /// Makes input clocks before `clock_duration` available for reading as
    /// output samples and begins a new time frame: clock 0 of the new
    /// frame names the same instant `clock_duration` did in the old one.
    /// The fractional remainder of the origin is carried over.
    ///
    /// # Panics
    ///
    /// Panics if the finalized samples would exceed the buffer capacity.
    pub fn end_frame(&mut self, clock_duration: u64) {
        let (new_samples, offset) = timing::frame_advance(self.factor, self.offset, clock_duration);
        self.avail += new_samples;
        self.offset = offset;
        assert!(
            self.avail <= self.size,
            "frame finalized {} samples but capacity is {}",
            self.avail,
            self.size
        );
    }

    /// Reads and removes at most `count` samples, writing 16-bit signed
    /// PCM at stride 2: channel `c` of sample `i` lands at `out[i * 2 +
    /// c]`. A mono buffer fills every other element, so two mono buffers
    /// can be woven into one stereo stream (pass `&mut out[1..]` to the
    /// second). Returns the number of samples actually read.
    ///
    /// Integrated values saturate to the 16-bit range; synthesis ringing
    /// can overshoot and must clamp, not wrap.
    pub fn read_samples(&mut self, out: &mut [i16], count: usize) -> usize {
        let count = count.min(self.avail).min(Self::lanes_fit(out.len()));
        if count == 0 {
            return 0;
        }

        for (lane, ch) in self.channels.iter_mut().enumerate() {
            let mut sum = ch.integrator;
            for (i, &cell) in ch.cells[..count].iter().enumerate() {
                let s = clamp_sample(sum >> DELTA_BITS);
                sum = sum.wrapping_add(cell);
                out[i * 2 + lane] = s as i16;
                // Gentle high-pass keeps accumulated DC from pinning the
                // integrator.
                sum = sum.wrapping_sub(s << (DELTA_BITS - BASS_SHIFT));
            }
            ch.integrator = sum;
            ch.remove(count, self.avail);
        }
        self.avail -= count;
        count
    }

    /// Discards up to `count` buffered samples in O(1) by moving the
    /// finalized-sample boundary backwards. Returns the number discarded.
    ///
    /// The discarded region of the backing array is left dirty: it is
    /// neither integrated nor zeroed, and later synthesis adds on top of
    /// the stale contents. Use only when the output is being thrown away
    /// anyway (fast-forward); [`read_samples`] stays consistent.
    ///
    /// [`read_samples`]: BlipBuf::read_samples
    pub fn discard_samples_dirty(&mut self, count: usize) -> usize {
        let count = count.min(self.avail);
        self.avail -= count;
        count
    }

    /// Slot span a delta at the frame-relative clock `time` would start
    /// at; used by the contract assertions in tests.
    #[cfg(test)]
    pub(crate) fn slot_for_time(&self, time: u64) -> usize {
        self.avail
            + (timing::sample_position(self.factor, self.offset, time) >> FRAC_BITS) as usize
    }

    /// Maximum whole samples writable into `len` output lanes at stride 2.
    #[inline]
    fn lanes_fit(len: usize) -> usize {
        if len < CHANNELS {
            0
        } else {
            (len - CHANNELS) / 2 + 1
        }
    }
}

/// Saturates an integrated amplitude to the signed 16-bit range.
#[inline]
pub(crate) fn clamp_sample(s: i32) -> i32 {
    if s as i16 as i32 != s {
        (s >> 16) ^ 0x7FFF
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::END_FRAME_EXTRA;

    fn nes_mono() -> MonoBlip {
        let mut buf = MonoBlip::new(2048).unwrap();
        buf.set_rates(1_789_773.0, 44_100.0).unwrap();
        buf
    }

    fn cell_sum(buf: &MonoBlip) -> i64 {
        buf.channels[0].cells.iter().map(|&c| c as i64).sum()
    }

    #[test]
    fn quality_path_conserves_energy_exactly() {
        // The kernel window of a single delta must integrate back to the
        // delta with no residue, at any sub-sample phase.
        for time in [0u64, 1, 13, 40, 81, 997, 25_000] {
            for delta in [1i32, -1, 1000, -32768, 32767] {
                let mut buf = nes_mono();
                buf.add_delta(time, [delta]);
                assert_eq!(
                    cell_sum(&buf),
                    delta as i64 * DELTA_UNIT as i64,
                    "time {time}, delta {delta}"
                );
            }
        }
    }

    #[test]
    fn fast_path_conserves_energy_exactly() {
        for time in [0u64, 7, 333, 12_345] {
            let mut buf = nes_mono();
            buf.add_delta_fast(time, [765]);
            assert_eq!(cell_sum(&buf), 765 * DELTA_UNIT as i64);
        }
    }

    #[test]
    fn deltas_accumulate_rather_than_overwrite() {
        let mut buf = nes_mono();
        buf.add_delta(0, [500]);
        buf.add_delta(0, [500]);
        assert_eq!(cell_sum(&buf), 1000 * DELTA_UNIT as i64);
    }

    #[test]
    fn cleared_buffer_reads_silence() {
        let mut buf = nes_mono();
        buf.add_delta(0, [12_000]);
        buf.clear();
        let clocks = buf.clocks_needed(512);
        buf.end_frame(clocks);
        let mut out = [1i16; 1024];
        let n = buf.read_samples(&mut out, 512);
        assert!(n >= 512);
        assert!(out.iter().step_by(2).all(|&s| s == 0));
    }

    #[test]
    fn availability_is_monotonic_and_bounded() {
        let mut buf = nes_mono();
        let mut last = 0;
        for _ in 0..8 {
            let clocks = buf.clocks_needed(100);
            buf.end_frame(clocks);
            let avail = buf.samples_avail();
            assert!(avail >= last + 100);
            assert!(avail <= buf.capacity());
            last = avail;
        }
    }

    #[test]
    fn read_pops_and_discard_is_constant_time_bookkeeping() {
        let mut buf = nes_mono();
        let clocks = buf.clocks_needed(400);
        buf.end_frame(clocks);
        let before = buf.samples_avail();

        let mut out = [0i16; 200];
        assert_eq!(buf.read_samples(&mut out, 100), 100);
        assert_eq!(buf.samples_avail(), before - 100);

        assert_eq!(buf.discard_samples_dirty(150), 150);
        assert_eq!(buf.samples_avail(), before - 250);

        // Discard never goes below zero.
        let rest = buf.samples_avail();
        assert_eq!(buf.discard_samples_dirty(10_000), rest);
        assert_eq!(buf.samples_avail(), 0);
    }

    #[test]
    fn mono_read_leaves_odd_lanes_untouched() {
        let mut buf = nes_mono();
        buf.add_delta(0, [8000]);
        let clocks = buf.clocks_needed(64);
        buf.end_frame(clocks);
        let mut out = [i16::MIN; 128];
        buf.read_samples(&mut out, 64);
        assert!(out.iter().skip(1).step_by(2).all(|&s| s == i16::MIN));
    }

    #[test]
    fn stereo_lanes_stay_independent() {
        let mut buf = StereoBlip::new(1024).unwrap();
        buf.set_rates(1_789_773.0, 44_100.0).unwrap();
        buf.add_delta(0, [4000, -4000]);
        let clocks = buf.clocks_needed(64);
        buf.end_frame(clocks);

        let mut out = [0i16; 128];
        let n = buf.read_samples(&mut out, 64);
        assert!(n >= 64);
        let left_peak = out.iter().step_by(2).copied().max().unwrap();
        let right_min = out.iter().skip(1).step_by(2).copied().min().unwrap();
        assert!(left_peak > 3000, "left settled at {left_peak}");
        assert!(right_min < -3000, "right settled at {right_min}");
        // Mirrored deltas produce mirrored output, up to the one-count
        // rounding difference of the arithmetic shift on negatives.
        for pair in out.chunks_exact(2) {
            assert!((pair[0] as i32 + pair[1] as i32).abs() <= 1);
        }
    }

    #[test]
    fn late_deltas_within_padding_stay_in_bounds() {
        let mut buf = nes_mono();
        let clocks = buf.clocks_needed(buf.capacity());
        // Two samples' worth of slack past the frame end is allowed.
        let late = clocks + (clocks / buf.capacity() as u64) * END_FRAME_EXTRA as u64;
        assert!(buf.slot_for_time(late) <= buf.capacity() + END_FRAME_EXTRA);
        buf.add_delta(late, [100]);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(MonoBlip::new(0), Err(BlipError::ZeroCapacity)));
    }

    #[test]
    fn rate_ceiling_is_rejected() {
        let mut buf = MonoBlip::new(16).unwrap();
        let err = buf.set_rates(44_100.0 * (MAX_RATIO as f64) * 2.0, 44_100.0);
        assert!(matches!(err, Err(BlipError::RatioTooHigh { .. })));
    }

    #[test]
    fn clamp_saturates_not_wraps() {
        assert_eq!(clamp_sample(40_000), 32_767);
        assert_eq!(clamp_sample(-40_000), -32_768);
        assert_eq!(clamp_sample(32_767), 32_767);
        assert_eq!(clamp_sample(-32_768), -32_768);
        assert_eq!(clamp_sample(123), 123);
    }
}
