//! Fixed-point mapping between input clocks and output sample positions.
//!
//! All timing is carried in a 64-bit fixed-point format: `factor` holds the
//! output-samples-per-input-clock ratio scaled by `TIME_UNIT`, and `offset`
//! holds the fractional position of the current frame origin in the same
//! scale. The upper bits of a scaled position address a buffer slot, the
//! bits below `FRAC_BITS` select the synthesis kernel phase. Intermediate
//! products widen to `u128` so a full `MAX_FRAME` of samples never
//! overflows the position math.

use crate::{BlipError, Result};

/// Bits discarded before slot/phase extraction. A scaled position shifted
/// right by this many bits has `FRAC_BITS` of sub-slot resolution left.
pub(crate) const PRE_SHIFT: u32 = 32;

/// Total fractional bits of a scaled sample position.
pub(crate) const TIME_BITS: u32 = PRE_SHIFT + 20;

/// One whole output sample in scaled-position units.
pub(crate) const TIME_UNIT: u64 = 1 << TIME_BITS;

/// Sub-slot fractional bits remaining after `PRE_SHIFT`.
pub(crate) const FRAC_BITS: u32 = TIME_BITS - PRE_SHIFT;

/// Kernel phase resolution: the top `PHASE_BITS` of the sub-slot fraction
/// pick one of `PHASE_COUNT` precomputed kernel phases.
pub(crate) const PHASE_BITS: u32 = 5;
pub(crate) const PHASE_COUNT: usize = 1 << PHASE_BITS;

/// Fixed-point scale of kernel taps and of integrated amplitudes.
pub(crate) const DELTA_BITS: u32 = 15;
pub(crate) const DELTA_UNIT: i32 = 1 << DELTA_BITS;

/// High-pass strength applied while integrating on read. Larger values move
/// the filter breakpoint lower.
pub(crate) const BASS_SHIFT: u32 = 9;

/// Half the synthesis kernel width, in output samples.
pub(crate) const HALF_WIDTH: usize = 8;

/// Slack past the frame length so deltas slightly after `end_frame`'s
/// duration still land inside the backing array.
pub(crate) const END_FRAME_EXTRA: usize = 2;

/// Padding cells appended to every channel's backing array. Sized so a
/// kernel window starting at the last addressable slot stays in bounds.
pub(crate) const BUF_EXTRA: usize = HALF_WIDTH * 2 + END_FRAME_EXTRA;

/// Maximum `clock_rate / sample_rate` ratio. For a given sample rate, the
/// clock rate must not exceed `sample_rate * MAX_RATIO`.
pub const MAX_RATIO: u64 = 1 << 30;

/// Maximum number of samples a single `end_frame` call may produce.
pub const MAX_FRAME: usize = 768000 / 50;

/// Computes the fixed-point ratio for a clock-rate/sample-rate pair,
/// rounded up so `clocks_needed` never under-delivers.
pub(crate) fn factor_for_rates(clock_rate: f64, sample_rate: f64) -> Result<u64> {
    if !clock_rate.is_finite() || !sample_rate.is_finite() || clock_rate <= 0.0 || sample_rate <= 0.0
    {
        return Err(BlipError::InvalidRates {
            clock_rate,
            sample_rate,
        });
    }
    if clock_rate > sample_rate * MAX_RATIO as f64 {
        return Err(BlipError::RatioTooHigh {
            clock_rate,
            sample_rate,
        });
    }

    let exact = TIME_UNIT as f64 * sample_rate / clock_rate;
    let mut factor = exact as u64;
    // Round up: a factor rounded down would make end_frame fall one sample
    // short of what clocks_needed promised.
    if (factor as f64) < exact {
        factor += 1;
    }
    Ok(factor)
}

/// Minimum clocks that must elapse before `samples` additional samples are
/// finalized, given the current ratio and frame-origin fraction.
pub(crate) fn clocks_needed(factor: u64, offset: u64, samples: usize) -> u64 {
    let needed = (samples as u128) << TIME_BITS;
    let offset = offset as u128;
    if needed < offset {
        return 0;
    }
    (needed - offset).div_ceil(factor as u128) as u64
}

/// Advances the frame origin by `clock_duration` clocks. Returns the number
/// of samples that became final and the fractional remainder carried into
/// the next frame.
pub(crate) fn frame_advance(factor: u64, offset: u64, clock_duration: u64) -> (usize, u64) {
    let off = clock_duration as u128 * factor as u128 + offset as u128;
    ((off >> TIME_BITS) as usize, off as u64 & (TIME_UNIT - 1))
}

/// Scaled sample position of clock `time` within the current frame, already
/// shifted down by `PRE_SHIFT`: upper bits are the slot index, lower
/// `FRAC_BITS` the sub-slot fraction.
#[inline]
pub(crate) fn sample_position(factor: u64, offset: u64, time: u64) -> u64 {
    ((time as u128 * factor as u128 + offset as u128) >> PRE_SHIFT) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn factor_matches_exact_ratio() {
        let factor = factor_for_rates(1_789_773.0, 44_100.0).unwrap();
        let exact = TIME_UNIT as f64 * 44_100.0 / 1_789_773.0;
        assert_relative_eq!(factor as f64, exact, max_relative = 1e-12);
        // Rounded up, never down.
        assert!(factor as f64 >= exact);
    }

    #[test]
    fn rejects_ratio_above_ceiling() {
        let clock = 44_100.0 * MAX_RATIO as f64 * 2.0;
        assert!(factor_for_rates(clock, 44_100.0).is_err());
    }

    #[test]
    fn rejects_degenerate_rates() {
        assert!(factor_for_rates(0.0, 44_100.0).is_err());
        assert!(factor_for_rates(-1.0, 44_100.0).is_err());
        assert!(factor_for_rates(f64::NAN, 44_100.0).is_err());
        assert!(factor_for_rates(1_000_000.0, f64::INFINITY).is_err());
    }

    #[test]
    fn clocks_needed_is_inverse_of_frame_advance() {
        // Duality at the mapping level: advancing by the returned clock
        // count always finalizes at least the requested samples.
        let pairs = [
            (1_789_773.0, 44_100.0), // NES APU
            (2_000_000.0, 48_000.0), // Atari ST PSG
            (4_194_304.0, 44_100.0), // Game Boy
            (3_579_545.0, 22_050.0),
            (48_000.0, 48_000.0), // unity ratio
        ];
        for (clock_rate, sample_rate) in pairs {
            let factor = factor_for_rates(clock_rate, sample_rate).unwrap();
            let mut offset = factor / 2;
            for samples in [1usize, 7, 137, 735, MAX_FRAME] {
                let clocks = clocks_needed(factor, offset, samples);
                let (got, next_offset) = frame_advance(factor, offset, clocks);
                assert!(
                    got >= samples,
                    "{clock_rate}/{sample_rate}: wanted {samples}, got {got}"
                );
                // Rounding never overshoots by more than one sample.
                assert!(got <= samples + 1);
                offset = next_offset;
            }
        }
    }

    #[test]
    fn max_frame_request_does_not_overflow() {
        let factor = factor_for_rates(MAX_RATIO as f64, 1.0).unwrap();
        let clocks = clocks_needed(factor, 0, MAX_FRAME);
        let (samples, _) = frame_advance(factor, 0, clocks);
        assert!(samples >= MAX_FRAME);
    }

    #[test]
    fn zero_samples_need_zero_clocks() {
        let factor = factor_for_rates(1_789_773.0, 44_100.0).unwrap();
        assert_eq!(clocks_needed(factor, factor / 2, 0), 0);
    }
}
