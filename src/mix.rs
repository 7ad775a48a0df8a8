//! Multi-buffer extraction.
//!
//! Emulators often keep one buffer per voice so save-states stay
//! per-voice, then combine the voices into a single PCM stream. The mix
//! functions here drain two or three buffers in lockstep: per output lane
//! each source's integrated value is clamped to i16 exactly as a solo read
//! would, then the clamped values are summed with saturation. A mixed lane
//! therefore equals the sum of the sources' individual reads, saturated.

use crate::buffer::{clamp_sample, BlipBuf};
use crate::timing::{BASS_SHIFT, DELTA_BITS};

/// Reads up to `count` samples mixed from three buffers into `out`
/// (stride 2, like [`BlipBuf::read_samples`]). All three sources advance
/// together; the count is limited by the emptiest source. Returns the
/// number of mixed samples written.
pub fn mix_samples<const CHANNELS: usize>(
    a: &mut BlipBuf<CHANNELS>,
    b: &mut BlipBuf<CHANNELS>,
    c: &mut BlipBuf<CHANNELS>,
    out: &mut [i16],
    count: usize,
) -> usize {
    let count = mix_count::<CHANNELS>(
        count,
        a.samples_avail()
            .min(b.samples_avail())
            .min(c.samples_avail()),
        out.len(),
    );
    if count == 0 {
        return 0;
    }
    zero_lanes::<CHANNELS>(out, count);
    accumulate(a, out, count);
    accumulate(b, out, count);
    accumulate(c, out, count);
    count
}

/// Two-source variant of [`mix_samples`].
pub fn mix_samples_2<const CHANNELS: usize>(
    a: &mut BlipBuf<CHANNELS>,
    b: &mut BlipBuf<CHANNELS>,
    out: &mut [i16],
    count: usize,
) -> usize {
    let count = mix_count::<CHANNELS>(count, a.samples_avail().min(b.samples_avail()), out.len());
    if count == 0 {
        return 0;
    }
    zero_lanes::<CHANNELS>(out, count);
    accumulate(a, out, count);
    accumulate(b, out, count);
    count
}

fn mix_count<const CHANNELS: usize>(count: usize, avail: usize, out_len: usize) -> usize {
    let fit = if out_len < CHANNELS {
        0
    } else {
        (out_len - CHANNELS) / 2 + 1
    };
    count.min(avail).min(fit)
}

fn zero_lanes<const CHANNELS: usize>(out: &mut [i16], count: usize) {
    for i in 0..count {
        for lane in 0..CHANNELS {
            out[i * 2 + lane] = 0;
        }
    }
}

/// Drains `count` samples from one source, saturating-adding its clamped
/// integrated values into the target lanes. The per-source extraction is
/// identical to [`BlipBuf::read_samples`].
fn accumulate<const CHANNELS: usize>(buf: &mut BlipBuf<CHANNELS>, out: &mut [i16], count: usize) {
    for (lane, ch) in buf.channels.iter_mut().enumerate() {
        let mut sum = ch.integrator;
        for (i, &cell) in ch.cells[..count].iter().enumerate() {
            let s = clamp_sample(sum >> DELTA_BITS);
            sum = sum.wrapping_add(cell);
            let slot = &mut out[i * 2 + lane];
            *slot = slot.saturating_add(s as i16);
            sum = sum.wrapping_sub(s << (DELTA_BITS - BASS_SHIFT));
        }
        ch.integrator = sum;
        ch.remove(count, buf.avail);
    }
    buf.avail -= count;
}
