//! Band-limiting synthesis kernel.
//!
//! A step injected between two output samples is spread over a 16-tap
//! window shaped like a windowed-sinc band-limited step, so the
//! reconstructed waveform carries no energy above the output Nyquist
//! limit. The table stores the leading half of the window for each of 33
//! sub-sample phases; the trailing half of phase `p` is the mirrored
//! leading half of phase `PHASE_COUNT - p`.
//!
//! The table is built once on first use and shared read-only by every
//! buffer instance. Rounding is repaired after quantization so that each
//! complementary phase pair sums to exactly `DELTA_UNIT`: a delta's window
//! therefore integrates back to the delta with no residue.

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::timing::{DELTA_UNIT, HALF_WIDTH, PHASE_COUNT};

/// Fraction of the output Nyquist frequency retained by the kernel.
const CUTOFF: f64 = 0.85;

/// Phase-indexed half-kernel rows, in `DELTA_BITS` fixed point.
pub(crate) struct KernelTable {
    rows: [[i32; HALF_WIDTH]; PHASE_COUNT + 1],
}

impl KernelTable {
    /// Leading half-window for the given sub-sample phase.
    #[inline]
    pub(crate) fn row(&self, phase: usize) -> &[i32; HALF_WIDTH] {
        &self.rows[phase]
    }

    fn generate() -> Self {
        let mut rows = [[0i32; HALF_WIDTH]; PHASE_COUNT + 1];

        for (p, row) in rows.iter_mut().enumerate() {
            let frac = p as f64 / PHASE_COUNT as f64;

            // Full 16-tap window for a step at fractional offset `frac`
            // between taps HALF_WIDTH-1 and HALF_WIDTH.
            let mut taps = [0f64; HALF_WIDTH * 2];
            let mut sum = 0.0;
            for (j, tap) in taps.iter_mut().enumerate() {
                let t = j as f64 - (HALF_WIDTH as f64 - 1.0) - frac;
                *tap = CUTOFF * sinc(CUTOFF * t) * blackman(t);
                sum += *tap;
            }

            // Normalize to unit DC gain, quantize the leading half.
            let scale = DELTA_UNIT as f64 / sum;
            for (dst, &tap) in row.iter_mut().zip(taps.iter()) {
                *dst = (tap * scale).round() as i32;
            }
        }

        // Quantization repair: force every complementary pair (p, N-p) to
        // sum to exactly DELTA_UNIT by absorbing the residue into the
        // largest tap of the leading (p <= N/2) row.
        for p in 0..=PHASE_COUNT / 2 {
            let q = PHASE_COUNT - p;
            let sum: i32 =
                rows[p].iter().sum::<i32>() + rows[q].iter().sum::<i32>();
            let err = DELTA_UNIT - sum;
            if p == q {
                // Center phase pairs with itself; the residue is even.
                rows[p][HALF_WIDTH - 1] += err / 2;
            } else {
                rows[p][HALF_WIDTH - 1] += err;
            }
        }

        KernelTable { rows }
    }
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Blackman window over the kernel's half-width support.
#[inline]
fn blackman(t: f64) -> f64 {
    let x = PI * t / HALF_WIDTH as f64;
    0.42 + 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
}

/// Shared kernel table - built once, on first use.
static KERNEL: OnceLock<KernelTable> = OnceLock::new();

pub(crate) fn kernel() -> &'static KernelTable {
    KERNEL.get_or_init(KernelTable::generate)
}
