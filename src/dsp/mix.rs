//! Summing primitives for buses and the mixer.

/*
Summing
=======

Wherever several connections land on the same input, their signals ADD. This
holds for audio inputs (a bus) and for parameter inputs (base value plus every
modulation source):

    frequency[i] = base[i] + dca_a[i] + dca_b[i]

The mixer adds a per-channel level and a fixed normalization of 1/N so that N
channels at unity level and full scale cannot exceed full scale:

    out[i] = (1/N) × Σ level_c[i] × in_c[i]

With every level at 1.0 this is exactly the arithmetic mean of the channels.
*/

/// Add `src` into `acc` in place.
#[inline]
pub fn sum_in_place(acc: &mut [f32], src: &[f32]) {
    debug_assert_eq!(acc.len(), src.len());

    for (a, &s) in acc.iter_mut().zip(src.iter()) {
        *a += s;
    }
}

/// Add `src × gain` into `acc` in place, with a per-sample gain.
#[inline]
pub fn sum_scaled_in_place(acc: &mut [f32], src: &[f32], gain: &[f32]) {
    debug_assert_eq!(acc.len(), src.len());
    debug_assert_eq!(acc.len(), gain.len());

    for ((a, &s), &g) in acc.iter_mut().zip(src.iter()).zip(gain.iter()) {
        *a += s * g;
    }
}

/// Normalization factor for an N-channel mix.
#[inline]
pub fn normalization(channels: usize) -> f32 {
    1.0 / channels.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_into_accumulator() {
        let mut acc = [1.0, 1.0, 1.0];
        sum_in_place(&mut acc, &[0.5, -1.0, 0.0]);
        assert_eq!(acc, [1.5, 0.0, 1.0]);
    }

    #[test]
    fn scaled_sum_respects_gain() {
        let mut acc = [0.0; 3];
        sum_scaled_in_place(&mut acc, &[1.0, 1.0, 1.0], &[0.0, 0.5, 1.0]);
        assert_eq!(acc, [0.0, 0.5, 1.0]);
    }

    #[test]
    fn normalization_never_divides_by_zero() {
        assert_eq!(normalization(3), 1.0 / 3.0);
        assert_eq!(normalization(0), 1.0);
    }
}
