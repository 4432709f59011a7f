//! Reference block statistics.
//!
//! These are sanity checks on a block's byte distribution, not proofs of
//! entropy. Passing them is necessary but not sufficient.

/// Number of histogram bins for byte values.
pub const BYTE_BINS: usize = 256;

/// Counts occurrences of each byte value.
pub fn byte_histogram(data: &[u8]) -> [u64; BYTE_BINS] {
    let mut bins = [0u64; BYTE_BINS];
    for &b in data {
        bins[b as usize] += 1;
    }
    bins
}

/// Pearson chi-square of the byte histogram against a uniform distribution.
///
/// With 255 degrees of freedom, values near 255 are expected for good
/// data; values far above suggest bias. Returns 0.0 for empty input.
pub fn chi_square(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let expected = data.len() as f64 / BYTE_BINS as f64;

    byte_histogram(data)
        .iter()
        .map(|&observed| {
            let delta = observed as f64 - expected;
            delta * delta / expected
        })
        .sum()
}

/// Fraction of set bits minus 0.5, in [-0.5, 0.5].
pub fn bit_bias(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let ones: u64 = data.iter().map(|b| u64::from(b.count_ones())).sum();
    ones as f64 / (data.len() as f64 * 8.0) - 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_histogram_zero_chi() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        assert!(chi_square(&data).abs() < 1e-9);
    }

    #[test]
    fn test_constant_data_maximal_chi() {
        // All mass in one bin: (n - n/256)^2/(n/256) + 255 * n/256 = 255n
        let data = vec![0x80u8; 1024];
        assert!((chi_square(&data) - 255.0 * 1024.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(chi_square(&[]), 0.0);
        assert_eq!(bit_bias(&[]), 0.0);
    }

    #[test]
    fn test_bit_bias_extremes() {
        assert!((bit_bias(&[0xFF; 16]) - 0.5).abs() < 1e-12);
        assert!((bit_bias(&[0x00; 16]) + 0.5).abs() < 1e-12);
        assert!(bit_bias(&[0x0F; 16]).abs() < 1e-12);
    }
}
