// Windowed indicator math over candle slices.
// Values are aligned to the input: index i holds the average of the window
// ending at i, or None while fewer than `length` samples are available.

/// Simple moving average. `length` is clamped to at least 1; a length of 1
/// echoes the input.
pub fn sma(values: &[f64], length: usize) -> Vec<Option<f64>> {
    let length = length.max(1);
    let mut out = vec![None; values.len()];
    if values.is_empty() {
        return out;
    }
    let mut rolling = 0.0;
    for (i, v) in values.iter().enumerate() {
        rolling += v;
        if i >= length {
            rolling -= values[i - length];
        }
        if i + 1 >= length {
            out[i] = Some(rolling / length as f64);
        }
    }
    out
}

/// Volume moving average; same windowing rules as `sma`.
pub fn volume_ma(volumes: &[f64], length: usize) -> Vec<Option<f64>> {
    sma(volumes, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_undefined_until_window_filled() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], Some(3.0));
    }

    #[test]
    fn sma_length_one_echoes_input() {
        let out = sma(&[5.0, 7.0], 1);
        assert_eq!(out, vec![Some(5.0), Some(7.0)]);
    }

    #[test]
    fn sma_length_zero_clamped() {
        let out = sma(&[5.0, 7.0], 0);
        assert_eq!(out, vec![Some(5.0), Some(7.0)]);
    }

    #[test]
    fn sma_empty_input() {
        assert!(sma(&[], 3).is_empty());
    }
}
