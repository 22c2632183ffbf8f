// src/resolve/window.rs
//! Window arithmetic for sliding-window support tests.
//!
//! A test slides an r-sized window across head + repeat + tail. For `t`
//! window positions the stitched sequence needs `t - 1` extra bases beyond
//! the window, and the repeat must keep at least `min_margin` flanking bases
//! on each side in every position.

/// Shortest window that admits `tests` sliding positions over a repeat.
pub fn min_window_length(tests: usize, repeat_size: usize, min_margin: usize) -> usize {
    tests - 1 + min_margin + repeat_size + min_margin
}

pub fn window_long_enough(
    window_size: usize,
    tests: usize,
    repeat_size: usize,
    min_margin: usize,
) -> bool {
    window_size >= min_window_length(tests, repeat_size, min_margin)
}

/// Flanking length required on each side of the repeat.
pub fn margin(window_size: usize, tests: usize, repeat_size: usize, min_margin: usize) -> usize {
    assert!(window_long_enough(window_size, tests, repeat_size, min_margin));
    let required_seq_size = window_size + tests - 1;
    let margin = (required_seq_size - repeat_size + 1) / 2;
    assert!(margin >= min_margin);
    margin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::MIN_MARGIN;

    #[test]
    fn test_min_window_length() {
        assert_eq!(min_window_length(9, 20, MIN_MARGIN), 32);
        assert_eq!(min_window_length(1, 2, MIN_MARGIN), 6);
    }

    #[test]
    fn test_margin_bounds() {
        // For any viable (w, t, rho) the margin stays at or above the
        // minimum and the stitched sequence fits in [w, 2w).
        for w in 8..80 {
            for t in 1..40 {
                for rho in 2..40 {
                    if !window_long_enough(w, t, rho, MIN_MARGIN) {
                        continue;
                    }
                    let m = margin(w, t, rho, MIN_MARGIN);
                    assert!(m >= MIN_MARGIN);
                    let stitched = m + rho + m;
                    assert!(stitched >= w, "w={} t={} rho={}", w, t, rho);
                    assert!(stitched < 2 * w, "w={} t={} rho={}", w, t, rho);
                }
            }
        }
    }

    #[test]
    fn test_margin_admits_planned_tests() {
        // The trimmed sequence must allow at least the planned tests and at
        // most one extra.
        for w in 8..80 {
            for t in 1..40 {
                for rho in 2..40 {
                    if !window_long_enough(w, t, rho, MIN_MARGIN) {
                        continue;
                    }
                    let m = margin(w, t, rho, MIN_MARGIN);
                    let possible = m + rho + m - w + 1;
                    assert!(possible >= t, "w={} t={} rho={}", w, t, rho);
                    assert!(possible <= t + 1, "w={} t={} rho={}", w, t, rho);
                }
            }
        }
    }
}
