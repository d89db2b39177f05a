//! Discrete shutter-speed ladder and shutter fraction labels.

/// Exposure stops in microseconds, ascending.
pub const EXPOSURE_STOPS_US: [u32; 8] = [50, 100, 200, 350, 650, 1300, 2550, 5050];

/// Classic shutter denominators used for labels, descending.
pub const SHUTTER_DENOMINATORS: [u32; 19] = [
    20000, 10000, 8000, 6400, 5000, 4000, 3200, 2500, 2000, 1600, 1250, 1000, 800, 640, 500, 400,
    320, 250, 200,
];

/// Index of the stop closest to `value_us`.
///
/// Ties keep the first (lower) stop.
pub fn nearest_stop_index(value_us: f64) -> usize {
    let mut best = 0;
    let mut best_diff = (value_us - EXPOSURE_STOPS_US[0] as f64).abs();
    for (idx, stop) in EXPOSURE_STOPS_US.iter().enumerate().skip(1) {
        let diff = (value_us - *stop as f64).abs();
        if diff < best_diff {
            best = idx;
            best_diff = diff;
        }
    }
    best
}

/// Move `delta` stops from `index`, clamped to the ladder.
pub fn step_by(index: usize, delta: i32) -> usize {
    let last = EXPOSURE_STOPS_US.len() as i64 - 1;
    (index as i64 + delta as i64).clamp(0, last) as usize
}

/// Format an exposure time as a shutter fraction such as `1/200`.
pub fn format_as_fraction(microseconds: f64) -> String {
    let approx = (1_000_000.0 / microseconds.max(1.0)).round().max(1.0);
    format!("1/{}", nearest_denominator(approx))
}

fn nearest_denominator(approx: f64) -> u32 {
    let mut best = SHUTTER_DENOMINATORS[0];
    let mut best_diff = (best as f64 - approx).abs();
    for &denom in &SHUTTER_DENOMINATORS[1..] {
        let diff = (denom as f64 - approx).abs();
        if diff < best_diff {
            best = denom;
            best_diff = diff;
        }
    }
    best
}

/// Position on the exposure ladder.
///
/// The exposure time is always derived from the index, so stepping stays
/// monotonic and lands on a defined stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StopIndex(usize);

impl StopIndex {
    pub const FIRST: StopIndex = StopIndex(0);
    pub const LAST: StopIndex = StopIndex(EXPOSURE_STOPS_US.len() - 1);

    /// Build an index, clamping out-of-range values onto the ladder.
    pub fn new(index: usize) -> Self {
        StopIndex(index.min(Self::LAST.0))
    }

    /// Snap an exposure time onto the nearest stop.
    pub fn nearest(value_us: f64) -> Self {
        StopIndex(nearest_stop_index(value_us))
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Exposure time of this stop in microseconds.
    pub fn value_us(self) -> u32 {
        EXPOSURE_STOPS_US[self.0]
    }

    /// The stop `delta` rungs away, or `None` when the clamp leaves the index unchanged.
    pub fn step(self, delta: i32) -> Option<StopIndex> {
        let next = step_by(self.0, delta);
        (next != self.0).then_some(StopIndex(next))
    }

    /// Shutter fraction label for this stop.
    pub fn label(self) -> String {
        format_as_fraction(self.value_us() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_prefers_lower_stop_on_ties() {
        assert_eq!(nearest_stop_index(75.0), 0);
        assert_eq!(nearest_stop_index(150.0), 1);
        assert_eq!(nearest_stop_index(600.0), 4);
        assert_eq!(nearest_stop_index(-10.0), 0);
        assert_eq!(nearest_stop_index(1e9), 7);
    }

    #[test]
    fn nearest_is_idempotent() {
        for value in (0..6000).step_by(7) {
            let idx = nearest_stop_index(value as f64);
            let snapped = EXPOSURE_STOPS_US[idx] as f64;
            assert_eq!(nearest_stop_index(snapped), idx);
        }
    }

    #[test]
    fn step_stays_on_ladder() {
        assert_eq!(step_by(0, -5), 0);
        assert_eq!(step_by(7, 5), 7);
        assert_eq!(step_by(3, 1), 4);
        assert_eq!(step_by(3, -2), 1);
        for idx in 0..8 {
            for delta in -20..20 {
                assert!(step_by(idx, delta) <= 7);
            }
        }
    }

    #[test]
    fn stop_index_step_reports_noop() {
        assert_eq!(StopIndex::FIRST.step(-1), None);
        assert_eq!(StopIndex::LAST.step(3), None);
        assert_eq!(StopIndex::new(2).step(1), Some(StopIndex::new(3)));
        assert_eq!(StopIndex::new(42), StopIndex::LAST);
        assert_eq!(StopIndex::nearest(600.0).value_us(), 650);
    }

    #[test]
    fn fraction_labels() {
        assert_eq!(format_as_fraction(50.0), "1/20000");
        assert_eq!(format_as_fraction(100.0), "1/10000");
        assert_eq!(format_as_fraction(350.0), "1/3200");
        assert_eq!(format_as_fraction(600.0), "1/1600");
        assert_eq!(format_as_fraction(5050.0), "1/200");
        // far beyond the list snaps to the last candidate
        assert_eq!(format_as_fraction(1_000_000.0), "1/200");
        // sub-microsecond values are treated as 1us
        assert_eq!(format_as_fraction(0.0), "1/20000");
    }

    #[test]
    fn denominator_ties_prefer_larger_candidate() {
        // 9000 is equidistant from 10000 and 8000
        assert_eq!(nearest_denominator(9000.0), 10000);
        assert_eq!(nearest_denominator(225.0), 250);
    }
}
