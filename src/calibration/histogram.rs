// Rest-level histogram
//
// A frequency table over the full ADC range, filled while the guided
// procedure collects the resting signal. Histograms are the only large
// dynamic allocation in the core: the procedure allocates them on entering
// the collection phase and frees them as soon as the medians are extracted.

/// Frequency table over 0..=max_reading plus a running sample count
#[derive(Debug, Clone)]
pub struct Histogram {
    counts: Vec<u32>,
    total: u32,
}

impl Histogram {
    pub fn new(max_reading: u16) -> Self {
        Self {
            counts: vec![0; max_reading as usize + 1],
            total: 0,
        }
    }

    /// Count one sample; out-of-range values are ignored
    pub fn record(&mut self, value: u16) {
        if let Some(count) = self.counts.get_mut(value as usize) {
            *count += 1;
            self.total += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Median by cumulative count: the first value whose cumulative
    /// frequency reaches half the samples (rounded up). Ties break toward
    /// the first value reaching that count. None if nothing was recorded.
    pub fn median(&self) -> Option<u16> {
        if self.total == 0 {
            return None;
        }
        let target = self.total / 2 + self.total % 2;
        let mut cumulative = 0u32;
        for (value, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return Some(value as u16);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_median() {
        let hist = Histogram::new(1023);
        assert_eq!(hist.median(), None);
        assert_eq!(hist.total(), 0);
    }

    #[test]
    fn test_single_sample_is_its_own_median() {
        let mut hist = Histogram::new(1023);
        hist.record(650);
        assert_eq!(hist.median(), Some(650));
    }

    #[test]
    fn test_median_of_known_distribution() {
        let mut hist = Histogram::new(1023);
        // 3 x 100, 4 x 200, 3 x 300: cumulative hits 5 of 10 inside 200
        for _ in 0..3 {
            hist.record(100);
        }
        for _ in 0..4 {
            hist.record(200);
        }
        for _ in 0..3 {
            hist.record(300);
        }
        assert_eq!(hist.median(), Some(200));
    }

    #[test]
    fn test_tie_broken_by_first_value_reaching_count() {
        let mut hist = Histogram::new(1023);
        // 2 x 400, 2 x 500: the 50th-percentile count (2) is reached at 400
        hist.record(400);
        hist.record(400);
        hist.record(500);
        hist.record(500);
        assert_eq!(hist.median(), Some(400));
    }

    #[test]
    fn test_out_of_range_sample_is_ignored() {
        let mut hist = Histogram::new(255);
        hist.record(300);
        assert_eq!(hist.total(), 0);
        hist.record(255);
        assert_eq!(hist.total(), 1);
    }
}
