/// Percentiles reported at the end of a run, highest first.
pub const PERCENTILES: [f64; 5] = [99.0, 95.0, 90.0, 75.0, 50.0];

/// Collects total latencies (milliseconds) of the requests that count.
#[derive(Debug, Default, Clone)]
pub struct StatsAggregator {
    totals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// `(percentile, value)` pairs in the order of [`PERCENTILES`].
    pub percentiles: Vec<(f64, f64)>,
}

impl StatsAggregator {
    pub fn record(&mut self, total_ms: f64) {
        self.totals.push(total_ms);
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    /// `None` when nothing was recorded.
    pub fn summary(&self) -> Option<Summary> {
        summarize(&self.totals)
    }
}

pub fn summarize(totals: &[f64]) -> Option<Summary> {
    if totals.is_empty() {
        return None;
    }
    let mut sorted = totals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(Summary {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        percentiles: PERCENTILES
            .iter()
            .map(|&p| (p, percentile(&sorted, p)))
            .collect(),
    })
}

/// Linear interpolation between the closest ranks of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_summary_of_five_values() {
        let summary = summarize(&[30.0, 10.0, 50.0, 20.0, 40.0]).unwrap();
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 50.0);
        assert_eq!(summary.mean, 30.0);

        let p = |wanted: f64| {
            summary
                .percentiles
                .iter()
                .find(|(p, _)| *p == wanted)
                .map(|(_, v)| *v)
                .unwrap()
        };
        assert!(close(p(50.0), 30.0));
        assert!(close(p(75.0), 40.0));
        assert!(close(p(90.0), 46.0));
        assert!(close(p(95.0), 48.0));
        assert!(close(p(99.0), 49.6));
    }

    #[test]
    fn test_percentiles_in_report_order() {
        let summary = summarize(&[1.0, 2.0]).unwrap();
        let order: Vec<f64> = summary.percentiles.iter().map(|(p, _)| *p).collect();
        assert_eq!(order, PERCENTILES.to_vec());
    }

    #[test]
    fn test_single_value() {
        let summary = summarize(&[12.5]).unwrap();
        assert_eq!(summary.min, 12.5);
        assert_eq!(summary.max, 12.5);
        assert!(summary.percentiles.iter().all(|(_, v)| *v == 12.5));
    }

    #[test]
    fn test_empty_has_no_summary() {
        let aggregator = StatsAggregator::default();
        assert!(aggregator.is_empty());
        assert!(aggregator.summary().is_none());
    }

    #[test]
    fn test_aggregator_keeps_insertion_order() {
        let mut aggregator = StatsAggregator::default();
        aggregator.record(3.0);
        aggregator.record(1.0);
        assert_eq!(aggregator.totals(), &[3.0, 1.0]);
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.summary().unwrap().min, 1.0);
    }
}
