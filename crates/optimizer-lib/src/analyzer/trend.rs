//! Short-term trend classification

use crate::models::{MetricKind, MetricSample, ResourceTrend, Trend};

/// Number of samples a trend is computed over
pub const TREND_WINDOW: usize = 3;

/// CPU change per sample beyond which resource consumption is trending
pub const RESOURCE_TREND_THRESHOLD: f64 = 5.0;

/// Classify a metric over the last three samples
///
/// Two consecutive moves in the undesired direction is degrading, two in
/// the desired direction is improving, anything else is stable. Only
/// response time treats a falling value as improving; every other metric,
/// utilization included, reads rising as improving.
pub fn trend(metric: MetricKind, samples: &[MetricSample]) -> Trend {
    let Some(window) = last_window(samples) else {
        return Trend::Stable;
    };

    let values: Vec<f64> = window.iter().map(|s| metric.value(s)).collect();
    let d1 = values[1] - values[0];
    let d2 = values[2] - values[1];

    let rising = d1 > 0.0 && d2 > 0.0;
    let falling = d1 < 0.0 && d2 < 0.0;

    match (rising, falling, metric == MetricKind::ResponseTime) {
        (true, _, true) | (_, true, false) => Trend::Degrading,
        (_, true, true) | (true, _, false) => Trend::Improving,
        _ => Trend::Stable,
    }
}

/// Classify CPU consumption over the last three samples
pub fn resource_trend(samples: &[MetricSample]) -> ResourceTrend {
    let Some(window) = last_window(samples) else {
        return ResourceTrend::Stable;
    };

    let delta = (window[2].resource_utilization.cpu - window[0].resource_utilization.cpu) / 2.0;
    if delta > RESOURCE_TREND_THRESHOLD {
        ResourceTrend::Increasing
    } else if delta < -RESOURCE_TREND_THRESHOLD {
        ResourceTrend::Decreasing
    } else {
        ResourceTrend::Stable
    }
}

fn last_window(samples: &[MetricSample]) -> Option<&[MetricSample]> {
    if samples.len() < TREND_WINDOW {
        return None;
    }
    Some(&samples[samples.len() - TREND_WINDOW..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::sample_with;

    fn response_times(values: &[f64]) -> Vec<MetricSample> {
        values
            .iter()
            .map(|v| sample_with(|s| s.performance.response_time_ms = *v))
            .collect()
    }

    fn cpu(values: &[f64]) -> Vec<MetricSample> {
        values
            .iter()
            .map(|v| sample_with(|s| s.resource_utilization.cpu = *v))
            .collect()
    }

    #[test]
    fn test_rising_response_time_is_degrading() {
        let samples = response_times(&[150.0, 180.0, 220.0]);
        assert_eq!(trend(MetricKind::ResponseTime, &samples), Trend::Degrading);
    }

    #[test]
    fn test_falling_response_time_is_improving() {
        let samples = response_times(&[220.0, 180.0, 150.0]);
        assert_eq!(trend(MetricKind::ResponseTime, &samples), Trend::Improving);
    }

    #[test]
    fn test_mixed_moves_are_stable() {
        let samples = response_times(&[150.0, 180.0, 170.0]);
        assert_eq!(trend(MetricKind::ResponseTime, &samples), Trend::Stable);
    }

    #[test]
    fn test_rising_throughput_is_improving() {
        let samples: Vec<_> = [80.0, 90.0, 100.0]
            .iter()
            .map(|v| sample_with(|s| s.performance.throughput = *v))
            .collect();
        assert_eq!(trend(MetricKind::Throughput, &samples), Trend::Improving);
    }

    #[test]
    fn test_falling_quality_is_degrading() {
        let samples: Vec<_> = [95.0, 90.0, 80.0]
            .iter()
            .map(|v| sample_with(|s| s.quality.overall = *v))
            .collect();
        assert_eq!(trend(MetricKind::Quality, &samples), Trend::Degrading);
    }

    #[test]
    fn test_only_last_three_samples_count() {
        let samples = response_times(&[500.0, 100.0, 150.0, 180.0, 220.0]);
        assert_eq!(trend(MetricKind::ResponseTime, &samples), Trend::Degrading);
    }

    #[test]
    fn test_short_history_is_stable() {
        let samples = response_times(&[150.0, 220.0]);
        assert_eq!(trend(MetricKind::ResponseTime, &samples), Trend::Stable);
        assert_eq!(resource_trend(&samples), ResourceTrend::Stable);
        assert_eq!(trend(MetricKind::Cpu, &[]), Trend::Stable);
    }

    #[test]
    fn test_cpu_increasing() {
        // (72 - 50) / 2 = 11
        assert_eq!(resource_trend(&cpu(&[50.0, 60.0, 72.0])), ResourceTrend::Increasing);
    }

    #[test]
    fn test_cpu_decreasing_and_stable() {
        assert_eq!(resource_trend(&cpu(&[72.0, 60.0, 50.0])), ResourceTrend::Decreasing);
        // (60 - 50) / 2 = 5 is not beyond the threshold
        assert_eq!(resource_trend(&cpu(&[50.0, 70.0, 60.0])), ResourceTrend::Stable);
    }
}
