//! Instantaneous bottleneck flags
//!
//! Fixed threshold rules evaluated on every sample.

use super::RawSnapshot;
use crate::models::Bottlenecks;

/// Queue length above which the coordinator is considered backed up
pub const QUEUE_LENGTH_THRESHOLD: u32 = 20;

/// Active workflow count above which the engine is considered saturated
pub const ACTIVE_WORKFLOWS_THRESHOLD: u32 = 10;

/// CPU percentage above which the host is considered hot
pub const CPU_USAGE_THRESHOLD: f64 = 80.0;

/// Evaluate the bottleneck rules against a raw snapshot
pub fn detect_bottlenecks(snapshot: &RawSnapshot) -> Bottlenecks {
    let mut bottlenecks = Bottlenecks::default();

    if snapshot.coordinator.queue_length > QUEUE_LENGTH_THRESHOLD {
        flag(
            &mut bottlenecks,
            "high_queue_length",
            0.8,
            "Increase coordinator concurrency or add workers",
        );
    }

    if snapshot.workflows.active_workflows > ACTIVE_WORKFLOWS_THRESHOLD {
        flag(
            &mut bottlenecks,
            "high_workload",
            0.6,
            "Distribute workflows across more executors",
        );
    }

    if snapshot.system.cpu_usage > CPU_USAGE_THRESHOLD {
        flag(
            &mut bottlenecks,
            "high_cpu_usage",
            0.9,
            "Scale up compute resources",
        );
    }

    bottlenecks
}

fn flag(bottlenecks: &mut Bottlenecks, name: &str, impact: f64, recommendation: &str) {
    bottlenecks.identified.push(name.to_string());
    bottlenecks.impact.insert(name.to_string(), impact);
    bottlenecks.recommendations.push(recommendation.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_bottlenecks_under_thresholds() {
        let mut snapshot = RawSnapshot::default();
        snapshot.coordinator.queue_length = 20;
        snapshot.workflows.active_workflows = 10;
        snapshot.system.cpu_usage = 80.0;

        assert!(detect_bottlenecks(&snapshot).is_empty());
    }

    #[test]
    fn test_all_rules_fire_independently() {
        let mut snapshot = RawSnapshot::default();
        snapshot.coordinator.queue_length = 21;
        snapshot.workflows.active_workflows = 11;
        snapshot.system.cpu_usage = 95.0;

        let b = detect_bottlenecks(&snapshot);
        assert_eq!(
            b.identified,
            vec!["high_queue_length", "high_workload", "high_cpu_usage"]
        );
        assert_eq!(b.impact["high_queue_length"], 0.8);
        assert_eq!(b.impact["high_workload"], 0.6);
        assert_eq!(b.impact["high_cpu_usage"], 0.9);
        assert_eq!(b.recommendations.len(), 3);
    }

    #[test]
    fn test_single_rule() {
        let mut snapshot = RawSnapshot::default();
        snapshot.system.cpu_usage = 81.0;

        let b = detect_bottlenecks(&snapshot);
        assert_eq!(b.identified, vec!["high_cpu_usage"]);
    }
}
