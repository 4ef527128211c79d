//! Opt-in latency sampling.
//!
//! Samples are kept in one process-wide buffer rather than per thread:
//! shard fetches run on short-lived task threads and their samples must
//! survive the join.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

/// Aggregated timing report across instrumented operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

/// Timing statistics for a single named operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTiming {
    pub name: String,
    pub p50: Duration,
    pub p95: Duration,
    pub max: Duration,
    pub count: usize,
}

static SAMPLES: Mutex<Vec<(String, Duration)>> = Mutex::new(Vec::new());

static TIMING_ENABLED: AtomicBool = AtomicBool::new(false);

/// Returns true when `HISTOIRE_TIMING` enables timing collection.
///
/// Supported truthy values: `1`, `true`, `yes`, `on` (case-insensitive).
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var("HISTOIRE_TIMING")
        .ok()
        .is_some_and(|value| is_truthy(value.as_str()))
}

/// Enable or disable timing collection.
pub fn set_timing_enabled(enabled: bool) {
    TIMING_ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear_timings();
    }
}

#[must_use]
pub fn is_timing_enabled() -> bool {
    TIMING_ENABLED.load(Ordering::Relaxed)
}

/// Drop every recorded sample.
pub fn clear_timings() {
    if let Ok(mut samples) = SAMPLES.lock() {
        samples.clear();
    }
}

/// Execute a closure while recording its duration.
///
/// Timing is recorded only when enabled via [`set_timing_enabled`].
pub fn timed<R>(name: &str, f: impl FnOnce() -> R) -> R {
    if !is_timing_enabled() {
        return f();
    }

    let started = Instant::now();
    let result = f();
    record_sample(name, started.elapsed());
    result
}

/// Drain all recorded samples into a report.
#[must_use]
pub fn collect_report() -> TimingReport {
    let samples = SAMPLES
        .lock()
        .map(|mut samples| std::mem::take(&mut *samples))
        .unwrap_or_default();

    let mut grouped: BTreeMap<String, Vec<Duration>> = BTreeMap::new();
    for (name, elapsed) in samples {
        grouped.entry(name).or_default().push(elapsed);
    }

    let operations = grouped
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpTiming {
                name,
                p50: percentile(&values, 50),
                p95: percentile(&values, 95),
                max: values.last().copied().unwrap_or_default(),
                count: values.len(),
            }
        })
        .collect();

    TimingReport { operations }
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let operations = self
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name,
                    "count": op.count,
                    "p50_us": op.p50.as_micros(),
                    "p95_us": op.p95.as_micros(),
                    "max_us": op.max.as_micros(),
                })
            })
            .collect::<Vec<_>>();

        json!({ "operations": operations })
    }

    /// Render the report as a fixed-width table for stderr.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.operations.is_empty() {
            return "No timing samples recorded.".to_string();
        }

        let mut out = String::new();
        out.push_str("operation                    count      p50      p95      max\n");
        out.push_str("--------------------------------------------------------------\n");

        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<28} {:>6} {:>8} {:>8} {:>8}",
                op.name,
                op.count,
                format_duration(op.p50),
                format_duration(op.p95),
                format_duration(op.max)
            );
        }

        out
    }
}

fn record_sample(name: &str, elapsed: Duration) {
    if let Ok(mut samples) = SAMPLES.lock() {
        samples.push((name.to_string(), elapsed));
    }
}

fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let rank = pct.min(100).saturating_mul(sorted.len()).saturating_add(99) / 100;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros >= 1_000_000 {
        format!("{}.{:03}s", micros / 1_000_000, (micros % 1_000_000) / 1_000)
    } else if micros >= 1_000 {
        format!("{}.{:03}ms", micros / 1_000, micros % 1_000)
    } else {
        format!("{micros}µs")
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|truthy| value.eq_ignore_ascii_case(truthy))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Samples are process-wide; serialize the tests that touch them.
    static TEST_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn timed_does_not_record_when_disabled() {
        let _guard = TEST_GUARD.lock().expect("test guard lock");
        set_timing_enabled(false);

        assert_eq!(timed("disabled", || 7_u8), 7);
        assert!(collect_report().operations.iter().all(|op| op.name != "disabled"));
    }

    #[test]
    fn samples_from_worker_threads_are_collected() {
        let _guard = TEST_GUARD.lock().expect("test guard lock");
        set_timing_enabled(true);
        clear_timings();

        std::thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|| {
                    timed("worker.sample", || std::thread::sleep(Duration::from_millis(1)));
                });
            }
        });

        let report = collect_report();
        let sample = report
            .operations
            .iter()
            .find(|op| op.name == "worker.sample")
            .expect("worker samples should be collected");
        assert_eq!(sample.count, 3);
        assert!(sample.p50 > Duration::ZERO);

        set_timing_enabled(false);
    }

    #[test]
    fn collect_report_groups_and_ranks() {
        let _guard = TEST_GUARD.lock().expect("test guard lock");
        clear_timings();

        record_sample("feed", Duration::from_micros(3_000));
        record_sample("feed", Duration::from_micros(1_000));
        record_sample("feed", Duration::from_micros(2_000));
        record_sample("directory.refresh", Duration::from_micros(5_000));

        let report = collect_report();
        assert!(report.operations.iter().any(|op| op.name == "directory.refresh"));

        let feed = report
            .operations
            .iter()
            .find(|op| op.name == "feed")
            .expect("feed timing should exist");
        assert_eq!(feed.count, 3);
        assert_eq!(feed.p50, Duration::from_micros(2_000));
        assert_eq!(feed.p95, Duration::from_micros(3_000));
        assert_eq!(feed.max, Duration::from_micros(3_000));
    }

    #[test]
    fn truthy_parser_is_case_insensitive() {
        assert!(is_truthy("TrUe"));
        assert!(is_truthy("1"));
        assert!(is_truthy("YES"));
        assert!(is_truthy("on"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
    }

    #[test]
    fn display_table_and_json_have_expected_fields() {
        let _guard = TEST_GUARD.lock().expect("test guard lock");
        clear_timings();

        record_sample("cmd.feed", Duration::from_micros(1_500));

        let report = collect_report();
        let table = report.display_table();
        assert!(table.contains("operation"));
        assert!(table.contains("cmd.feed"));
        assert!(table.contains("1.500ms"));

        let json = report.to_json();
        let operations = json
            .get("operations")
            .and_then(serde_json::Value::as_array)
            .expect("operations array should exist");
        let op = operations
            .iter()
            .find(|op| op.get("name") == Some(&serde_json::Value::from("cmd.feed")))
            .expect("cmd.feed entry");
        assert_eq!(op.get("count"), Some(&serde_json::Value::from(1)));
        assert!(op.get("max_us").is_some());
    }
}
