//! Process-wide timing and counters for helper calls and decode loops.
//!
//! Always on and lock free. Intended for an end-of-run summary (`tacostep -v`),
//! not for profiling individual steps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    HelperInitialize,
    HelperSample,
    HelperNextInputs,
    DecodeTotal,
    DecodeCellStep,
    DecodeSteps,
    SampledInputs,
    TeacherForcedInputs,
}

impl Metric {
    const COUNT: usize = 8;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::HelperInitialize,
        Metric::HelperSample,
        Metric::HelperNextInputs,
        Metric::DecodeTotal,
        Metric::DecodeCellStep,
        Metric::DecodeSteps,
        Metric::SampledInputs,
        Metric::TeacherForcedInputs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::HelperInitialize => "helper.initialize",
            Metric::HelperSample => "helper.sample",
            Metric::HelperNextInputs => "helper.next_inputs",
            Metric::DecodeTotal => "decode.total",
            Metric::DecodeCellStep => "decode.cell_step",
            Metric::DecodeSteps => "decode.steps",
            Metric::SampledInputs => "helper.sampled_inputs",
            Metric::TeacherForcedInputs => "helper.teacher_forced_inputs",
        }
    }

    /// Counters only accumulate `add_count` deltas; everything else is timed.
    pub fn is_counter(self) -> bool {
        matches!(
            self,
            Metric::DecodeSteps | Metric::SampledInputs | Metric::TeacherForcedInputs
        )
    }
}

#[derive(Default)]
struct Slot {
    total_us: AtomicU64,
    count: AtomicU64,
}

struct Collector {
    start: Instant,
    slots: [Slot; Metric::COUNT],
}

impl Collector {
    fn slot(&self, metric: Metric) -> &Slot {
        &self.slots[metric as usize]
    }
}

static COLLECTOR: OnceLock<Collector> = OnceLock::new();

fn collector() -> &'static Collector {
    COLLECTOR.get_or_init(|| Collector {
        start: Instant::now(),
        slots: std::array::from_fn(|_| Slot::default()),
    })
}

/// Records the time between creation and drop under its metric.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        let micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        let slot = collector().slot(self.metric);
        slot.total_us.fetch_add(micros, Ordering::Relaxed);
        slot.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Begin a timing span.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Record a counter delta.
pub fn add_count(metric: Metric, delta: u64) {
    collector()
        .slot(metric)
        .count
        .fetch_add(delta, Ordering::Relaxed);
}

/// Copy of every metric at one point in time.
#[derive(Debug, Clone)]
pub struct PerfSnapshot {
    uptime: Duration,
    totals_us: [u64; Metric::COUNT],
    counts: [u64; Metric::COUNT],
}

impl PerfSnapshot {
    /// Number of spans (timed metrics) or accumulated delta (counters).
    pub fn count(&self, metric: Metric) -> u64 {
        self.counts[metric as usize]
    }

    pub fn total(&self, metric: Metric) -> Duration {
        Duration::from_micros(self.totals_us[metric as usize])
    }

    /// Share of next inputs taken from model output, if any input was produced.
    pub fn sampled_fraction(&self) -> Option<f64> {
        let sampled = self.count(Metric::SampledInputs);
        let forced = self.count(Metric::TeacherForcedInputs);
        let total = sampled + forced;
        (total > 0).then(|| sampled as f64 / total as f64)
    }
}

impl fmt::Display for PerfSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Performance summary (uptime: {:.3}s)",
            self.uptime.as_secs_f64()
        )?;
        let recorded: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|&metric| self.count(metric) > 0)
            .collect();
        if recorded.is_empty() {
            return writeln!(f, "No performance data recorded.");
        }

        for metric in recorded.iter().filter(|m| !m.is_counter()) {
            let count = self.count(*metric);
            let total = self.total(*metric);
            writeln!(
                f,
                "  {:<32} {:>10.3}s {:>8} calls {:>10.3}ms avg",
                metric.name(),
                total.as_secs_f64(),
                count,
                total.as_secs_f64() * 1000.0 / count as f64
            )?;
        }
        for metric in recorded.iter().filter(|m| m.is_counter()) {
            writeln!(f, "  {:<32} {:>10}", metric.name(), self.count(*metric))?;
        }
        if let Some(fraction) = self.sampled_fraction() {
            writeln!(f, "  {:<32} {:>10.3}", "helper.sampled_fraction", fraction)?;
        }
        Ok(())
    }
}

/// Snapshot of all metrics recorded so far.
pub fn snapshot() -> PerfSnapshot {
    let collector = collector();
    let mut totals_us = [0u64; Metric::COUNT];
    let mut counts = [0u64; Metric::COUNT];
    for metric in Metric::ALL {
        let slot = collector.slot(metric);
        totals_us[metric as usize] = slot.total_us.load(Ordering::Relaxed);
        counts[metric as usize] = slot.count.load(Ordering::Relaxed);
    }
    PerfSnapshot {
        uptime: collector.start.elapsed(),
        totals_us,
        counts,
    }
}

/// Human-readable report of all metrics recorded so far.
pub fn report() -> String {
    snapshot().to_string()
}
