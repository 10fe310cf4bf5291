use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Rate,
    Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Counter(u64),
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Histogram(HistogramSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub min: Option<f64>,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

/// Histogram used for every duration series. Values are microseconds.
///
/// Auto-resize is enabled so that histograms from different workers can always be added
/// together, whatever range each of them has seen.
pub(crate) fn new_default_histogram() -> Histogram<u64> {
    let mut h = match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    };
    h.auto(true);
    h
}

pub(crate) fn summarize_histogram(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let non_empty = count > 0;
    let q = |quantile: f64| non_empty.then(|| h.value_at_quantile(quantile) as f64);

    HistogramSummary {
        min: non_empty.then(|| h.min() as f64),
        mean: non_empty.then(|| h.mean()),
        p50: q(0.50),
        p90: q(0.90),
        p95: q(0.95),
        p99: q(0.99),
        max: non_empty.then(|| h.max() as f64),
        stdev: non_empty.then(|| h.stdev()),
        count,
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Rate(Arc<Rate>),
    Histogram(Arc<Mutex<Histogram<u64>>>),
}

#[derive(Debug, Default)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Rate => Self::Rate(Arc::new(Rate::default())),
            MetricKind::Histogram => Self::Histogram(Arc::new(Mutex::new(new_default_histogram()))),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            Self::Counter(a) => MetricHandle::Counter(a.clone()),
            Self::Rate(a) => MetricHandle::Rate(a.clone()),
            Self::Histogram(a) => MetricHandle::Histogram(a.clone()),
        }
    }
}

/// Cheap, cloneable write handle to one series.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Rate(Arc<Rate>),
    Histogram(Arc<Mutex<Histogram<u64>>>),
}

impl MetricHandle {
    /// Handle backed by storage that no registry sees.
    pub fn detached(kind: MetricKind) -> Self {
        MetricStorage::new(kind).handle()
    }

    #[inline]
    pub fn increment(&self, value: u64) {
        if let Self::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let Self::Rate(r) = self {
            r.total.fetch_add(1, Ordering::Relaxed);
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn observe(&self, value: u64) {
        if let Self::Histogram(h) = self {
            let _ = h.lock().record(value);
        }
    }

    pub fn counter_value(&self) -> u64 {
        match self {
            Self::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }
}
