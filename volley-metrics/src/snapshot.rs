use hdrhistogram::Histogram;
use std::collections::BTreeMap;

use crate::metrics::{
    MetricKind, MetricSeriesSummary, MetricValue, new_default_histogram, summarize_histogram,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SeriesKey {
    name: String,
    kind: MetricKind,
    tags: Vec<(String, String)>,
}

/// Point-in-time value of one series.
#[derive(Debug, Clone)]
pub enum SeriesValue {
    Counter(u64),
    Rate { total: u64, hits: u64 },
    /// Microsecond samples.
    Histogram(Histogram<u64>),
}

impl SeriesValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Rate { .. } => MetricKind::Rate,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }

    /// Builds a histogram value from raw samples.
    pub fn histogram(samples: impl IntoIterator<Item = u64>) -> Self {
        let mut h = new_default_histogram();
        for v in samples {
            let _ = h.record(v);
        }
        Self::Histogram(h)
    }

    fn absorb(&mut self, other: SeriesValue) {
        match (self, other) {
            (Self::Counter(a), Self::Counter(b)) => *a = a.saturating_add(b),
            (
                Self::Rate { total, hits },
                Self::Rate {
                    total: other_total,
                    hits: other_hits,
                },
            ) => {
                *total = total.saturating_add(other_total);
                *hits = hits.saturating_add(other_hits);
            }
            (Self::Histogram(a), Self::Histogram(b)) => {
                // Both sides auto-resize, so the addend always fits.
                let _ = a.add(&b);
            }
            // Keys carry the kind, so mismatched variants never share a key.
            _ => {}
        }
    }

    fn to_value(&self) -> MetricValue {
        match self {
            Self::Counter(v) => MetricValue::Counter(*v),
            Self::Rate { total, hits } => MetricValue::Rate {
                total: *total,
                hits: *hits,
                rate: (*total > 0).then(|| *hits as f64 / *total as f64),
            },
            Self::Histogram(h) => MetricValue::Histogram(summarize_histogram(h)),
        }
    }
}

/// Metrics of one or more workers, keyed by plain strings so snapshots from independent
/// registries can be combined.
///
/// Merging is associative and commutative: counters and rates add component-wise
/// and histograms add their bucket counts. Dropping some workers' snapshots therefore still
/// leaves a consistent (if incomplete) aggregate.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    series: BTreeMap<SeriesKey, SeriesValue>,
}

impl MetricsSnapshot {
    /// Adds `value` to the series identified by `name` and `tags`.
    pub fn add(&mut self, name: &str, mut tags: Vec<(String, String)>, value: SeriesValue) {
        tags.sort();
        let key = SeriesKey {
            name: name.to_string(),
            kind: value.kind(),
            tags,
        };

        match self.series.get_mut(&key) {
            Some(existing) => existing.absorb(value),
            None => {
                self.series.insert(key, value);
            }
        }
    }

    pub fn merge(&mut self, other: MetricsSnapshot) {
        for (key, value) in other.series {
            match self.series.get_mut(&key) {
                Some(existing) => existing.absorb(value),
                None => {
                    self.series.insert(key, value);
                }
            }
        }
    }

    pub fn merge_all(snapshots: impl IntoIterator<Item = MetricsSnapshot>) -> Self {
        snapshots
            .into_iter()
            .fold(Self::default(), |mut acc, s| {
                acc.merge(s);
                acc
            })
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Sums a counter across series, grouped by the value of `tag`.
    ///
    /// Series without the tag are ignored.
    pub fn counter_by_tag(&self, name: &str, tag: &str) -> BTreeMap<String, u64> {
        let mut out: BTreeMap<String, u64> = BTreeMap::new();
        for (key, value) in &self.series {
            let SeriesValue::Counter(v) = value else {
                continue;
            };
            if key.name != name {
                continue;
            }
            let Some((_, group)) = key.tags.iter().find(|(k, _)| k == tag) else {
                continue;
            };
            let entry = out.entry(group.clone()).or_default();
            *entry = entry.saturating_add(*v);
        }
        out
    }

    /// Summaries ordered by metric name, then kind, then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        self.series
            .iter()
            .map(|(key, value)| MetricSeriesSummary {
                name: key.name.clone(),
                kind: key.kind,
                tags: key.tags.clone(),
                values: value.to_value(),
            })
            .collect()
    }
}
