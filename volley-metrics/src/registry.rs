use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::Ordering;

use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricStorage};
use crate::snapshot::{MetricsSnapshot, SeriesValue};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// Live metrics owned by one worker.
///
/// Writers hold [`MetricHandle`]s; readers take a [`MetricsSnapshot`], which is the only
/// form that leaves the worker.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Registers `name`, or returns the existing id if it is already known.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        let name_id = self.interner.intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name_id) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        id
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.interner.intern(k), self.interner.intern(v))),
        )
    }

    /// Write handle for one series, creating the series on first use.
    pub fn handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let series = self.storage.get(&metric)?;
        if let Some(storage) = series.get(&tags) {
            return Some(storage.handle());
        }

        let kind = self.defs.read().get(metric.0 as usize)?.kind;
        let storage = series
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut out = MetricsSnapshot::default();
        let defs = self.defs.read();

        for entry in self.storage.iter() {
            let Some(def) = defs.get(entry.key().0 as usize) else {
                continue;
            };
            let name = self.interner.resolve(def.name).unwrap_or_default();

            for series in entry.value().iter() {
                let tags: Vec<(String, String)> = series
                    .key()
                    .iter()
                    .map(|(k, v)| (self.resolve_string(k), self.resolve_string(v)))
                    .collect();

                let value = match series.value() {
                    MetricStorage::Counter(c) => SeriesValue::Counter(c.load(Ordering::Relaxed)),
                    MetricStorage::Rate(r) => SeriesValue::Rate {
                        total: r.total.load(Ordering::Relaxed),
                        hits: r.hits.load(Ordering::Relaxed),
                    },
                    MetricStorage::Histogram(h) => SeriesValue::Histogram(h.lock().clone()),
                };

                out.add(&name, tags, value);
            }
        }

        out
    }

    fn resolve_string(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricValue;

    #[test]
    fn register_is_idempotent_by_name() {
        let registry = Registry::default();
        let a = registry.register("iterations", MetricKind::Counter);
        let b = registry.register("iterations", MetricKind::Counter);
        let c = registry.register("iteration_duration", MetricKind::Histogram);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn handles_share_series_storage() {
        let registry = Registry::default();
        let id = registry.register("iterations", MetricKind::Counter);
        let tags = registry.resolve_tags(&[("scenario", "steady")]);

        let Some(h1) = registry.handle(id, tags.clone()) else {
            panic!("expected handle");
        };
        let Some(h2) = registry.handle(id, tags) else {
            panic!("expected handle");
        };
        h1.increment(2);
        h2.increment(3);
        assert_eq!(h1.counter_value(), 5);
    }

    #[test]
    fn snapshot_resolves_names_and_tags() {
        let registry = Registry::default();
        let iterations = registry.register("iterations", MetricKind::Counter);
        let duration = registry.register("iteration_duration", MetricKind::Histogram);

        let tags = registry.resolve_tags(&[("scenario", "steady")]);
        if let Some(h) = registry.handle(iterations, tags.clone()) {
            h.increment(4);
        }
        if let Some(h) = registry.handle(duration, tags) {
            h.observe(1_500);
        }

        let summary = registry.snapshot().summarize();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].name, "iterations");
        assert_eq!(
            summary[1].tags,
            vec![("scenario".to_string(), "steady".to_string())]
        );
        assert_eq!(summary[1].values, MetricValue::Counter(4));
    }

    #[test]
    fn unknown_metric_has_no_handle() {
        let registry = Registry::default();
        let other = Registry::default();
        let id = other.register("iterations", MetricKind::Counter);
        let _ = other.register("data_sent", MetricKind::Counter);
        let id2 = other.register("data_received", MetricKind::Counter);
        assert!(registry.handle(id, TagSet::default()).is_none());
        assert!(registry.handle(id2, TagSet::default()).is_none());
    }
}
