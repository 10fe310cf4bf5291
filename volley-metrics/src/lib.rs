mod key;
pub mod metrics;
pub mod registry;
pub mod snapshot;
pub mod tags;

pub use key::KeyId;
pub use metrics::{HistogramSummary, MetricHandle, MetricKind, MetricSeriesSummary, MetricValue};
pub use registry::{MetricId, Registry};
pub use snapshot::{MetricsSnapshot, SeriesValue};
pub use tags::TagSet;
