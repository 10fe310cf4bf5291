use std::time::Duration;

/// How the live progress block is drawn while the run is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressMode {
    /// Redraw in place once per sample.
    #[default]
    Live,
    /// Only print the final block.
    Off,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Human,
    Json,
}

/// Run-wide settings. Run-shape overrides (`vus`, `iterations`, `duration`) take precedence
/// over the values declared by each scenario.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,

    pub progress: ProgressMode,
    pub report: ReportFormat,

    /// Sampler period.
    pub sample_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            vus: None,
            iterations: None,
            duration: None,
            progress: ProgressMode::default(),
            report: ReportFormat::default(),
            sample_interval: Duration::from_secs(1),
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn overrides_run_shape(&self) -> bool {
        self.vus.is_some() || self.iterations.is_some() || self.duration.is_some()
    }
}
