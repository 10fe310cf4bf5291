use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use volley_metrics::{MetricSeriesSummary, MetricValue, MetricsSnapshot};

use crate::pool::worker::{
    DATA_RECEIVED, DATA_SENT, HTTP_REQ_FAILED, HTTP_REQS, ITERATION_ERRORS, ITERATIONS,
};

/// Run facts shown next to the merged metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportContext {
    pub elapsed: Duration,
    pub workers: usize,
    /// Workers whose metrics are missing from the report.
    pub failed_workers: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
struct ScenarioTotals {
    iterations: u64,
    iteration_errors: u64,
    requests: u64,
    failed_requests: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

fn scenario_totals(
    metrics: &MetricsSnapshot,
    series: &[MetricSeriesSummary],
    scenarios: &[String],
) -> Vec<(String, ScenarioTotals)> {
    let iterations = metrics.counter_by_tag(ITERATIONS, "scenario");
    let errors = metrics.counter_by_tag(ITERATION_ERRORS, "scenario");
    let requests = metrics.counter_by_tag(HTTP_REQS, "scenario");
    let sent = metrics.counter_by_tag(DATA_SENT, "scenario");
    let received = metrics.counter_by_tag(DATA_RECEIVED, "scenario");

    let mut failed: BTreeMap<&str, u64> = BTreeMap::new();
    for s in series.iter().filter(|s| s.name == HTTP_REQ_FAILED) {
        let (MetricValue::Rate { hits, .. }, Some(scenario)) = (&s.values, tag(s, "scenario"))
        else {
            continue;
        };
        *failed.entry(scenario).or_default() += hits;
    }

    let get = |m: &BTreeMap<String, u64>, name: &str| m.get(name).copied().unwrap_or(0);
    scenarios
        .iter()
        .map(|name| {
            let name = name.as_str();
            let totals = ScenarioTotals {
                iterations: get(&iterations, name),
                iteration_errors: get(&errors, name),
                requests: get(&requests, name),
                failed_requests: failed.get(name).copied().unwrap_or(0),
                bytes_sent: get(&sent, name),
                bytes_received: get(&received, name),
            };
            (name.to_string(), totals)
        })
        .collect()
}

fn tag<'a>(s: &'a MetricSeriesSummary, key: &str) -> Option<&'a str> {
    s.tags
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Plain-text report; scenarios in the given order, then every series grouped by scenario.
pub(crate) fn render_human(
    metrics: &MetricsSnapshot,
    scenarios: &[String],
    ctx: &ReportContext,
) -> String {
    let series = metrics.summarize();
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(out, "  duration: {}", format_duration(ctx.elapsed)).ok();
    if ctx.failed_workers > 0 {
        writeln!(
            out,
            "  workers: {} of {} reported (result may be inaccurate)",
            ctx.workers.saturating_sub(ctx.failed_workers),
            ctx.workers
        )
        .ok();
    } else {
        writeln!(out, "  workers: {}", ctx.workers).ok();
    }

    let secs = ctx.elapsed.as_secs_f64().max(1e-9);
    for (name, t) in scenario_totals(metrics, &series, scenarios) {
        writeln!(out, "\nscenario: {name}").ok();
        writeln!(
            out,
            "  iterations: {} (errors {}) {}/s",
            t.iterations,
            t.iteration_errors,
            format_rate(t.iterations as f64 / secs)
        )
        .ok();
        if t.requests > 0 {
            writeln!(
                out,
                "  requests: {} (failed {}) {}/s",
                t.requests,
                t.failed_requests,
                format_rate(t.requests as f64 / secs)
            )
            .ok();
            writeln!(
                out,
                "  bytes: recv {} sent {}",
                format_bytes(t.bytes_received),
                format_bytes(t.bytes_sent)
            )
            .ok();
        }
    }

    render_metrics(&series, &mut out);
    out
}

fn render_metrics(series: &[MetricSeriesSummary], out: &mut String) {
    let mut by_scenario: BTreeMap<&str, Vec<&MetricSeriesSummary>> = BTreeMap::new();
    for s in series {
        by_scenario
            .entry(tag(s, "scenario").unwrap_or("global"))
            .or_default()
            .push(s);
    }

    if by_scenario.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for (scenario, rows) in by_scenario {
        writeln!(out, "scenario: {scenario}").ok();
        for s in rows {
            let tags = format_tags_inline(&s.tags, &["scenario"]);
            match &s.values {
                MetricValue::Counter(v) => writeln!(out, "    {}{tags} = {v}", s.name).ok(),
                MetricValue::Rate { total, hits, rate } => match rate {
                    Some(rate) => writeln!(
                        out,
                        "    {}{tags} = hits={hits} total={total} rate={rate:.3}",
                        s.name
                    )
                    .ok(),
                    None => writeln!(out, "    {}{tags} = hits={hits} total={total}", s.name).ok(),
                },
                MetricValue::Histogram(h) => writeln!(
                    out,
                    "    {}{tags} = p50={} p90={} p99={} mean={} max={} (n={})",
                    s.name,
                    format_micros(h.p50),
                    format_micros(h.p90),
                    format_micros(h.p99),
                    format_micros(h.mean),
                    format_micros(h.max),
                    h.count
                )
                .ok(),
            };
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    kind: &'static str,
    elapsed_secs: f64,
    workers: usize,
    failed_workers: usize,
    scenarios: Vec<JsonScenario>,
    metrics: &'a [MetricSeriesSummary],
}

#[derive(Debug, Serialize)]
struct JsonScenario {
    name: String,
    #[serde(flatten)]
    totals: ScenarioTotals,
}

/// One JSON line, `kind: "summary"`.
pub(crate) fn render_json(
    metrics: &MetricsSnapshot,
    scenarios: &[String],
    ctx: &ReportContext,
) -> serde_json::Result<String> {
    let series = metrics.summarize();
    let report = JsonReport {
        kind: "summary",
        elapsed_secs: ctx.elapsed.as_secs_f64(),
        workers: ctx.workers,
        failed_workers: ctx.failed_workers,
        scenarios: scenario_totals(metrics, &series, scenarios)
            .into_iter()
            .map(|(name, totals)| JsonScenario { name, totals })
            .collect(),
        metrics: &series,
    };
    serde_json::to_string(&report)
}

fn format_tags_inline(tags: &[(String, String)], exclude: &[&str]) -> String {
    let inner = tags
        .iter()
        .filter(|(k, _)| !exclude.contains(&k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");

    if inner.is_empty() {
        return inner;
    }
    format!("{{{inner}}}")
}

fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }
    format!("{b}B")
}

fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

// Histograms are recorded in microseconds.
fn format_micros(us: Option<f64>) -> String {
    match us {
        None => "-".to_string(),
        Some(us) if us >= 1_000_000.0 => format!("{:.2}s", us / 1_000_000.0),
        Some(us) if us >= 1_000.0 => format!("{:.2}ms", us / 1_000.0),
        Some(us) => format!("{us:.0}us"),
    }
}

fn format_duration(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_metrics::SeriesValue;

    fn scenario_tags(name: &str) -> Vec<(String, String)> {
        vec![("scenario".to_string(), name.to_string())]
    }

    fn snapshot() -> MetricsSnapshot {
        let mut m = MetricsSnapshot::default();
        m.add(ITERATIONS, scenario_tags("steady"), SeriesValue::Counter(40));
        m.add(ITERATION_ERRORS, scenario_tags("steady"), SeriesValue::Counter(1));
        m.add(
            "iteration_duration",
            scenario_tags("steady"),
            SeriesValue::histogram([1_500, 2_500]),
        );
        m.add(
            HTTP_REQS,
            vec![
                ("scenario".to_string(), "steady".to_string()),
                ("method".to_string(), "GET".to_string()),
                ("status".to_string(), "200".to_string()),
            ],
            SeriesValue::Counter(40),
        );
        m.add(
            HTTP_REQ_FAILED,
            scenario_tags("steady"),
            SeriesValue::Rate { total: 40, hits: 2 },
        );
        m.add(DATA_RECEIVED, scenario_tags("steady"), SeriesValue::Counter(2048));
        m.add(DATA_SENT, scenario_tags("steady"), SeriesValue::Counter(1024));
        m.add(ITERATIONS, scenario_tags("idle"), SeriesValue::Counter(3));
        m
    }

    fn ctx(failed_workers: usize) -> ReportContext {
        ReportContext {
            elapsed: Duration::from_secs(4),
            workers: 4,
            failed_workers,
        }
    }

    #[test]
    fn human_report_lists_scenarios_in_given_order() {
        let text = render_human(
            &snapshot(),
            &["steady".to_string(), "idle".to_string()],
            &ctx(0),
        );

        let steady = text.find("scenario: steady").unwrap_or(usize::MAX);
        let idle = text.find("scenario: idle").unwrap_or(usize::MAX);
        assert!(steady < idle, "unexpected order:\n{text}");
        assert!(text.contains("iterations: 40 (errors 1) 10.0/s"));
        assert!(text.contains("requests: 40 (failed 2)"));
        assert!(text.contains("bytes: recv 2.00KiB sent 1.00KiB"));
        assert!(text.contains("http_reqs{method=GET status=200} = 40"));
        assert!(text.contains("iteration_duration = p50="));
        assert!(text.contains("workers: 4\n"));
    }

    #[test]
    fn human_report_flags_missing_workers() {
        let text = render_human(&snapshot(), &["steady".to_string()], &ctx(1));
        assert!(text.contains("workers: 3 of 4 reported (result may be inaccurate)"));
    }

    #[test]
    fn json_report_is_one_summary_line() -> anyhow::Result<()> {
        let line = render_json(&snapshot(), &["steady".to_string()], &ctx(0))?;
        assert!(!line.contains('\n'));

        let v: serde_json::Value = serde_json::from_str(&line)?;
        assert_eq!(v["kind"], "summary");
        assert_eq!(v["workers"], 4);
        assert_eq!(v["scenarios"][0]["name"], "steady");
        assert_eq!(v["scenarios"][0]["iterations"], 40);
        assert_eq!(v["scenarios"][0]["failed_requests"], 2);
        assert!(v["metrics"].as_array().is_some_and(|m| !m.is_empty()));
        Ok(())
    }

    #[test]
    fn micros_pick_a_readable_unit() {
        assert_eq!(format_micros(None), "-");
        assert_eq!(format_micros(Some(250.0)), "250us");
        assert_eq!(format_micros(Some(1_500.0)), "1.50ms");
        assert_eq!(format_micros(Some(2_000_000.0)), "2.00s");
    }
}
