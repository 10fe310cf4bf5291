use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::http_client;
use crate::pool::vu::micros;
use crate::pool::worker::{ScenarioMetrics, WorkerContext};

/// Work performed by one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Completes immediately.
    Noop,
    Sleep(Duration),
    Http(HttpAction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpAction {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpAction {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }
}

impl Action {
    /// Runs one iteration. HTTP error statuses are recorded as failed requests, not as errors.
    pub(crate) async fn run(
        &self,
        ctx: &WorkerContext,
        scenario: &str,
        metrics: &ScenarioMetrics,
    ) -> http_client::Result<()> {
        match self {
            Self::Noop => {
                tokio::task::yield_now().await;
                Ok(())
            }
            Self::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            Self::Http(req) => {
                let started = Instant::now();
                let result = ctx.http.send(req).await;
                metrics.http_req_duration.observe(micros(started.elapsed()));

                let res = match result {
                    Ok(res) => res,
                    Err(err) => {
                        metrics.http_req_failed.add_rate(true);
                        ctx.http_reqs(scenario, req.method.as_str(), "0").increment(1);
                        return Err(err);
                    }
                };

                metrics.http_req_failed.add_rate(res.status >= 400);
                metrics.data_sent.increment(res.bytes_sent);
                metrics.data_received.increment(res.bytes_received);
                ctx.http_reqs(scenario, req.method.as_str(), &res.status.to_string())
                    .increment(1);
                Ok(())
            }
        }
    }
}
