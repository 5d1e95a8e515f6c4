//! Counters, gauges and histograms wired into the event and call pipelines,
//! exposed over an HTTP endpoint in the Prometheus text format.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use warp::path::FullPath;
use warp::Filter;

use crate::config::MetricsConfig;

const NAMESPACE: &str = "vk_mesos";

/// The scheduler's metric families, all registered against one registry.
/// Cloning is cheap; the underlying collectors are shared.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    call_count: IntCounterVec,
    call_error_count: IntCounterVec,
    call_latency: HistogramVec,
    event_received_count: IntCounterVec,
    event_error_count: IntCounterVec,
    event_received_latency: HistogramVec,
    offers_received: IntCounter,
    offers_declined: IntCounter,
    tasks_launched: IntCounter,
    tasks_finished: IntCounter,
    launches_per_offer_cycle: Histogram,
    offered_resources: HistogramVec,
    job_start_count: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let call_count = IntCounterVec::new(
            Opts::new("call_count", "Calls sent to the master").namespace(NAMESPACE),
            &["type"],
        )?;
        let call_error_count = IntCounterVec::new(
            Opts::new("call_error_count", "Calls that failed to send").namespace(NAMESPACE),
            &["type"],
        )?;
        let call_latency = HistogramVec::new(
            HistogramOpts::new("call_latency_seconds", "Latency of calls to the master")
                .namespace(NAMESPACE),
            &["type"],
        )?;
        let event_received_count = IntCounterVec::new(
            Opts::new("event_received_count", "Events received on the subscription")
                .namespace(NAMESPACE),
            &["type"],
        )?;
        let event_error_count = IntCounterVec::new(
            Opts::new("event_error_count", "Events whose handling failed").namespace(NAMESPACE),
            &["type"],
        )?;
        let event_received_latency = HistogramVec::new(
            HistogramOpts::new("event_received_latency_seconds", "Latency of event handling")
                .namespace(NAMESPACE),
            &["type"],
        )?;
        let offers_received = IntCounter::with_opts(
            Opts::new("offers_received", "Resource offers received").namespace(NAMESPACE),
        )?;
        let offers_declined = IntCounter::with_opts(
            Opts::new("offers_declined", "Resource offers declined").namespace(NAMESPACE),
        )?;
        let tasks_launched = IntCounter::with_opts(
            Opts::new("tasks_launched", "Tasks launched").namespace(NAMESPACE),
        )?;
        let tasks_finished = IntCounter::with_opts(
            Opts::new("tasks_finished", "Tasks that finished").namespace(NAMESPACE),
        )?;
        let launches_per_offer_cycle = Histogram::with_opts(
            HistogramOpts::new(
                "launches_per_offer_cycle",
                "Tasks launched per offer cycle",
            )
            .namespace(NAMESPACE),
        )?;
        let offered_resources = HistogramVec::new(
            HistogramOpts::new("offered_resources", "Scalar quantities seen in offers")
                .namespace(NAMESPACE),
            &["resource"],
        )?;
        let job_start_count = IntCounterVec::new(
            Opts::new("job_start_count", "Starts of internal jobs").namespace(NAMESPACE),
            &["job"],
        )?;

        registry.register(Box::new(call_count.clone()))?;
        registry.register(Box::new(call_error_count.clone()))?;
        registry.register(Box::new(call_latency.clone()))?;
        registry.register(Box::new(event_received_count.clone()))?;
        registry.register(Box::new(event_error_count.clone()))?;
        registry.register(Box::new(event_received_latency.clone()))?;
        registry.register(Box::new(offers_received.clone()))?;
        registry.register(Box::new(offers_declined.clone()))?;
        registry.register(Box::new(tasks_launched.clone()))?;
        registry.register(Box::new(tasks_finished.clone()))?;
        registry.register(Box::new(launches_per_offer_cycle.clone()))?;
        registry.register(Box::new(offered_resources.clone()))?;
        registry.register(Box::new(job_start_count.clone()))?;

        Ok(Metrics {
            registry,
            call_count,
            call_error_count,
            call_latency,
            event_received_count,
            event_error_count,
            event_received_latency,
            offers_received,
            offers_declined,
            tasks_launched,
            tasks_finished,
            launches_per_offer_cycle,
            offered_resources,
            job_start_count,
        })
    }

    /// Records one processed outbound call.
    pub fn observe_call(&self, kind: &str, elapsed: Duration, ok: bool) {
        self.call_count.with_label_values(&[kind]).inc();
        self.call_latency
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
        if !ok {
            self.call_error_count.with_label_values(&[kind]).inc();
        }
    }

    /// Records one processed subscription event.
    pub fn observe_event(&self, kind: &str, elapsed: Duration, ok: bool) {
        self.event_received_count.with_label_values(&[kind]).inc();
        self.event_received_latency
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
        if !ok {
            self.event_error_count.with_label_values(&[kind]).inc();
        }
    }

    pub fn offers_received(&self, count: usize) {
        self.offers_received.inc_by(count as u64);
    }

    pub fn offers_declined(&self, count: usize) {
        self.offers_declined.inc_by(count as u64);
    }

    pub fn tasks_launched(&self, count: usize) {
        self.tasks_launched.inc_by(count as u64);
    }

    pub fn task_finished(&self) {
        self.tasks_finished.inc();
    }

    pub fn launches_per_cycle(&self, count: f64) {
        self.launches_per_offer_cycle.observe(count);
    }

    pub fn offered_resources(&self, value: f64, resource: &str) {
        self.offered_resources
            .with_label_values(&[resource])
            .observe(value);
    }

    pub fn job_started(&self, job: &str) {
        self.job_start_count.with_label_values(&[job]).inc();
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %err, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Serves the metrics endpoint on the configured address, port and path
/// until the task is dropped or the bind fails.
pub async fn serve(metrics: Metrics, config: MetricsConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = (config.address.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("cannot resolve metrics address {:?}", config.address))?;

    let path = if config.path.starts_with('/') {
        config.path.clone()
    } else {
        format!("/{}", config.path)
    };

    let route = warp::get()
        .and(warp::path::full())
        .and_then(move |full: FullPath| {
            let metrics = metrics.clone();
            let path = path.clone();
            async move {
                if full.as_str() == path {
                    Ok(metrics.render())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        });

    let (bound, server) = warp::serve(route)
        .try_bind_ephemeral(addr)
        .map_err(|err| anyhow::anyhow!("failed to bind metrics endpoint {}: {}", addr, err))?;
    tracing::info!(addr = %bound, path = %config.path, "serving metrics");
    server.await;
    Ok(())
}
