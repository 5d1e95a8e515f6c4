//! The outbound call plane and the subscription event stream.
//!
//! Every call to the master flows through a chain of [`Caller`] decorators
//! built once at startup: framework-id decoration, per-call-type logging and
//! the metrics harness, ending in an HTTP client. A Subscribe call answers
//! with a long-lived [`EventStream`]; every other call is fire-and-forget.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::messages::{Call, CallType, Event};
use crate::metrics::Metrics;
use crate::state::FrameworkIdStore;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("master rejected {kind} call: {status}: {message}")]
    Rejected {
        kind: &'static str,
        status: u16,
        message: String,
    },
    #[error("invalid master endpoint {url:?}: {source}")]
    Endpoint {
        url: String,
        source: url::ParseError,
    },
    #[error("malformed record on event stream: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("malformed record framing: {0}")]
    Framing(String),
}

/// What the master answered with.
pub enum Response {
    /// The call was accepted; nothing further to read.
    Accepted,
    /// A subscription was established; events arrive on this stream.
    Events(EventStream),
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Accepted => f.write_str("Accepted"),
            Response::Events(_) => f.write_str("Events(..)"),
        }
    }
}

/// Sends calls to the master.
#[async_trait]
pub trait Caller: Send + Sync {
    async fn call(&self, call: Call) -> Result<Response, CallError>;
}

#[async_trait]
impl<C: Caller + ?Sized> Caller for Arc<C> {
    async fn call(&self, call: Call) -> Result<Response, CallError> {
        (**self).call(call).await
    }
}

/// The master's event stream for one subscription. Ends when the connection
/// drops or the master closes it.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = Result<Event, CallError>> + Send>>,
}

impl EventStream {
    pub fn new(stream: impl Stream<Item = Result<Event, CallError>> + Send + 'static) -> Self {
        EventStream {
            inner: Box::pin(stream),
        }
    }

    /// Builds a stream over a fixed set of events; the stream ends after the
    /// last one, like an orderly disconnect.
    pub fn from_events(events: Vec<Event>) -> Self {
        Self::new(futures::stream::iter(events.into_iter().map(Ok)))
    }

    pub async fn next(&mut self) -> Option<Result<Event, CallError>> {
        self.inner.next().await
    }
}

/// The final caller: an HTTP client posting calls to the configured
/// endpoint. Subscribe requests run without a total deadline since they
/// carry the long-poll event stream; everything else is bounded by the
/// configured call timeout.
pub struct HttpCaller {
    client: reqwest::Client,
    endpoint: Url,
    content_type: &'static str,
    timeout: std::time::Duration,
}

impl HttpCaller {
    pub fn new(config: &Config) -> Result<Self, CallError> {
        let endpoint = Url::parse(&config.mesos_url).map_err(|source| CallError::Endpoint {
            url: config.mesos_url.clone(),
            source,
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()?;
        Ok(HttpCaller {
            client,
            endpoint,
            content_type: config.codec.content_type(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Caller for HttpCaller {
    async fn call(&self, call: Call) -> Result<Response, CallError> {
        let kind = call.kind;
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, self.content_type)
            .header(reqwest::header::ACCEPT, self.content_type)
            .json(&call);
        if kind != CallType::Subscribe {
            request = request.timeout(self.timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        match kind {
            CallType::Subscribe if status.is_success() => {
                Ok(Response::Events(EventStream::new(decode_records(
                    response.bytes_stream(),
                ))))
            }
            _ if status.as_u16() == 202 => Ok(Response::Accepted),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(CallError::Rejected {
                    kind: kind.as_str(),
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

/// Decodes the RecordIO-framed event records (`<decimal length>\n<record>`)
/// the master writes on a subscription response.
fn decode_records<S>(chunks: S) -> impl Stream<Item = Result<Event, CallError>>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut buffer = BytesMut::new();
        futures::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(record) = split_record(&mut buffer)? {
                let event: Event = serde_json::from_slice(&record)?;
                yield event;
            }
        }
    }
}

/// Pops one complete record off the buffer, or `None` if more bytes are
/// needed. The length header is only consumed together with its record.
fn split_record(buffer: &mut BytesMut) -> Result<Option<Bytes>, CallError> {
    let header_end = match buffer.iter().position(|b| *b == b'\n') {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let length: usize = std::str::from_utf8(&buffer[..header_end])
        .ok()
        .and_then(|header| header.trim().parse().ok())
        .ok_or_else(|| {
            CallError::Framing(format!(
                "invalid record length header {:?}",
                String::from_utf8_lossy(&buffer[..header_end])
            ))
        })?;
    if buffer.len() < header_end + 1 + length {
        return Ok(None);
    }
    buffer.advance(header_end + 1);
    Ok(Some(buffer.split_to(length).freeze()))
}

/// Attaches the current framework id to every call once one is known. On
/// re-subscription the id is mirrored into the framework info so the master
/// resumes the prior framework identity.
pub struct WithFrameworkId<C> {
    store: Arc<FrameworkIdStore>,
    inner: C,
}

impl<C> WithFrameworkId<C> {
    pub fn new(store: Arc<FrameworkIdStore>, inner: C) -> Self {
        WithFrameworkId { store, inner }
    }
}

#[async_trait]
impl<C: Caller> Caller for WithFrameworkId<C> {
    async fn call(&self, mut call: Call) -> Result<Response, CallError> {
        if let Some(id) = self.store.get() {
            if let Some(subscribe) = call.subscribe.as_mut() {
                subscribe.framework_info.id = Some(id.clone());
            }
            call.framework_id = Some(id);
        }
        self.inner.call(call).await
    }
}

/// Logs a fixed message when particular call types pass through.
pub struct LogCalls<C> {
    messages: HashMap<CallType, &'static str>,
    inner: C,
}

impl<C> LogCalls<C> {
    pub fn new(messages: HashMap<CallType, &'static str>, inner: C) -> Self {
        LogCalls { messages, inner }
    }
}

#[async_trait]
impl<C: Caller> Caller for LogCalls<C> {
    async fn call(&self, call: Call) -> Result<Response, CallError> {
        if let Some(message) = self.messages.get(&call.kind) {
            info!("{}", message);
        }
        self.inner.call(call).await
    }
}

/// Counts and times every outgoing call.
pub struct CallMetrics<C> {
    metrics: Metrics,
    inner: C,
}

impl<C> CallMetrics<C> {
    pub fn new(metrics: Metrics, inner: C) -> Self {
        CallMetrics { metrics, inner }
    }
}

#[async_trait]
impl<C: Caller> Caller for CallMetrics<C> {
    async fn call(&self, call: Call) -> Result<Response, CallError> {
        let kind = call.kind.as_str();
        let started = Instant::now();
        let result = self.inner.call(call).await;
        self.metrics
            .observe_call(kind, started.elapsed(), result.is_ok());
        if let Err(err) = &result {
            debug!(kind, error = %err, "call failed");
        }
        result
    }
}

/// Builds the call pipeline from configuration: framework-id decoration,
/// Subscribe logging, metrics, and finally the HTTP client.
pub fn build_caller(
    config: &Config,
    fid: Arc<FrameworkIdStore>,
    metrics: Metrics,
) -> Result<Arc<dyn Caller>, CallError> {
    let mut messages = HashMap::new();
    messages.insert(CallType::Subscribe, "connecting...");
    Ok(Arc::new(WithFrameworkId::new(
        fid,
        LogCalls::new(
            messages,
            CallMetrics::new(metrics, HttpCaller::new(config)?),
        ),
    )))
}
