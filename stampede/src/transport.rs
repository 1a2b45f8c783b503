//! The seam between virtual users and whatever actually speaks HTTP.
//!
//! Virtual users only need "issue this request and tell me the status and how long it took";
//! everything else (connection pooling, TLS, redirects) belongs to the [`Transport`]
//! implementation. A `reqwest` based implementation is available behind the `http` feature.
use stampede_core::{HttpMethod, RunConfig, TransportErrorKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use http::HttpTransport;

#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            method: config.http_method,
            url: config.target_url.clone(),
            headers: config.headers.clone(),
            body: config.body.clone(),
            timeout: config.request_timeout,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub duration: Duration,
    pub body: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Connect(_) => TransportErrorKind::Connect,
            TransportError::Other(_) => TransportErrorKind::Other,
        }
    }
}

/// Issues one request on behalf of a virtual user.
///
/// Implementations should respect `request.timeout`; the virtual user also enforces it, so a
/// transport that ignores it only loses the ability to report its own timing for slow requests.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    async fn issue(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + Sync,
{
    async fn issue(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError> {
        self.as_ref().issue(request).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use rand_distr::{Distribution, SkewNormal};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// In-process stand-in for an HTTP server.
    ///
    /// Failures are driven by a request counter rather than randomness so that failure rates in
    /// tests are exact.
    pub(crate) struct MockTransport {
        latency: Duration,
        jitter: Option<Duration>,
        server_error_every: Option<u64>,
        transport_error_every: Option<u64>,
        body: Option<String>,
        issued: AtomicU64,
    }

    impl MockTransport {
        pub fn new(latency: Duration) -> Self {
            Self {
                latency,
                jitter: None,
                server_error_every: None,
                transport_error_every: None,
                body: None,
                issued: AtomicU64::new(0),
            }
        }

        pub fn jitter(mut self, std: Duration) -> Self {
            self.jitter = Some(std);
            self
        }

        pub fn server_error_every(mut self, n: u64) -> Self {
            self.server_error_every = Some(n);
            self
        }

        pub fn transport_error_every(mut self, n: u64) -> Self {
            self.transport_error_every = Some(n);
            self
        }

        pub fn body(mut self, body: &str) -> Self {
            self.body = Some(body.to_string());
            self
        }

        pub fn issued(&self) -> u64 {
            self.issued.load(Ordering::Relaxed)
        }

        fn latency(&self) -> Duration {
            match self.jitter {
                Some(std) => {
                    let normal =
                        SkewNormal::new(self.latency.as_secs_f64(), std.as_secs_f64(), 20.)
                            .unwrap();
                    let v: f64 = normal.sample(&mut rand::thread_rng()).max(0.);
                    Duration::from_secs_f64(v)
                }
                None => self.latency,
            }
        }
    }

    impl Transport for MockTransport {
        async fn issue(&self, _request: &HttpRequest) -> Result<TransportResponse, TransportError> {
            let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
            let latency = self.latency();
            tokio::time::sleep(latency).await;

            if matches!(self.transport_error_every, Some(every) if n % every == 0) {
                return Err(TransportError::Connect("connection refused".to_string()));
            }

            let status = match self.server_error_every {
                Some(every) if n % every == 0 => 500,
                _ => 200,
            };

            Ok(TransportResponse {
                status,
                duration: latency,
                body: self.body.clone(),
            })
        }
    }
}
