//! Capture backends: turning an authorized source into image bytes.
//!
//! The gateway only authorizes a snapshot; the bytes come from elsewhere.
//! [`HttpCaptureBackend`] fetches them from an HTTP snapshot endpoint, one
//! port per camera.  [`StaticCaptureBackend`] serves fixed bytes and records
//! what it was asked for, for tests and dry runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use janus_core::{SourceDescriptor, SourceId};
use tracing::debug;

use crate::application::error::GatewayError;
use crate::application::ports::CaptureBackend;

/// Default snapshot URL; `{host}`, `{port}` and `{id}` are substituted.
pub const DEFAULT_URL_TEMPLATE: &str = "http://{host}:{port}/snapshot";
pub const DEFAULT_BACKEND_HOST: &str = "10.0.0.254";
pub const DEFAULT_BACKEND_PORT: u16 = 8080;

// ── HTTP ──────────────────────────────────────────────────────────────────────

/// Fetches snapshots with an HTTP `GET`.
pub struct HttpCaptureBackend {
    client: reqwest::Client,
    template: String,
    host: String,
    default_port: u16,
    ports: BTreeMap<SourceId, u16>,
}

impl HttpCaptureBackend {
    /// Builds a backend whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Capture`] if the HTTP client cannot be built (for
    /// example when no TLS backend is available).
    pub fn new(
        template: impl Into<String>,
        host: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Capture(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            template: template.into(),
            host: host.into(),
            default_port: DEFAULT_BACKEND_PORT,
            ports: BTreeMap::new(),
        })
    }

    /// Port used for sources missing from the port table.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_port(mut self, source: SourceId, port: u16) -> Self {
        self.ports.insert(source, port);
        self
    }

    /// The URL a capture of `source` fetches.
    pub fn url_for(&self, source: SourceId) -> String {
        let port = self.ports.get(&source).copied().unwrap_or(self.default_port);
        self.template
            .replace("{host}", &self.host)
            .replace("{port}", &port.to_string())
            .replace("{id}", &source.to_string())
    }
}

#[async_trait]
impl CaptureBackend for HttpCaptureBackend {
    async fn grab(&self, source: &SourceDescriptor) -> Result<Vec<u8>, GatewayError> {
        let url = self.url_for(source.id);
        debug!("source {}: GET {url}", source.id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Capture(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Capture(format!("GET {url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Capture(format!("GET {url}: {e}")))?;
        if body.is_empty() {
            return Err(GatewayError::Capture(format!("GET {url}: empty body")));
        }
        Ok(body.to_vec())
    }
}

// ── Static ────────────────────────────────────────────────────────────────────

/// Returns the same bytes for every source except the ones told to fail.
#[derive(Default)]
pub struct StaticCaptureBackend {
    bytes: Vec<u8>,
    failing: HashSet<SourceId>,
    grabbed: Mutex<Vec<SourceId>>,
}

impl StaticCaptureBackend {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    pub fn failing_for(mut self, source: SourceId) -> Self {
        self.failing.insert(source);
        self
    }

    /// Every source grabbed so far, in call order.
    pub fn grabbed(&self) -> Vec<SourceId> {
        self.grabbed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl CaptureBackend for StaticCaptureBackend {
    async fn grab(&self, source: &SourceDescriptor) -> Result<Vec<u8>, GatewayError> {
        self.grabbed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(source.id);
        if self.failing.contains(&source.id) {
            return Err(GatewayError::Capture(format!(
                "no frame from {}",
                source.name
            )));
        }
        Ok(self.bytes.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
