// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Host hardware telemetry drivers
//!
//! Three ways of obtaining per-component temperatures are supported, selected
//! by the configured endpoint:
//!
//! | Endpoint              | Driver                | Source                                  |
//! |-----------------------|-----------------------|-----------------------------------------|
//! | `sysinfo`             | [`SysinfoTransport`]  | Local hardware sensors                  |
//! | `http://…`/`https://…`| [`HttpJsonTransport`] | Remote sensor page serving JSON         |
//! | anything else         | [`FileTransport`]     | Sensor export file written by a monitor |
//!
//! All drivers produce the same JSON payload: an array of
//! `{"id": …, "label": …, "value": …}` objects decoded by
//! [`crate::acquisition::decoder::decode_metrics`].

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use sysinfo::Components;
use url::Url;

use super::{with_timeout, HostMetricsTransport, TransportError};

/// Endpoint value selecting the local sensor driver
pub const SYSINFO_ENDPOINT: &str = "sysinfo";

/// Parsed host-metrics endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMetricsEndpoint {
    Sysinfo,
    Http(Url),
    File(PathBuf),
}

impl HostMetricsEndpoint {
    /// Parse an endpoint string, returning `None` when it is empty
    pub fn parse(endpoint: &str) -> Option<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return None;
        }
        if endpoint.eq_ignore_ascii_case(SYSINFO_ENDPOINT) {
            return Some(Self::Sysinfo);
        }
        if let Ok(url) = Url::parse(endpoint) {
            if matches!(url.scheme(), "http" | "https") {
                return Some(Self::Http(url));
            }
        }
        Some(Self::File(PathBuf::from(endpoint)))
    }
}

/// Build the driver matching `endpoint`
pub fn create_host_metrics_transport(
    endpoint: &HostMetricsEndpoint,
) -> Box<dyn HostMetricsTransport> {
    match endpoint {
        HostMetricsEndpoint::Sysinfo => Box::new(SysinfoTransport::new()),
        HostMetricsEndpoint::Http(url) => Box::new(HttpJsonTransport::new(url.clone())),
        HostMetricsEndpoint::File(path) => Box::new(FileTransport::new(path.clone())),
    }
}

/// One entry of the host-metrics payload
#[derive(Debug, Serialize)]
struct RawComponentEntry {
    id: String,
    label: String,
    value: f32,
}

/// Turn a sensor label into a stable identifier
fn component_id(label: &str) -> String {
    let mut id = String::with_capacity(label.len());
    let mut last_dash = true;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            id.push('-');
            last_dash = true;
        }
    }
    while id.ends_with('-') {
        id.pop();
    }
    if id.is_empty() {
        id.push_str("sensor");
    }
    id
}

/// Serialize `(label, temperature)` pairs into the common payload format
///
/// Identical labels get a numeric suffix so that ids stay unique. Sensors
/// that could not be read (NaN or infinite) are left out; an error is
/// returned only when none is left.
fn encode_payload(readings: &[(String, f32)]) -> Result<Vec<u8>, TransportError> {
    let mut seen: Vec<String> = Vec::with_capacity(readings.len());
    let mut entries = Vec::with_capacity(readings.len());
    for (label, value) in readings {
        if !value.is_finite() {
            debug!("Skipping unreadable sensor '{}' ({})", label, value);
            continue;
        }
        let base = component_id(label);
        let mut id = base.clone();
        let mut suffix = 2;
        while seen.contains(&id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        seen.push(id.clone());
        entries.push(RawComponentEntry {
            id,
            label: label.clone(),
            value: *value,
        });
    }
    if entries.is_empty() {
        return Err(TransportError::ProtocolError(format!(
            "none of the {} sensors returned a temperature",
            readings.len()
        )));
    }
    serde_json::to_vec(&entries)
        .map_err(|e| TransportError::ProtocolError(format!("cannot encode sensor list: {}", e)))
}

/// Local hardware sensors read through `sysinfo`
pub struct SysinfoTransport {
    components: Option<Components>,
}

impl SysinfoTransport {
    pub fn new() -> Self {
        Self { components: None }
    }
}

impl Default for SysinfoTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HostMetricsTransport for SysinfoTransport {
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.components.is_some() {
            return Ok(());
        }

        // Sensor discovery walks sysfs/WMI and can be slow
        let components = with_timeout(timeout, async {
            tokio::task::spawn_blocking(Components::new_with_refreshed_list)
                .await
                .map_err(|e| TransportError::ConnectionRefused(format!("sensor discovery failed: {}", e)))
        })
        .await?;

        if components.is_empty() {
            return Err(TransportError::ConnectionRefused(
                "no temperature sensors found on this host".to_string(),
            ));
        }

        info!("Discovered {} local temperature sensors", components.len());
        self.components = Some(components);
        Ok(())
    }

    async fn read_host_metrics(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let components = self
            .components
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionLost("sensors not initialized".to_string()))?;

        components.refresh();
        let readings: Vec<(String, f32)> = components
            .iter()
            .map(|c| (c.label().to_string(), c.temperature()))
            .collect();
        encode_payload(&readings)
    }

    async fn close(&mut self) {
        if self.components.take().is_some() {
            debug!("Released local temperature sensors");
        }
    }
}

/// Remote sensor page serving the JSON payload over HTTP
pub struct HttpJsonTransport {
    url: Url,
    client: Option<reqwest::Client>,
}

impl HttpJsonTransport {
    pub fn new(url: Url) -> Self {
        Self { url, client: None }
    }
}

fn map_http_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::ConnectionRefused(err.to_string())
    } else if err.is_status() || err.is_decode() {
        TransportError::ProtocolError(err.to_string())
    } else {
        TransportError::ConnectionLost(err.to_string())
    }
}

#[async_trait::async_trait]
impl HostMetricsTransport for HttpJsonTransport {
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::ConnectionRefused(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn read_host_metrics(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionLost("client not initialized".to_string()))?;

        let response = client
            .get(self.url.clone())
            .timeout(timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| map_http_error(e, timeout))?;

        let body = response.bytes().await.map_err(|e| map_http_error(e, timeout))?;
        Ok(body.to_vec())
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

/// Sensor export file periodically rewritten by a hardware monitor
pub struct FileTransport {
    path: PathBuf,
    open: bool,
}

impl FileTransport {
    pub fn new(path: PathBuf) -> Self {
        Self { path, open: false }
    }
}

#[async_trait::async_trait]
impl HostMetricsTransport for FileTransport {
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let metadata = with_timeout(timeout, async {
            tokio::fs::metadata(&self.path).await.map_err(|e| {
                TransportError::ConnectionRefused(format!("{}: {}", self.path.display(), e))
            })
        })
        .await?;

        if !metadata.is_file() {
            return Err(TransportError::ConnectionRefused(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        self.open = true;
        Ok(())
    }

    async fn read_host_metrics(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionLost("file source not opened".to_string()));
        }
        with_timeout(timeout, async {
            tokio::fs::read(&self.path).await.map_err(|e| {
                TransportError::ConnectionLost(format!("{}: {}", self.path.display(), e))
            })
        })
        .await
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
