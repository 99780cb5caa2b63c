//! HTTP/JSON transport.
//!
//! Calls are posted to the endpoint as `{"operation": ..., "args": [...]}`.
//! The service answers `{"result": ...}` on success or
//! `{"fault": {"code": ..., "message": ...}}` when it rejects the call. The
//! descriptor is fetched with `GET <endpoint>?descriptor`.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::ServiceEndpoint;
use crate::error::{ClientError, Result, TransportFault};
use crate::transport::traits::{RemoteCall, Transport};

/// Blocking HTTP transport for a single endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    address: Url,
}

impl HttpTransport {
    /// Create a transport for `endpoint`.
    ///
    /// No overall request timeout is set on the client: each call supplies
    /// its own, so long-running `init` calls are not cut short.
    pub fn new(endpoint: &ServiceEndpoint, connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(None::<Duration>)
            .user_agent(concat!("dlsession/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            address: endpoint.address().clone(),
        })
    }

    fn descriptor_url(&self) -> Url {
        let mut url = self.address.clone();
        url.query_pairs_mut().append_key_only("descriptor");
        url
    }
}

impl Transport for HttpTransport {
    fn call(&self, call: &RemoteCall, timeout: Option<Duration>) -> std::result::Result<Value, TransportFault> {
        debug!(operation = %call.operation, endpoint = %self.address, "posting call");

        let mut request = self
            .client
            .post(self.address.clone())
            .json(&json!({ "operation": call.operation, "args": call.args }));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().map_err(|e| classify(&e, timeout))?;
        let status = response.status();
        let body = response.text().map_err(|e| classify(&e, timeout))?;

        decode_envelope(status, &body)
    }

    fn describe(&self, timeout: Option<Duration>) -> std::result::Result<Value, TransportFault> {
        let url = self.descriptor_url();
        debug!(url = %url, "fetching service descriptor");

        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().map_err(|e| classify(&e, timeout))?;
        let status = response.status();
        let body = response.text().map_err(|e| classify(&e, timeout))?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| TransportFault::malformed(format!("HTTP {}: {}", status, e)))?;
        if let Some(fault) = value.get("fault") {
            return Err(fault_from(fault));
        }
        if !status.is_success() {
            return Err(TransportFault::malformed(format!(
                "HTTP {} without fault body",
                status
            )));
        }
        Ok(value.get("result").cloned().unwrap_or(value))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Map a reqwest failure onto a transport fault.
fn classify(err: &reqwest::Error, timeout: Option<Duration>) -> TransportFault {
    if err.is_timeout() {
        TransportFault::timeout(timeout.unwrap_or_default())
    } else if err.is_decode() || err.is_body() {
        TransportFault::malformed(err.to_string())
    } else {
        TransportFault::unreachable(err.to_string())
    }
}

/// Decode a call response body.
fn decode_envelope(status: StatusCode, body: &str) -> std::result::Result<Value, TransportFault> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TransportFault::malformed(format!("HTTP {}: {}", status, e)))?;

    if let Some(fault) = value.get("fault") {
        return Err(fault_from(fault));
    }
    if !status.is_success() {
        return Err(TransportFault::malformed(format!(
            "HTTP {} without fault body",
            status
        )));
    }

    value
        .get("result")
        .cloned()
        .ok_or_else(|| TransportFault::malformed("response has no 'result' member"))
}

fn fault_from(fault: &Value) -> TransportFault {
    let code = match fault.get("code") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let message = match fault.get("message").and_then(Value::as_str) {
        Some(m) => m.to_string(),
        None => fault.to_string(),
    };
    TransportFault::fault(code, message)
}
