//! Service descriptor loading and caching.
//!
//! Before any session call the client needs the service's description of
//! its call surface. The description is fetched through the transport and,
//! when the endpoint allows it, cached as JSON under
//! `<home>/descriptors/<endpoint-key>.json`. A forced refresh discards the
//! cached copy first, so a service under active development is never
//! described by a stale file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::{Operation, ServiceEndpoint};
use crate::error::{ClientError, Result};
use crate::transport::{RemoteCall, Transport};

/// Pseudo-operation name used in errors raised while loading.
const DESCRIBE: &str = "describe";

/// Signature of one advertised operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    /// Parameter names, in call order.
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

/// Machine-readable description of the service's callable operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Service name as advertised.
    pub service: String,
    /// Endpoint the description was fetched from.
    pub endpoint: String,
    pub fetched_at: DateTime<Utc>,
    pub operations: BTreeMap<String, OperationSpec>,
}

/// Wire shape of a description document.
#[derive(Debug, Deserialize)]
struct WireDescriptor {
    #[serde(default)]
    service: Option<String>,
    operations: Vec<OperationSpec>,
}

impl Descriptor {
    /// Parse a description document as returned by the service.
    pub fn from_wire(endpoint: &ServiceEndpoint, value: Value) -> Result<Self> {
        let wire: WireDescriptor = serde_json::from_value(value).map_err(|e| {
            ClientError::protocol(DESCRIBE, format!("unreadable service descriptor: {}", e))
        })?;

        let mut operations = BTreeMap::new();
        for op in wire.operations {
            if op.name.trim().is_empty() {
                return Err(ClientError::protocol(
                    DESCRIBE,
                    "service descriptor lists an operation without a name",
                ));
            }
            operations.insert(op.name.clone(), op);
        }

        Ok(Self {
            service: wire.service.unwrap_or_else(|| "unknown".to_string()),
            endpoint: endpoint.address().to_string(),
            fetched_at: Utc::now(),
            operations,
        })
    }

    /// Whether the service advertises `operation`.
    pub fn supports(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Check that every operation in `required` is advertised.
    pub fn require(&self, required: &[Operation]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .map(Operation::name)
            .filter(|name| !self.supports(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClientError::protocol(
                DESCRIBE,
                format!("service does not advertise: {}", missing.join(", ")),
            ))
        }
    }

    /// Marshal a call, checking it against the advertised signature.
    pub fn prepare(&self, operation: &str, args: Vec<Value>) -> Result<RemoteCall> {
        let spec = self.operations.get(operation).ok_or_else(|| {
            ClientError::protocol(operation, "operation not advertised by the service")
        })?;

        if spec.params.len() != args.len() {
            return Err(ClientError::protocol(
                operation,
                format!(
                    "service expects {} argument(s), got {}",
                    spec.params.len(),
                    args.len()
                ),
            ));
        }

        Ok(RemoteCall::new(operation, args))
    }
}

/// Loads descriptors, optionally through an on-disk cache.
#[derive(Debug, Clone, Default)]
pub struct DescriptorLoader {
    /// Directory holding cached descriptors; `None` disables caching.
    cache_dir: Option<PathBuf>,
    /// Timeout for the fetch itself.
    timeout: Option<Duration>,
}

impl DescriptorLoader {
    /// Create a loader that never caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader caching under `cache_dir`.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the cache file for an endpoint, if caching applies.
    pub fn cache_path(&self, endpoint: &ServiceEndpoint) -> Option<PathBuf> {
        if !endpoint.descriptor_cache_enabled() {
            return None;
        }
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", endpoint.cache_key())))
    }

    /// Load the descriptor for `endpoint`.
    ///
    /// With `force_refresh` any cached copy is discarded and the description
    /// is fetched again. Fetch failures are fatal: without a descriptor no
    /// session can be created.
    pub fn load<T: Transport + ?Sized>(
        &self,
        transport: &T,
        endpoint: &ServiceEndpoint,
        force_refresh: bool,
    ) -> Result<Descriptor> {
        let cache_path = self.cache_path(endpoint);

        if let Some(path) = &cache_path {
            if force_refresh {
                discard(path)?;
            } else if let Some(cached) = read_cached(path, endpoint) {
                debug!(path = %path.display(), "using cached service descriptor");
                return Ok(cached);
            }
        }

        let raw = transport
            .describe(self.timeout)
            .map_err(|fault| ClientError::transport(DESCRIBE, None, fault))?;
        let descriptor = Descriptor::from_wire(endpoint, raw)?;
        info!(
            endpoint = %endpoint,
            service = %descriptor.service,
            operations = descriptor.operations.len(),
            transport = transport.name(),
            "loaded service descriptor"
        );

        if let Some(path) = &cache_path {
            write_cached(path, &descriptor)?;
        }

        Ok(descriptor)
    }
}

fn discard(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "discarded cached service descriptor");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ClientError::storage(path, e)),
    }
}

/// Read a cached descriptor; corrupt files are removed.
///
/// A descriptor recorded for a different address is ignored and gets
/// overwritten by the next fetch.
fn read_cached(path: &Path, endpoint: &ServiceEndpoint) -> Option<Descriptor> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Descriptor>(&content) {
        Ok(descriptor) if descriptor.endpoint == endpoint.address().as_str() => Some(descriptor),
        Ok(descriptor) => {
            debug!(
                path = %path.display(),
                cached = %descriptor.endpoint,
                endpoint = %endpoint,
                "cached descriptor belongs to another endpoint, refetching"
            );
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt descriptor cache, refetching");
            let _ = fs::remove_file(path);
            None
        }
    }
}

/// Write a descriptor atomically using temp file + rename.
fn write_cached(path: &Path, descriptor: &Descriptor) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ClientError::config(format!("invalid cache path {}", path.display())))?;
    fs::create_dir_all(dir).map_err(|e| ClientError::storage(dir, e))?;

    let json = serde_json::to_string_pretty(descriptor)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.tmp", file_name));

    {
        let mut file = fs::File::create(&temp_path).map_err(|e| ClientError::storage(&temp_path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| ClientError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| ClientError::storage(&temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| ClientError::storage(path, e))?;
    Ok(())
}
