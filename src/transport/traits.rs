//! Transport trait for the session client.
//!
//! The client depends only on the contract "call(operation, args) ->
//! response | fault". Wire format, connection handling and timeouts are the
//! transport's business.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportFault;

/// A marshalled remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    /// Wire name of the operation.
    pub operation: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl RemoteCall {
    pub fn new(operation: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }
}

/// Trait for mechanisms that carry calls to the learning service.
///
/// Implementations must be thread-safe so independent sessions can share
/// one transport. Every method blocks until a response arrives, the call
/// fails, or `timeout` elapses (`None` waits indefinitely).
pub trait Transport: Send + Sync {
    /// Issue one call and return the service's result value.
    fn call(&self, call: &RemoteCall, timeout: Option<Duration>) -> Result<Value, TransportFault>;

    /// Fetch the raw machine-readable description of the service.
    fn describe(&self, timeout: Option<Duration>) -> Result<Value, TransportFault>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// Blanket implementation for boxed transports.
///
/// This allows `Box<dyn Transport>` to be used wherever `Transport` is expected.
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(&self, call: &RemoteCall, timeout: Option<Duration>) -> Result<Value, TransportFault> {
        (**self).call(call, timeout)
    }

    fn describe(&self, timeout: Option<Duration>) -> Result<Value, TransportFault> {
        (**self).describe(timeout)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Blanket implementation for Arc-wrapped transports.
///
/// Lets a descriptor loader and a client share one transport, and lets
/// tests keep a handle on a spy transport after handing it to the client.
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, call: &RemoteCall, timeout: Option<Duration>) -> Result<Value, TransportFault> {
        (**self).call(call, timeout)
    }

    fn describe(&self, timeout: Option<Duration>) -> Result<Value, TransportFault> {
        (**self).describe(timeout)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
