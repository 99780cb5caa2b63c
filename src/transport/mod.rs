//! Transports for the session client.
//!
//! Available transports:
//! - **HTTP**: JSON envelopes over a blocking `reqwest` client (default)
//! - **Scripted**: in-memory replies with call recording, for tests

pub mod http;
pub mod memory;
pub mod traits;

pub use http::HttpTransport;
pub use memory::ScriptedTransport;
pub use traits::{RemoteCall, Transport};
