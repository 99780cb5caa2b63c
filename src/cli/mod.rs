//! CLI commands for dlsession.
//!
//! - **learn**: run one learning session end to end
//! - **describe**: fetch (or read the cached) service descriptor
//! - **sample**: draw a deterministic instance sample for a learning problem

pub mod describe;
pub mod learn;
pub mod sample;

pub use describe::DescribeCommand;
pub use learn::LearnCommand;
pub use sample::SampleCommand;

use std::path::Path;

use crate::config::Config;
use crate::core::ServiceEndpoint;
use crate::descriptor::{Descriptor, DescriptorLoader};
use crate::error::Result;
use crate::transport::Transport;

/// Resolve the configured endpoint and load its descriptor.
///
/// The descriptor is refetched when either the caller or the config asks
/// for it. Caching only happens with a cache directory and an endpoint that
/// allows it.
pub fn load_descriptor<T: Transport + ?Sized>(
    config: &Config,
    transport: &T,
    cache_dir: Option<&Path>,
    refresh: bool,
) -> Result<(ServiceEndpoint, Descriptor)> {
    let endpoint = config.service_endpoint()?;
    let loader = match cache_dir {
        Some(dir) => DescriptorLoader::with_cache_dir(dir),
        None => DescriptorLoader::new(),
    }
    .with_timeout(config.timeouts.call_timeouts().call);

    let force_refresh = refresh || config.endpoint.force_refresh;
    let descriptor = loader.load(transport, &endpoint, force_refresh)?;
    Ok((endpoint, descriptor))
}
